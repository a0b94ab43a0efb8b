// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera platform
//!
//! Streams YUYV or MJPEG from a `/dev/video*` node through memory-mapped
//! buffers. Zoom uses `V4L2_CID_ZOOM_ABSOLUTE` when the driver offers it and
//! a digital centre crop otherwise. The torch is driven through the V4L2
//! flash controls, falling back to sysfs LEDs.

use super::format_converters::{digital_zoom, mjpeg_to_rgba, yuyv_to_rgba};
use super::frame_loop::{CaptureLoopController, StopSignal};
use super::v4l2_controls::{
    self, ControlInfo, V4L2_CID_FLASH_LED_MODE, V4L2_CID_FLASH_TORCH_INTENSITY,
    V4L2_CID_ZOOM_ABSOLUTE, V4L2_FLASH_LED_MODE_NONE, V4L2_FLASH_LED_MODE_TORCH,
};
use super::{
    BackendError, BackendResult, CameraDevice, CameraFacing, CameraFrame, CameraHandle,
    CameraPlatform, CameraProvider, CameraSelector, CaptureSurface, FrameSlot, LifecycleScope,
    PixelFormat, UseCase,
};
use crate::constants::{capture, zoom};
use crate::flash::TorchHardware;
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// How long `stream.next()` may block before the loop rechecks its stop flag
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after a failed dequeue so a wedged device does not spin
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Stream formats we can decode, in order of preference
const PREFERRED_FORMATS: [PixelFormat; 2] = [PixelFormat::Yuyv, PixelFormat::Mjpeg];

/// Platform backed by the kernel's V4L2 capture nodes
#[derive(Debug, Clone)]
pub struct V4l2Platform {
    /// Fixed device node; `None` scans `/dev/video*`
    device: Option<String>,
    width: u32,
    height: u32,
    torch_intensity: f32,
}

impl Default for V4l2Platform {
    fn default() -> Self {
        Self::new(None)
    }
}

impl V4l2Platform {
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            width: capture::DEFAULT_WIDTH,
            height: capture::DEFAULT_HEIGHT,
            torch_intensity: capture::DEFAULT_TORCH_INTENSITY,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_torch_intensity(mut self, intensity: f32) -> Self {
        self.torch_intensity = intensity.clamp(0.0, 1.0);
        self
    }
}

impl CameraPlatform for V4l2Platform {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn acquire_provider(&self) -> BackendResult<Box<dyn CameraProvider>> {
        let devices = match &self.device {
            Some(path) => {
                let device = probe_device(path).ok_or_else(|| {
                    BackendError::ProviderUnavailable(format!(
                        "{} is not a V4L2 capture device",
                        path
                    ))
                })?;
                vec![device]
            }
            None => list_capture_devices(),
        };

        if devices.is_empty() {
            return Err(BackendError::ProviderUnavailable(
                "no V4L2 capture devices found".to_string(),
            ));
        }

        info!(count = devices.len(), "V4L2 provider ready");
        Ok(Box::new(V4l2Provider {
            devices,
            width: self.width,
            height: self.height,
            torch_intensity: self.torch_intensity,
            active: None,
        }))
    }
}

/// Enumerate V4L2 nodes that can capture video, ordered by node number
pub fn list_capture_devices() -> Vec<CameraDevice> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        warn!("Cannot read /dev, no V4L2 devices listed");
        return Vec::new();
    };

    let mut nodes: Vec<(u32, String)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_video_node(path))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let index = name.strip_prefix("video")?.parse::<u32>().ok()?;
            Some((index, path.to_string_lossy().to_string()))
        })
        .collect();
    nodes.sort();

    nodes
        .into_iter()
        .filter_map(|(_, path)| probe_device(&path))
        .collect()
}

/// Describe one device node, or `None` if it cannot capture video
fn probe_device(path: &str) -> Option<CameraDevice> {
    let info = v4l2_controls::query_device_info(path)?;
    if !info.is_video_capture() {
        debug!(path, driver = %info.driver, "Skipping non-capture node");
        return None;
    }

    // V4L2 has no facing property; built-in sensors sit on a platform bus
    let facing = if info.bus_info.starts_with("usb") {
        CameraFacing::External
    } else {
        CameraFacing::Back
    };

    let supports_zoom = v4l2_controls::has_control(path, V4L2_CID_ZOOM_ABSOLUTE);
    let supports_torch = v4l2_controls::has_control(path, V4L2_CID_FLASH_LED_MODE)
        || TorchHardware::detect().has_leds();

    Some(CameraDevice {
        name: if info.card.is_empty() {
            path.to_string()
        } else {
            info.card
        },
        path: path.to_string(),
        facing,
        driver: Some(info.driver),
        supports_zoom,
        supports_torch,
    })
}

struct ActiveCapture {
    slot: Arc<FrameSlot>,
    capture: CaptureLoopController,
}

/// Provider that streams from one V4L2 node at a time
pub struct V4l2Provider {
    devices: Vec<CameraDevice>,
    width: u32,
    height: u32,
    torch_intensity: f32,
    active: Option<ActiveCapture>,
}

impl CameraProvider for V4l2Provider {
    fn cameras(&self) -> Vec<CameraDevice> {
        self.devices.clone()
    }

    fn bind(
        &mut self,
        scope: &LifecycleScope,
        selector: &CameraSelector,
        use_cases: &[UseCase],
    ) -> BackendResult<Box<dyn CameraHandle>> {
        scope.ensure_active()?;
        let device = selector
            .select(&self.devices)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no {} camera", selector.facing)))?;

        self.unbind_all()?;

        info!(device = %device.name, path = %device.path, ?use_cases, "Binding V4L2 camera");

        let zoom_control = match v4l2_controls::query_control(&device.path, V4L2_CID_ZOOM_ABSOLUTE) {
            Some(info) if !info.is_disabled() && !info.is_inactive() => {
                debug!(min = info.minimum, max = info.maximum, "Using hardware zoom");
                ZoomControl::Hardware(info)
            }
            _ => ZoomControl::Digital(Arc::new(AtomicU32::new(zoom::DEFAULT_ZOOM.to_bits()))),
        };
        let torch = TorchControl::detect(&device.path);

        let slot = Arc::new(FrameSlot::new());
        let (ready_tx, ready_rx) = mpsc::channel();
        let stream_config = StreamConfig {
            path: device.path.clone(),
            width: self.width,
            height: self.height,
            digital_zoom: match &zoom_control {
                ZoomControl::Digital(ratio) => Some(Arc::clone(ratio)),
                ZoomControl::Hardware(_) => None,
            },
        };
        let loop_slot = Arc::clone(&slot);

        let mut capture = CaptureLoopController::spawn("v4l2", move |stop| {
            run_stream(stream_config, loop_slot, ready_tx, stop);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                capture.stop();
                return Err(e);
            }
            Err(_) => {
                capture.stop();
                return Err(BackendError::BindFailed(
                    "capture thread exited during setup".to_string(),
                ));
            }
        }

        self.active = Some(ActiveCapture {
            slot: Arc::clone(&slot),
            capture,
        });

        Ok(Box::new(V4l2Handle {
            device,
            slot,
            zoom: zoom_control,
            torch,
            torch_intensity: self.torch_intensity,
        }))
    }

    fn unbind_all(&mut self) -> BackendResult<()> {
        if let Some(mut active) = self.active.take() {
            active.capture.stop();
            active.slot.clear();
            debug!("V4L2 capture stopped");
        }
        Ok(())
    }
}

struct StreamConfig {
    path: String,
    width: u32,
    height: u32,
    digital_zoom: Option<Arc<AtomicU32>>,
}

/// Open, configure and stream a device until stopped
///
/// Setup errors are reported once through `ready`; the device and its
/// mapped buffers live entirely on the capture thread.
fn run_stream(
    config: StreamConfig,
    slot: Arc<FrameSlot>,
    ready: mpsc::Sender<BackendResult<()>>,
    stop: StopSignal,
) {
    let dev = match Device::with_path(&config.path) {
        Ok(dev) => dev,
        Err(e) => {
            let _ = ready.send(Err(BackendError::BindFailed(format!(
                "cannot open {}: {}",
                config.path, e
            ))));
            return;
        }
    };

    let (format, pixel_format) = match negotiate_format(&dev, config.width, config.height) {
        Ok(negotiated) => negotiated,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut stream = match Stream::with_buffers(&dev, Type::VideoCapture, capture::V4L2_BUFFER_COUNT)
    {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(BackendError::BindFailed(format!(
                "failed to create stream: {}",
                e
            ))));
            return;
        }
    };
    stream.set_timeout(DEQUEUE_TIMEOUT);

    info!(
        width = format.width,
        height = format.height,
        format = %pixel_format,
        "V4L2 stream configured"
    );
    let _ = ready.send(Ok(()));

    let mut sequence = 0u64;
    while !stop.is_set() {
        let (buf, meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Dequeue failed");
                std::thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };

        let image = match decode_frame(data, pixel_format, format.width, format.height) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        let image = match &config.digital_zoom {
            Some(ratio) => digital_zoom(image, f32::from_bits(ratio.load(Ordering::Relaxed))),
            None => image,
        };

        let (width, height) = image.dimensions();
        slot.publish(CameraFrame::from_rgba(width, height, image.into_raw(), sequence));
        sequence += 1;
    }
}

/// Ask the driver for each decodable format until one sticks
fn negotiate_format(dev: &Device, width: u32, height: u32) -> BackendResult<(Format, PixelFormat)> {
    for wanted in PREFERRED_FORMATS {
        let request = Format::new(width, height, FourCC::new(wanted.fourcc()));
        match dev.set_format(&request) {
            Ok(actual) => {
                if let Some(pixel_format) = PixelFormat::from_fourcc(&actual.fourcc.repr)
                    && pixel_format != PixelFormat::Rgba
                {
                    return Ok((actual, pixel_format));
                }
                debug!(wanted = %wanted, got = ?actual.fourcc, "Driver substituted format");
            }
            Err(e) => debug!(wanted = %wanted, error = %e, "Format rejected"),
        }
    }
    Err(BackendError::BindFailed(
        "device offers neither YUYV nor MJPEG".to_string(),
    ))
}

fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<RgbaImage, String> {
    let (pixels, width, height) = match format {
        PixelFormat::Yuyv => (yuyv_to_rgba(data, width, height), width, height),
        PixelFormat::Mjpeg => mjpeg_to_rgba(data)?,
        PixelFormat::Rgba => (data.to_vec(), width, height),
    };
    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| format!("short {} buffer for {}x{}", format, width, height))
}

enum ZoomControl {
    /// Driver zoom mapped from the session's ratio range
    Hardware(ControlInfo),
    /// Ratio read by the capture thread for a centre crop
    Digital(Arc<AtomicU32>),
}

enum TorchControl {
    V4l2 { intensity: Option<ControlInfo> },
    Sysfs(TorchHardware),
    Unavailable(String),
}

impl TorchControl {
    fn detect(path: &str) -> Self {
        if v4l2_controls::has_control(path, V4L2_CID_FLASH_LED_MODE) {
            return TorchControl::V4l2 {
                intensity: v4l2_controls::query_control(path, V4L2_CID_FLASH_TORCH_INTENSITY),
            };
        }
        let leds = TorchHardware::detect();
        if leds.has_leds() {
            return TorchControl::Sysfs(leds);
        }
        TorchControl::Unavailable(
            leds.permission_error
                .unwrap_or_else(|| "camera has no torch".to_string()),
        )
    }
}

/// Handle to a streaming V4L2 device
pub struct V4l2Handle {
    device: CameraDevice,
    slot: Arc<FrameSlot>,
    zoom: ZoomControl,
    torch: TorchControl,
    torch_intensity: f32,
}

impl CameraHandle for V4l2Handle {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn set_zoom_ratio(&mut self, ratio: f32) -> BackendResult<()> {
        let ratio = zoom::clamp_zoom(ratio);
        match &self.zoom {
            ZoomControl::Hardware(info) => {
                let value = info.value_for_ratio(ratio, zoom::MIN_ZOOM, zoom::MAX_ZOOM);
                debug!(ratio, value, "Setting hardware zoom");
                v4l2_controls::set_control(&self.device.path, V4L2_CID_ZOOM_ABSOLUTE, value)
                    .map_err(BackendError::ControlFailed)
            }
            ZoomControl::Digital(shared) => {
                shared.store(ratio.to_bits(), Ordering::Relaxed);
                Ok(())
            }
        }
    }

    fn enable_torch(&mut self, enabled: bool) -> BackendResult<()> {
        match &self.torch {
            TorchControl::V4l2 { intensity } => {
                let path = &self.device.path;
                if enabled && let Some(info) = intensity {
                    let value = info.value_for_ratio(self.torch_intensity, 0.0, 1.0);
                    if let Err(e) =
                        v4l2_controls::set_control(path, V4L2_CID_FLASH_TORCH_INTENSITY, value)
                    {
                        warn!(error = %e, "Torch intensity not applied");
                    }
                }
                let mode = if enabled {
                    V4L2_FLASH_LED_MODE_TORCH
                } else {
                    V4L2_FLASH_LED_MODE_NONE
                };
                v4l2_controls::set_control(path, V4L2_CID_FLASH_LED_MODE, mode)
                    .map_err(BackendError::ControlFailed)
            }
            TorchControl::Sysfs(leds) => leds
                .set_all(enabled, self.torch_intensity)
                .map_err(|e| BackendError::ControlFailed(format!("torch LED: {}", e))),
            TorchControl::Unavailable(reason) if enabled => {
                Err(BackendError::Unsupported(reason.clone()))
            }
            TorchControl::Unavailable(_) => Ok(()),
        }
    }

    fn surface(&self) -> Arc<dyn CaptureSurface> {
        self.slot.clone()
    }
}

impl Drop for V4l2Handle {
    fn drop(&mut self) {
        // Leave the LED dark when the binding goes away
        let result = match &self.torch {
            TorchControl::V4l2 { .. } => v4l2_controls::set_control(
                &self.device.path,
                V4L2_CID_FLASH_LED_MODE,
                V4L2_FLASH_LED_MODE_NONE,
            ),
            TorchControl::Sysfs(leds) => leds.set_all(false, 0.0).map_err(|e| e.to_string()),
            TorchControl::Unavailable(_) => Ok(()),
        };
        if let Err(e) = result {
            debug!(error = %e, "Torch not reset on unbind");
        }
    }
}

/// Check whether a path looks like a V4L2 capture node name
pub fn is_video_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("video"))
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}
