// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera platform
//!
//! Presents a test pattern or a still image as a rear-facing camera. Zoom
//! is a digital centre crop and the torch brightens the frame, so the whole
//! session lifecycle can run on machines without camera hardware.
//!
//! ```text
//! base image ──► digital zoom ──► torch glow ──► FrameSlot ──► session
//!                    ▲                ▲
//!                    └── VirtualHandle┘ (atomics shared with the loop)
//! ```

mod file_source;

pub use file_source::{is_image_extension, load_image, test_pattern};

use crate::backends::camera::format_converters::{digital_zoom, torch_glow};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::backends::camera::{
    BackendError, BackendResult, CameraDevice, CameraFacing, CameraFrame, CameraHandle,
    CameraPlatform, CameraProvider, CameraSelector, CaptureSurface, FrameSlot, LifecycleScope,
    UseCase,
};
use crate::constants::{capture, zoom};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// What the virtual camera shows
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualSource {
    TestPattern { width: u32, height: u32 },
    Image(PathBuf),
}

impl VirtualSource {
    fn device(&self) -> CameraDevice {
        let (name, path) = match self {
            VirtualSource::TestPattern { .. } => {
                ("Test pattern".to_string(), "virtual:test-pattern".to_string())
            }
            VirtualSource::Image(path) => (
                format!(
                    "Image {}",
                    path.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                ),
                format!("virtual:{}", path.display()),
            ),
        };
        CameraDevice {
            name,
            path,
            facing: CameraFacing::Back,
            driver: Some("virtual".to_string()),
            supports_zoom: true,
            supports_torch: true,
        }
    }

    fn render(&self) -> BackendResult<RgbaImage> {
        match self {
            VirtualSource::TestPattern { width, height } => Ok(test_pattern(*width, *height)),
            VirtualSource::Image(path) => load_image(path),
        }
    }
}

/// Platform handing out virtual providers
#[derive(Debug, Clone)]
pub struct VirtualPlatform {
    source: VirtualSource,
    torch_intensity: f32,
    frame_interval: Duration,
}

impl VirtualPlatform {
    pub fn new(source: VirtualSource) -> Self {
        Self {
            source,
            torch_intensity: capture::DEFAULT_TORCH_INTENSITY,
            frame_interval: capture::VIRTUAL_FRAME_INTERVAL,
        }
    }

    /// Test pattern at the default capture size
    pub fn test_pattern() -> Self {
        Self::new(VirtualSource::TestPattern {
            width: capture::DEFAULT_WIDTH,
            height: capture::DEFAULT_HEIGHT,
        })
    }

    pub fn with_torch_intensity(mut self, intensity: f32) -> Self {
        self.torch_intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

impl CameraPlatform for VirtualPlatform {
    fn name(&self) -> &str {
        "virtual"
    }

    fn acquire_provider(&self) -> BackendResult<Box<dyn CameraProvider>> {
        let base = Arc::new(self.source.render()?);
        info!(source = ?self.source, "Virtual camera provider ready");
        Ok(Box::new(VirtualProvider {
            device: self.source.device(),
            base,
            torch_intensity: self.torch_intensity,
            frame_interval: self.frame_interval,
            active: None,
        }))
    }
}

/// Controls shared between a handle and its capture loop
#[derive(Debug)]
struct VirtualControls {
    zoom_bits: AtomicU32,
    torch: AtomicBool,
}

impl VirtualControls {
    fn zoom(&self) -> f32 {
        f32::from_bits(self.zoom_bits.load(Ordering::Relaxed))
    }
}

struct ActiveCapture {
    slot: Arc<FrameSlot>,
    capture: CaptureLoopController,
}

/// Provider backed by a base image
pub struct VirtualProvider {
    device: CameraDevice,
    base: Arc<RgbaImage>,
    torch_intensity: f32,
    frame_interval: Duration,
    active: Option<ActiveCapture>,
}

impl CameraProvider for VirtualProvider {
    fn cameras(&self) -> Vec<CameraDevice> {
        vec![self.device.clone()]
    }

    fn bind(
        &mut self,
        scope: &LifecycleScope,
        selector: &CameraSelector,
        use_cases: &[UseCase],
    ) -> BackendResult<Box<dyn CameraHandle>> {
        scope.ensure_active()?;
        let devices = self.cameras();
        let device = selector
            .select(&devices)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no {} camera", selector.facing)))?;

        self.unbind_all()?;

        debug!(device = %device.name, ?use_cases, "Binding virtual camera");

        let slot = Arc::new(FrameSlot::new());
        let controls = Arc::new(VirtualControls {
            zoom_bits: AtomicU32::new(zoom::DEFAULT_ZOOM.to_bits()),
            torch: AtomicBool::new(false),
        });

        let loop_slot = Arc::clone(&slot);
        let loop_controls = Arc::clone(&controls);
        let base = Arc::clone(&self.base);
        let intensity = self.torch_intensity;
        let interval = self.frame_interval;
        let mut sequence = 0u64;

        let capture = CaptureLoopController::start("virtual", move || {
            let mut frame = digital_zoom((*base).clone(), loop_controls.zoom());
            if loop_controls.torch.load(Ordering::Relaxed) {
                torch_glow(&mut frame, intensity);
            }
            let (width, height) = frame.dimensions();
            loop_slot.publish(CameraFrame::from_rgba(width, height, frame.into_raw(), sequence));
            sequence += 1;
            std::thread::sleep(interval);
            LoopAction::Continue
        });

        self.active = Some(ActiveCapture {
            slot: Arc::clone(&slot),
            capture,
        });

        Ok(Box::new(VirtualHandle {
            device,
            controls,
            slot,
        }))
    }

    fn unbind_all(&mut self) -> BackendResult<()> {
        if let Some(mut active) = self.active.take() {
            active.capture.stop();
            active.slot.clear();
            debug!(device = %self.device.name, "Virtual camera unbound");
        }
        Ok(())
    }
}

/// Handle to a bound virtual camera
pub struct VirtualHandle {
    device: CameraDevice,
    controls: Arc<VirtualControls>,
    slot: Arc<FrameSlot>,
}

impl CameraHandle for VirtualHandle {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn set_zoom_ratio(&mut self, ratio: f32) -> BackendResult<()> {
        self.controls
            .zoom_bits
            .store(zoom::clamp_zoom(ratio).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn enable_torch(&mut self, enabled: bool) -> BackendResult<()> {
        self.controls.torch.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    fn surface(&self) -> Arc<dyn CaptureSurface> {
        self.slot.clone()
    }
}
