// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// Pixel layout of a captured frame or of a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel (the only format handed to callers)
    #[default]
    Rgba,
    /// Packed YUV 4:2:2, Y0 U Y1 V
    Yuyv,
    /// Motion JPEG, one JPEG image per buffer
    Mjpeg,
}

impl PixelFormat {
    /// Get the V4L2 FourCC code for this format
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Rgba => b"AB24",
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Mjpeg => b"MJPG",
        }
    }

    /// Parse a V4L2 FourCC code
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"AB24" => Some(PixelFormat::Rgba),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Rgba => write!(f, "RGBA"),
            PixelFormat::Yuyv => write!(f, "YUYV"),
            PixelFormat::Mjpeg => write!(f, "MJPEG"),
        }
    }
}

/// A single RGBA frame
///
/// Pixel data is reference counted so the capture thread can hand the latest
/// frame to the surface without copying. Frames given out by
/// [`CameraSession::capture_frame`](crate::session::CameraSession::capture_frame)
/// are always deep copies.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data, `stride * height` bytes
    pub data: Arc<[u8]>,
    /// Bytes per row
    pub stride: u32,
    /// Monotonic frame counter from the capture source
    pub sequence: u64,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed RGBA frame
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data),
            stride: width * 4,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Make an owned copy whose pixel buffer is not shared with `self`
    pub fn to_copied(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: Arc::from(self.data.as_ref()),
            stride: self.stride,
            sequence: self.sequence,
            captured_at: self.captured_at,
        }
    }

    /// Check whether the buffer holds at least one full image
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.stride >= self.width * 4
            && self.data.len() >= (self.stride * self.height) as usize
    }

    /// Read one pixel as (r, g, b), clamping coordinates to the frame
    pub fn pixel_rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        if self.width == 0 || self.height == 0 {
            return (0, 0, 0);
        }
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        let idx = (y * self.stride + x * 4) as usize;
        if idx + 2 < self.data.len() {
            (self.data[idx], self.data[idx + 1], self.data[idx + 2])
        } else {
            (0, 0, 0)
        }
    }

    /// Convert into an `image` buffer for encoding
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        if !self.is_complete() {
            return None;
        }
        let row_bytes = (self.width * 4) as usize;
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for row in self.data.chunks(self.stride as usize).take(self.height as usize) {
            packed.extend_from_slice(&row[..row_bytes]);
        }
        image::RgbaImage::from_raw(self.width, self.height, packed)
    }
}

/// Which way a camera faces relative to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    /// Rear camera, pointing away from the user
    #[default]
    Back,
    /// Front camera, pointing at the user
    Front,
    /// Detachable or USB camera with no known orientation
    External,
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraFacing::Back => write!(f, "back"),
            CameraFacing::Front => write!(f, "front"),
            CameraFacing::External => write!(f, "external"),
        }
    }
}

/// Chooses one camera out of those a provider exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSelector {
    pub facing: CameraFacing,
    /// Accept the first available camera when none faces the requested way
    pub fallback_to_any: bool,
}

impl CameraSelector {
    /// Rear-facing camera, falling back to whatever is attached
    pub const DEFAULT_BACK: CameraSelector = CameraSelector {
        facing: CameraFacing::Back,
        fallback_to_any: true,
    };

    /// Pick the matching device from a list
    pub fn select<'a>(&self, devices: &'a [CameraDevice]) -> Option<&'a CameraDevice> {
        devices
            .iter()
            .find(|d| d.facing == self.facing)
            .or_else(|| {
                if self.fallback_to_any {
                    devices.first()
                } else {
                    None
                }
            })
    }
}

impl Default for CameraSelector {
    fn default() -> Self {
        Self::DEFAULT_BACK
    }
}

/// Capture use cases bound together with a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseCase {
    /// Continuous live frames for display
    Preview,
    /// Still snapshots of the live feed
    Snapshot,
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq)]
pub struct CameraDevice {
    pub name: String,
    /// Device node (e.g. `/dev/video0`) or a virtual source identifier
    pub path: String,
    pub facing: CameraFacing,
    /// Driver name when known (V4L2 `driver`)
    pub driver: Option<String>,
    /// Hardware zoom is available
    pub supports_zoom: bool,
    /// A controllable torch is available
    pub supports_torch: bool,
}

#[derive(Debug)]
struct ScopeInner {
    name: String,
    // 0 = inactive, 1 = active, 2 = destroyed
    phase: AtomicU8,
}

const SCOPE_INACTIVE: u8 = 0;
const SCOPE_ACTIVE: u8 = 1;
const SCOPE_DESTROYED: u8 = 2;

/// External owner that decides when camera hardware may be bound
///
/// The front-end activates the scope while it is able to show the feed and
/// destroys it when it goes away. Providers refuse to bind to a scope that
/// is not active.
#[derive(Debug, Clone)]
pub struct LifecycleScope {
    inner: Arc<ScopeInner>,
}

impl LifecycleScope {
    /// Create an inactive scope
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                phase: AtomicU8::new(SCOPE_INACTIVE),
            }),
        }
    }

    /// Create a scope that is already active
    pub fn active(name: impl Into<String>) -> Self {
        let scope = Self::new(name);
        scope.activate();
        scope
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark the scope active. Has no effect once destroyed.
    pub fn activate(&self) {
        let _ = self.inner.phase.compare_exchange(
            SCOPE_INACTIVE,
            SCOPE_ACTIVE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Mark the scope inactive. Has no effect once destroyed.
    pub fn deactivate(&self) {
        let _ = self.inner.phase.compare_exchange(
            SCOPE_ACTIVE,
            SCOPE_INACTIVE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// End the scope permanently
    pub fn destroy(&self) {
        self.inner.phase.store(SCOPE_DESTROYED, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.inner.phase.load(Ordering::SeqCst) == SCOPE_ACTIVE
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.phase.load(Ordering::SeqCst) == SCOPE_DESTROYED
    }

    /// Fail with a bind error unless the scope is active
    pub fn ensure_active(&self) -> BackendResult<()> {
        if self.is_active() {
            Ok(())
        } else if self.is_destroyed() {
            Err(BackendError::ScopeInactive(format!(
                "lifecycle scope '{}' was destroyed",
                self.name()
            )))
        } else {
            Err(BackendError::ScopeInactive(format!(
                "lifecycle scope '{}' is not active",
                self.name()
            )))
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend error types
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The platform could not hand out a camera provider
    ProviderUnavailable(String),
    /// No camera matched the selector
    DeviceNotFound(String),
    /// The lifecycle scope does not allow binding right now
    ScopeInactive(String),
    /// The device rejected the requested configuration
    BindFailed(String),
    /// The hardware does not offer the requested control
    Unsupported(String),
    /// A control request reached the hardware and failed
    ControlFailed(String),
    /// Generic error
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::ProviderUnavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::ScopeInactive(msg) => write!(f, "Cannot bind: {}", msg),
            BackendError::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            BackendError::Unsupported(msg) => write!(f, "Not supported: {}", msg),
            BackendError::ControlFailed(msg) => write!(f, "Control failed: {}", msg),
            BackendError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, facing: CameraFacing) -> CameraDevice {
        CameraDevice {
            name: name.to_string(),
            path: format!("/dev/{}", name),
            facing,
            driver: None,
            supports_zoom: false,
            supports_torch: false,
        }
    }

    #[test]
    fn test_selector_prefers_back_camera() {
        let devices = vec![
            device("front", CameraFacing::Front),
            device("rear", CameraFacing::Back),
        ];
        let picked = CameraSelector::DEFAULT_BACK.select(&devices).unwrap();
        assert_eq!(picked.name, "rear");
    }

    #[test]
    fn test_selector_fallback() {
        let devices = vec![device("usb", CameraFacing::External)];
        assert_eq!(
            CameraSelector::DEFAULT_BACK.select(&devices).unwrap().name,
            "usb"
        );

        let strict = CameraSelector {
            facing: CameraFacing::Back,
            fallback_to_any: false,
        };
        assert!(strict.select(&devices).is_none());
    }

    #[test]
    fn test_scope_phases() {
        let scope = LifecycleScope::new("viewer");
        assert!(scope.ensure_active().is_err());

        scope.activate();
        assert!(scope.ensure_active().is_ok());

        scope.destroy();
        scope.activate();
        assert!(!scope.is_active());
        assert!(matches!(
            scope.ensure_active(),
            Err(BackendError::ScopeInactive(_))
        ));
    }

    #[test]
    fn test_copied_frame_does_not_share_pixels() {
        let frame = CameraFrame::from_rgba(2, 1, vec![1, 2, 3, 255, 4, 5, 6, 255], 7);
        let copy = frame.to_copied();
        assert!(!Arc::ptr_eq(&frame.data, &copy.data));
        assert_eq!(copy.data.as_ref(), frame.data.as_ref());
        assert_eq!(copy.pixel_rgb(1, 0), (4, 5, 6));
        assert_eq!(copy.pixel_rgb(9, 9), (4, 5, 6));
    }

    #[test]
    fn test_to_rgba_image_strips_padding() {
        let mut data = vec![0u8; 12 * 2];
        data[0] = 10;
        data[12] = 20;
        let frame = CameraFrame {
            width: 2,
            height: 2,
            data: Arc::from(data),
            stride: 12,
            sequence: 0,
            captured_at: Instant::now(),
        };
        let img = frame.to_rgba_image().unwrap();
        assert_eq!(img.get_pixel(0, 0)[0], 10);
        assert_eq!(img.get_pixel(0, 1)[0], 20);
    }
}
