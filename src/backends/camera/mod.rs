// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! The session talks to camera hardware only through the traits in this
//! module, so the same lifecycle code drives a V4L2 device, a virtual source
//! or a scripted test double.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   CameraSession     │  ← Lifecycle, state stream, serialization
//! └──────────┬──────────┘
//!            │ acquire_provider()
//!            ▼
//! ┌─────────────────────┐
//! │   CameraPlatform    │  ← Hands out providers
//! └──────────┬──────────┘
//!            ▼
//! ┌─────────────────────┐      bind()      ┌────────────────┐
//! │   CameraProvider    │ ───────────────► │  CameraHandle  │ ← zoom, torch
//! └─────────────────────┘                  └───────┬────────┘
//!                                                  ▼
//!                                          ┌────────────────┐
//!                                          │ CaptureSurface │ ← latest frame
//!                                          └────────────────┘
//! ```

pub mod format_converters;
pub mod frame_loop;
pub mod surface;
pub mod types;
pub mod v4l2;
pub mod v4l2_controls;

pub use surface::FrameSlot;
pub use types::*;

use std::sync::Arc;

/// Entry point into a camera stack
///
/// `acquire_provider` may block on device enumeration or file I/O, so the
/// session always calls it from a blocking worker.
pub trait CameraPlatform: Send + Sync {
    /// Short name for logs and the CLI
    fn name(&self) -> &str;

    /// Obtain a provider able to bind capture pipelines
    fn acquire_provider(&self) -> BackendResult<Box<dyn CameraProvider>>;
}

/// Binds capture pipelines to a lifecycle scope
///
/// Providers are owned by the session's hardware thread; none of these
/// methods are called concurrently.
pub trait CameraProvider: Send {
    /// Cameras this provider can bind
    fn cameras(&self) -> Vec<CameraDevice>;

    /// Start capturing from the camera picked by `selector`
    ///
    /// At most one binding exists at a time: implementations unbind any
    /// previous pipeline first.
    fn bind(
        &mut self,
        scope: &LifecycleScope,
        selector: &CameraSelector,
        use_cases: &[UseCase],
    ) -> BackendResult<Box<dyn CameraHandle>>;

    /// Stop every pipeline this provider has bound
    ///
    /// Safe to call when nothing is bound.
    fn unbind_all(&mut self) -> BackendResult<()>;
}

/// Control surface of a bound camera
pub trait CameraHandle: Send {
    /// The device this handle is bound to
    fn device(&self) -> &CameraDevice;

    /// Apply a zoom ratio (already clamped by the caller)
    fn set_zoom_ratio(&mut self, ratio: f32) -> BackendResult<()>;

    /// Switch the torch on or off
    fn enable_torch(&mut self, enabled: bool) -> BackendResult<()>;

    /// Surface holding the most recent frame of this binding
    fn surface(&self) -> Arc<dyn CaptureSurface>;
}

/// Source of the currently displayed live frame
pub trait CaptureSurface: Send + Sync {
    /// Copy out the latest frame, if any has arrived
    fn snapshot(&self) -> Option<CameraFrame>;
}
