// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Zoom range owned by the camera session
pub mod zoom {
    /// Smallest zoom ratio (no magnification)
    pub const MIN_ZOOM: f32 = 1.0;
    /// Largest zoom ratio
    pub const MAX_ZOOM: f32 = 5.0;
    /// Ratio a fresh session starts with
    pub const DEFAULT_ZOOM: f32 = 1.0;
    /// Default increment for keyboard zoom
    pub const DEFAULT_ZOOM_STEP: f32 = 0.25;

    /// Clamp a requested ratio into `[MIN_ZOOM, MAX_ZOOM]`
    ///
    /// NaN falls back to `DEFAULT_ZOOM`.
    pub fn clamp_zoom(level: f32) -> f32 {
        if level.is_nan() {
            DEFAULT_ZOOM
        } else {
            level.clamp(MIN_ZOOM, MAX_ZOOM)
        }
    }
}

/// Timing values for the session and front-ends
pub mod timing {
    use std::time::Duration;

    /// Pause before re-binding on resume so the sensor can settle
    pub const RESUME_SETTLE_DELAY: Duration = Duration::from_millis(100);
    /// Terminal input poll interval (~60 Hz redraw)
    pub const TERMINAL_POLL_INTERVAL: Duration = Duration::from_millis(16);
    /// How long `snapshot` waits for the first frame
    pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
    /// Poll interval while waiting for the first frame
    pub const FIRST_FRAME_POLL: Duration = Duration::from_millis(20);
}

/// Capture defaults
pub mod capture {
    use std::time::Duration;

    /// Requested V4L2 capture width
    pub const DEFAULT_WIDTH: u32 = 640;
    /// Requested V4L2 capture height
    pub const DEFAULT_HEIGHT: u32 = 480;
    /// Number of mmap buffers for V4L2 streaming
    pub const V4L2_BUFFER_COUNT: u32 = 4;
    /// Frame interval of the virtual camera
    pub const VIRTUAL_FRAME_INTERVAL: Duration = Duration::from_millis(33);
    /// Default simulated / sysfs torch intensity
    pub const DEFAULT_TORCH_INTENSITY: f32 = 1.0;
}

/// Application information utilities
pub mod app_info {
    /// Application name used for directories and the scope
    pub const APP_NAME: &str = "magnifier";

    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
