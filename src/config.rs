// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Read from `$XDG_CONFIG_HOME/magnifier/config.json`. The file is optional
//! and never written by the application; every field has a default.

use crate::backends::camera::{CameraSelector, UseCase};
use crate::constants::{app_info, capture, timing, zoom};
use crate::errors::{AppError, AppResult};
use crate::session::SessionSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraSource {
    /// A V4L2 capture device; `None` picks the first usable node
    V4l2 { device: Option<String> },
    /// Generated colour bars and grid
    TestPattern,
    /// A still image shown as if it were the live feed
    Image { path: PathBuf },
}

impl Default for CameraSource {
    fn default() -> Self {
        CameraSource::V4l2 { device: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera source used when the command line does not pick one
    pub source: CameraSource,
    /// Settle delay before re-binding on resume, in milliseconds
    pub resume_settle_ms: u64,
    /// Zoom increment for the `+`/`-` keys
    pub zoom_step: f32,
    /// Torch brightness for sysfs LEDs and the simulated torch (0.0 - 1.0)
    pub torch_intensity: f32,
    /// Requested capture width for V4L2 devices
    pub capture_width: u32,
    /// Requested capture height for V4L2 devices
    pub capture_height: u32,
    /// Directory for saved snapshots (default: ~/Pictures/magnifier)
    pub snapshot_dir: Option<PathBuf>,
    /// Mirror the terminal preview horizontally
    pub mirror_preview: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: CameraSource::default(),
            resume_settle_ms: timing::RESUME_SETTLE_DELAY.as_millis() as u64,
            zoom_step: zoom::DEFAULT_ZOOM_STEP,
            torch_intensity: capture::DEFAULT_TORCH_INTENSITY,
            capture_width: capture::DEFAULT_WIDTH,
            capture_height: capture::DEFAULT_HEIGHT,
            snapshot_dir: None,
            mirror_preview: false,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join("config.json"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this system, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config: Config = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config.sanitized())
    }

    /// Bring out-of-range values back into usable bounds
    fn sanitized(mut self) -> Self {
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            self.zoom_step = zoom::DEFAULT_ZOOM_STEP;
        }
        self.torch_intensity = if self.torch_intensity.is_finite() {
            self.torch_intensity.clamp(0.0, 1.0)
        } else {
            capture::DEFAULT_TORCH_INTENSITY
        };
        if self.capture_width == 0 || self.capture_height == 0 {
            self.capture_width = capture::DEFAULT_WIDTH;
            self.capture_height = capture::DEFAULT_HEIGHT;
        }
        self
    }

    /// Session settings derived from this configuration
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            resume_settle_delay: Duration::from_millis(self.resume_settle_ms),
            selector: CameraSelector::DEFAULT_BACK,
            use_cases: vec![UseCase::Preview, UseCase::Snapshot],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_bad_values() {
        let config = Config {
            zoom_step: -1.0,
            torch_intensity: 3.0,
            capture_width: 0,
            ..Config::default()
        }
        .sanitized();

        assert_eq!(config.zoom_step, zoom::DEFAULT_ZOOM_STEP);
        assert_eq!(config.torch_intensity, 1.0);
        assert_eq!(config.capture_width, capture::DEFAULT_WIDTH);
        assert_eq!(config.capture_height, capture::DEFAULT_HEIGHT);
    }

    #[test]
    fn test_session_settings_use_settle_delay() {
        let config = Config {
            resume_settle_ms: 40,
            ..Config::default()
        };
        let settings = config.session_settings();
        assert_eq!(settings.resume_settle_delay, Duration::from_millis(40));
        assert_eq!(settings.use_cases, vec![UseCase::Preview, UseCase::Snapshot]);
    }
}
