// SPDX-License-Identifier: GPL-3.0-only

//! Torch LED control via Linux sysfs
//!
//! Discovers LEDs exposed at `/sys/class/leds/*:flash` and `*:torch` and
//! drives them through the `brightness` file, which is group-writable on
//! most phones running a mainline kernel.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default location of LED class devices
pub const SYSFS_LEDS_DIR: &str = "/sys/class/leds";

/// A torch-capable LED discovered via sysfs
#[derive(Debug, Clone)]
pub struct TorchLed {
    path: PathBuf,
    max_brightness: u32,
    name: String,
}

impl TorchLed {
    /// Device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Light the LED at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value.max(1))
    }
}

/// Result of torch LED detection
///
/// Separates "hardware exists" from "we can control it" so the session can
/// report a permission problem instead of a bare "unsupported".
#[derive(Debug, Default)]
pub struct TorchHardware {
    /// LEDs we can write to, sorted by name
    pub leds: Vec<TorchLed>,
    /// Set when LEDs exist but none is writable
    pub permission_error: Option<String>,
}

impl TorchHardware {
    /// Scan the system LED directory
    pub fn detect() -> Self {
        Self::detect_in(Path::new(SYSFS_LEDS_DIR))
    }

    /// Scan a specific LED class directory
    pub fn detect_in(leds_dir: &Path) -> Self {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            warn!(dir = %leds_dir.display(), "Cannot read LED directory, torch discovery skipped");
            return Self::default();
        };

        let mut leds = Vec::new();
        let mut not_writable: Vec<PathBuf> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            if !(name_str.ends_with(":flash") || name_str.ends_with(":torch")) {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let max_brightness_path = led_path.join("max_brightness");

            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(
                            path = %max_brightness_path.display(),
                            "Invalid max_brightness value"
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            match std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered torch LED");
                    leds.push(TorchLed {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        path = %brightness_path.display(),
                        error = %e,
                        "Torch LED found but not writable"
                    );
                    not_writable.push(brightness_path);
                }
            }
        }

        leds.sort_by(|a, b| a.name.cmp(&b.name));

        let permission_error = if leds.is_empty() && !not_writable.is_empty() {
            Some(permission_hint(&not_writable))
        } else {
            None
        };

        Self {
            leds,
            permission_error,
        }
    }

    pub fn has_leds(&self) -> bool {
        !self.leds.is_empty()
    }

    /// Light or extinguish every LED, failing on the first write error
    pub fn set_all(&self, enabled: bool, intensity: f32) -> io::Result<()> {
        for led in &self.leds {
            if enabled {
                led.torch(intensity)?;
            } else {
                led.off()?;
            }
        }
        Ok(())
    }
}

/// Explain how to get write access, naming the group that owns the file
fn permission_hint(paths: &[PathBuf]) -> String {
    let username = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

    let group = paths
        .first()
        .and_then(|path| {
            let gid = std::fs::metadata(path).ok()?.gid();
            let groups = std::fs::read_to_string("/etc/group").ok()?;
            groups.lines().find_map(|line| {
                let parts: Vec<&str> = line.split(':').collect();
                (parts.len() >= 3 && parts[2].parse::<u32>().ok() == Some(gid))
                    .then(|| parts[0].to_string())
            })
        })
        .unwrap_or_else(|| "feedbackd".to_string());

    format!("torch LED is not writable; add {username} to the '{group}' group and log in again")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_led(root: &Path, name: &str, max: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("max_brightness"), max).unwrap();
        std::fs::write(dir.join("brightness"), "0").unwrap();
        dir
    }

    #[test]
    fn test_detect_filters_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        fake_led(root.path(), "yellow:flash", "255\n");
        fake_led(root.path(), "white:torch", "100\n");
        fake_led(root.path(), "input0::capslock", "1\n");
        fake_led(root.path(), "red:flash", "0\n");

        let hw = TorchHardware::detect_in(root.path());
        let names: Vec<&str> = hw.leds.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["white:torch", "yellow:flash"]);
        assert!(hw.permission_error.is_none());
    }

    #[test]
    fn test_torch_writes_brightness() {
        let root = tempfile::tempdir().unwrap();
        let dir = fake_led(root.path(), "white:flash", "200");

        let hw = TorchHardware::detect_in(root.path());
        hw.set_all(true, 0.5).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("brightness")).unwrap(), "100");

        hw.set_all(false, 0.5).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("brightness")).unwrap(), "0");
    }

    #[test]
    fn test_missing_directory() {
        let hw = TorchHardware::detect_in(Path::new("/nonexistent/leds"));
        assert!(!hw.has_leds());
    }
}
