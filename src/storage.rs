// SPDX-License-Identifier: GPL-3.0-only

//! Saving captured frames

use crate::backends::camera::CameraFrame;
use crate::config::Config;
use crate::constants::app_info;
use crate::errors::{AppError, AppResult};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory snapshots are written to
///
/// The configured directory wins; otherwise `~/Pictures/magnifier`, or the
/// working directory when no picture directory is known.
pub fn snapshot_directory(config: &Config) -> PathBuf {
    if let Some(dir) = &config.snapshot_dir {
        return dir.clone();
    }
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Pictures")))
        .map(|pictures| pictures.join(app_info::APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Save `frame` as a timestamped PNG inside `dir`, creating it if needed
pub fn save_frame(frame: &CameraFrame, dir: &Path) -> AppResult<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::Storage(format!("cannot create {}: {}", dir.display(), e)))?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("MAG_{}.png", timestamp));
    // Several saves within one second get a counter suffix
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("MAG_{}_{}.png", timestamp, counter));
        counter += 1;
    }

    save_frame_to(frame, &path)?;
    Ok(path)
}

/// Save `frame` to an explicit path; the extension picks the format
pub fn save_frame_to(frame: &CameraFrame, path: &Path) -> AppResult<()> {
    let image = frame
        .to_rgba_image()
        .ok_or_else(|| AppError::Storage("frame buffer is incomplete".to_string()))?;

    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));

    // JPEG has no alpha channel
    let result = if is_jpeg {
        DynamicImage::ImageRgba8(image).to_rgb8().save(path)
    } else {
        image.save(path)
    };
    result.map_err(|e| AppError::Storage(format!("cannot write {}: {}", path.display(), e)))?;

    info!(path = %path.display(), width = frame.width, height = frame.height, "Frame saved");
    Ok(())
}
