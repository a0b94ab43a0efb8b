// SPDX-License-Identifier: GPL-3.0-only

//! Still sources for the virtual camera
//!
//! Loads an image file or renders a test pattern once; the capture loop
//! then derives every live frame from that base image.

use crate::backends::camera::types::{BackendError, BackendResult};
use image::{Rgba, RgbaImage};
use std::path::Path;
use tracing::{debug, info};

/// Colour bars, left to right
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Spacing of the fine grid drawn over the bars, in pixels
const GRID_SPACING: u32 = 16;

/// Supported still image extensions (lowercase)
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Check if a lowercase extension is a loadable image
pub fn is_image_extension(extension: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension)
}

/// Load an image file as RGBA
pub fn load_image(path: &Path) -> BackendResult<RgbaImage> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if !is_image_extension(&extension) {
        return Err(BackendError::ProviderUnavailable(format!(
            "Unsupported file format: {}",
            path.display()
        )));
    }

    let img = image::open(path).map_err(|e| {
        BackendError::ProviderUnavailable(format!("cannot load {}: {}", path.display(), e))
    })?;
    let rgba = img.to_rgba8();

    info!(
        path = %path.display(),
        width = rgba.width(),
        height = rgba.height(),
        "Loaded still image source"
    );
    Ok(rgba)
}

/// Render colour bars with a fine grid
///
/// The grid makes magnification visible even on the flat bars.
pub fn test_pattern(width: u32, height: u32) -> RgbaImage {
    let width = width.max(1);
    let height = height.max(1);
    debug!(width, height, "Rendering test pattern");

    RgbaImage::from_fn(width, height, |x, y| {
        if x % GRID_SPACING == 0 || y % GRID_SPACING == 0 {
            return Rgba([128, 128, 128, 255]);
        }
        let bar = ((x as u64 * BARS.len() as u64) / width as u64) as usize;
        let [r, g, b] = BARS[bar.min(BARS.len() - 1)];
        Rgba([r, g, b, 255])
    })
}
