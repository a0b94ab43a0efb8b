// SPDX-License-Identifier: GPL-3.0-only
//! Pixel conversions and CPU frame effects
//!
//! Device buffers are normalised to tightly packed RGBA here. Sources
//! without optical zoom or a real torch also get their digital zoom and
//! simulated illumination from this module.

use image::{RgbaImage, imageops};

/// Convert YUYV (YUV 4:2:2) to RGBA
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    'outer: for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgba.len() >= pixel_count * 4 {
                break 'outer;
            }
            rgba.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgba.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgba.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
            rgba.push(255);
        }
    }

    // Short buffers are padded so the frame stays complete
    rgba.resize(pixel_count * 4, 0);
    rgba
}

/// Decode one MJPEG buffer to RGBA, returning (pixels, width, height)
pub fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32), String> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| format!("JPEG decode failed: {}", e))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok((rgba.into_raw(), width, height))
}

/// Magnify the centre of an RGBA image by `ratio`, keeping its size
///
/// Ratios at or below 1.0 return the input unchanged.
pub fn digital_zoom(image: RgbaImage, ratio: f32) -> RgbaImage {
    if !(ratio > 1.0) {
        return image;
    }

    let (width, height) = image.dimensions();
    let crop_w = ((width as f32 / ratio).round() as u32).clamp(1, width);
    let crop_h = ((height as f32 / ratio).round() as u32).clamp(1, height);
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;

    let cropped = imageops::crop_imm(&image, x, y, crop_w, crop_h).to_image();
    imageops::resize(&cropped, width, height, imageops::FilterType::Triangle)
}

/// Simulate a torch by lifting every colour channel towards white
///
/// `intensity` is 0.0 (no change) to 1.0 (half-way to white).
pub fn torch_glow(image: &mut RgbaImage, intensity: f32) {
    let gain = intensity.clamp(0.0, 1.0) * 0.5;
    if gain <= 0.0 {
        return;
    }
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            let value = pixel[c] as f32;
            pixel[c] = (value + (255.0 - value) * gain).round() as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray() {
        // Y=128, U=V=128 is mid gray for both pixels
        let rgba = yuyv_to_rgba(&[128, 128, 128, 128], 2, 1);
        assert_eq!(rgba, vec![128, 128, 128, 255, 128, 128, 128, 255]);
    }

    #[test]
    fn test_yuyv_pads_short_buffer() {
        let rgba = yuyv_to_rgba(&[16, 128, 16, 128], 4, 1);
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[8..], &[0; 8]);
    }

    #[test]
    fn test_digital_zoom_keeps_size_and_magnifies_centre() {
        let mut img = RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        for y in 3..5 {
            for x in 3..5 {
                img.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
            }
        }

        let zoomed = digital_zoom(img, 4.0);
        assert_eq!(zoomed.dimensions(), (8, 8));
        assert_eq!(zoomed.get_pixel(0, 0)[0], 255);
        assert_eq!(zoomed.get_pixel(7, 7)[0], 255);
    }

    #[test]
    fn test_digital_zoom_identity() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        assert_eq!(digital_zoom(img.clone(), 1.0), img);
        assert_eq!(digital_zoom(img.clone(), f32::NAN), img);
    }

    #[test]
    fn test_torch_glow_brightens() {
        let mut img = RgbaImage::from_pixel(1, 1, image::Rgba([0, 100, 255, 255]));
        torch_glow(&mut img, 1.0);
        let p = img.get_pixel(0, 0);
        assert_eq!(p[0], 128);
        assert!(p[1] > 100);
        assert_eq!(p[2], 255);
        assert_eq!(p[3], 255);
    }
}
