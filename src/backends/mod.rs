// SPDX-License-Identifier: GPL-3.0-only

//! Camera platforms
//!
//! - [`camera`]: backend traits, frame types and the V4L2 platform
//! - [`virtual_camera`]: test pattern and still image sources
//!
//! [`platform_for`] turns the configured [`CameraSource`] into the platform
//! a session is built on.

pub mod camera;
pub mod virtual_camera;

use crate::config::{CameraSource, Config};
use camera::CameraPlatform;
use camera::v4l2::V4l2Platform;
use std::sync::Arc;
use virtual_camera::{VirtualPlatform, VirtualSource};

/// Build the platform for `config.source`
pub fn platform_for(config: &Config) -> Arc<dyn CameraPlatform> {
    match &config.source {
        CameraSource::V4l2 { device } => Arc::new(
            V4l2Platform::new(device.clone())
                .with_resolution(config.capture_width, config.capture_height)
                .with_torch_intensity(config.torch_intensity),
        ),
        CameraSource::TestPattern => Arc::new(
            VirtualPlatform::new(VirtualSource::TestPattern {
                width: config.capture_width,
                height: config.capture_height,
            })
            .with_torch_intensity(config.torch_intensity),
        ),
        CameraSource::Image { path } => Arc::new(
            VirtualPlatform::new(VirtualSource::Image(path.clone()))
                .with_torch_intensity(config.torch_intensity),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_follows_source() {
        let mut config = Config::default();
        assert_eq!(platform_for(&config).name(), "v4l2");

        config.source = CameraSource::TestPattern;
        assert_eq!(platform_for(&config).name(), "virtual");

        config.source = CameraSource::Image {
            path: "/tmp/page.png".into(),
        };
        assert_eq!(platform_for(&config).name(), "virtual");
    }
}
