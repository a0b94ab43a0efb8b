// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 control interface
//!
//! Raw ioctl access to the handful of V4L2 controls a magnifier needs:
//! device capabilities, optical/digital zoom and the flash LED torch mode.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CTRL_CLASS_FLASH: u32 = 0x009c0000;

const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;
const V4L2_CID_FLASH_CLASS_BASE: u32 = V4L2_CTRL_CLASS_FLASH | 0x900;

/// Absolute zoom position (device units)
pub const V4L2_CID_ZOOM_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 13;
/// Flash LED mode menu: none, flash, torch
pub const V4L2_CID_FLASH_LED_MODE: u32 = V4L2_CID_FLASH_CLASS_BASE + 1;
/// Torch intensity (device units)
pub const V4L2_CID_FLASH_TORCH_INTENSITY: u32 = V4L2_CID_FLASH_CLASS_BASE + 8;

/// `V4L2_CID_FLASH_LED_MODE` menu values
pub const V4L2_FLASH_LED_MODE_NONE: i32 = 0;
pub const V4L2_FLASH_LED_MODE_TORCH: i32 = 2;

/// `device_caps` bit for single-planar video capture
pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
/// Set in `capabilities` when `device_caps` is filled in
const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;
const V4L2_CTRL_FLAG_INACTIVE: u32 = 0x0010;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr

/// Query device capabilities (v4l2_capability: 104 bytes)
const VIDIOC_QUERYCAP: libc::c_ulong = 0x8068_5600;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

// ===== V4L2 ioctl Structures =====

#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

// ===== Public Types =====

/// Identity of a V4L2 node from QUERYCAP
#[derive(Debug, Clone)]
pub struct V4l2DeviceInfo {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Capability bits of this node (falls back to the whole device)
    pub device_caps: u32,
}

impl V4l2DeviceInfo {
    /// Node can stream single-planar video capture
    pub fn is_video_capture(&self) -> bool {
        self.device_caps & V4L2_CAP_VIDEO_CAPTURE != 0
    }
}

/// Range information about a V4L2 control
#[derive(Debug, Clone, PartialEq)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    pub fn is_inactive(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_INACTIVE != 0
    }

    /// Map a zoom ratio in `[min_ratio, max_ratio]` linearly onto this
    /// control's range, snapped to its step
    pub fn value_for_ratio(&self, ratio: f32, min_ratio: f32, max_ratio: f32) -> i32 {
        let span = (max_ratio - min_ratio).max(f32::EPSILON);
        let t = ((ratio - min_ratio) / span).clamp(0.0, 1.0);
        let raw = self.minimum as f32 + t * (self.maximum - self.minimum) as f32;
        let step = self.step.max(1) as f32;
        let snapped = self.minimum as f32 + ((raw - self.minimum as f32) / step).round() * step;
        (snapped as i32).clamp(self.minimum, self.maximum)
    }
}

// ===== Helper Functions =====

/// Extract a null-terminated string from a fixed-size byte array
fn extract_name(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

// ===== Public Functions =====

/// Query driver, card and capabilities of a device node
pub fn query_device_info(device_path: &str) -> Option<V4l2DeviceInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut caps = V4l2Capability {
        driver: [0; 16],
        card: [0; 32],
        bus_info: [0; 32],
        version: 0,
        capabilities: 0,
        device_caps: 0,
        reserved: [0; 3],
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP, &mut caps as *mut V4l2Capability) };
    if result < 0 {
        debug!(device_path, "QUERYCAP failed");
        return None;
    }

    let device_caps = if caps.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
        caps.device_caps
    } else {
        caps.capabilities
    };

    Some(V4l2DeviceInfo {
        driver: extract_name(&caps.driver),
        card: extract_name(&caps.card),
        bus_info: extract_name(&caps.bus_info),
        device_caps,
    })
}

/// Query if a control exists and get its range
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCTRL, &mut qctrl as *mut V4l2Queryctrl) };
    if result < 0 {
        return None;
    }

    Some(ControlInfo {
        id: qctrl.id,
        name: extract_name(&qctrl.name),
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        step: qctrl.step,
        default_value: qctrl.default_value,
        flags: qctrl.flags,
    })
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), String> {
    let file = File::open(device_path).map_err(|e| format!("Failed to open device: {}", e))?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(
            device_path,
            control_id,
            value,
            ?errno,
            "Failed to set V4L2 control"
        );
        return Err(format!("Failed to set control: {}", errno));
    }

    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }

    Ok(())
}

/// Check if a control is available and enabled on the device
pub fn has_control(device_path: &str, control_id: u32) -> bool {
    query_control(device_path, control_id)
        .map(|info| !info.is_disabled())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoom_control(minimum: i32, maximum: i32, step: i32) -> ControlInfo {
        ControlInfo {
            id: V4L2_CID_ZOOM_ABSOLUTE,
            name: "Zoom, Absolute".to_string(),
            minimum,
            maximum,
            step,
            default_value: minimum,
            flags: 0,
        }
    }

    #[test]
    fn test_control_id_values() {
        assert_eq!(V4L2_CID_ZOOM_ABSOLUTE, 0x009a090d);
        assert_eq!(V4L2_CID_FLASH_LED_MODE, 0x009c0901);
        assert_eq!(V4L2_CID_FLASH_TORCH_INTENSITY, 0x009c0908);
    }

    #[test]
    fn test_zoom_ratio_mapping() {
        let ctrl = zoom_control(100, 500, 1);
        assert_eq!(ctrl.value_for_ratio(1.0, 1.0, 5.0), 100);
        assert_eq!(ctrl.value_for_ratio(5.0, 1.0, 5.0), 500);
        assert_eq!(ctrl.value_for_ratio(3.0, 1.0, 5.0), 300);
        assert_eq!(ctrl.value_for_ratio(50.0, 1.0, 5.0), 500);
    }

    #[test]
    fn test_zoom_ratio_respects_step() {
        let ctrl = zoom_control(0, 10, 5);
        assert_eq!(ctrl.value_for_ratio(2.0, 1.0, 5.0), 5);
        assert_eq!(ctrl.value_for_ratio(4.5, 1.0, 5.0), 10);
    }

    #[test]
    fn test_extract_name() {
        let mut raw = [0u8; 32];
        raw[..4].copy_from_slice(b"uvcv");
        assert_eq!(extract_name(&raw), "uvcv");
    }
}
