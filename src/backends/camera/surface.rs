// SPDX-License-Identifier: GPL-3.0-only

//! Latest-frame slot shared between a capture thread and the session

use super::{CameraFrame, CaptureSurface};
use std::sync::Mutex;

/// Holds the most recent frame produced by a capture loop
///
/// The capture thread replaces the frame on every iteration; readers take a
/// deep copy so nothing they keep aliases the slot.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<CameraFrame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame
    pub fn publish(&self, frame: CameraFrame) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = Some(frame);
    }

    /// Drop the stored frame (used on unbind)
    pub fn clear(&self) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = None;
    }

    pub fn has_frame(&self) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl CaptureSurface for FrameSlot {
    fn snapshot(&self) -> Option<CameraFrame> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest
            .as_ref()
            .filter(|frame| frame.is_complete())
            .map(CameraFrame::to_copied)
    }
}
