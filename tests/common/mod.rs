// SPDX-License-Identifier: GPL-3.0-only

//! Scripted camera platform for session tests
//!
//! Records every hardware call together with the thread it ran on and lets
//! a test make acquisition, binding, zoom or torch fail on demand.

#![allow(dead_code)]

use magnifier::backends::camera::{
    BackendError, BackendResult, CameraDevice, CameraFacing, CameraFrame, CameraHandle,
    CameraPlatform, CameraProvider, CameraSelector, CaptureSurface, FrameSlot, LifecycleScope,
    UseCase,
};
use magnifier::{CameraSession, SessionSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call that reached the fake hardware
#[derive(Debug, Clone, PartialEq)]
pub enum HwEvent {
    Acquire,
    Bind,
    UnbindAll,
    Zoom(f32),
    Torch(bool),
}

/// Failure switches and call log shared by platform, provider and handles
#[derive(Debug, Default)]
pub struct Script {
    pub acquire_error: Mutex<Option<String>>,
    pub bind_error: Mutex<Option<String>>,
    pub zoom_fails: AtomicBool,
    pub torch_fails: AtomicBool,
    events: Mutex<Vec<(HwEvent, Option<String>)>>,
}

impl Script {
    fn record(&self, event: HwEvent) {
        let thread = std::thread::current().name().map(str::to_string);
        self.events.lock().unwrap().push((event, thread));
    }

    pub fn events(&self) -> Vec<HwEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    /// Threads that made bind, unbind and control calls
    pub fn hardware_threads(&self) -> Vec<Option<String>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, _)| *event != HwEvent::Acquire)
            .map(|(_, thread)| thread.clone())
            .collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn fail_acquire(&self, message: &str) {
        *self.acquire_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn succeed_acquire(&self) {
        *self.acquire_error.lock().unwrap() = None;
    }

    pub fn fail_torch(&self, fails: bool) {
        self.torch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn fail_zoom(&self, fails: bool) {
        self.zoom_fails.store(fails, Ordering::SeqCst);
    }
}

pub struct ScriptedPlatform {
    script: Arc<Script>,
}

impl ScriptedPlatform {
    pub fn from_script(script: Arc<Script>) -> Self {
        Self { script }
    }
}

impl CameraPlatform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    fn acquire_provider(&self) -> BackendResult<Box<dyn CameraProvider>> {
        self.script.record(HwEvent::Acquire);
        if let Some(message) = self.script.acquire_error.lock().unwrap().clone() {
            return Err(BackendError::ProviderUnavailable(message));
        }
        Ok(Box::new(ScriptedProvider {
            script: Arc::clone(&self.script),
            slot: None,
        }))
    }
}

struct ScriptedProvider {
    script: Arc<Script>,
    slot: Option<Arc<FrameSlot>>,
}

fn rear_camera() -> CameraDevice {
    CameraDevice {
        name: "Scripted rear camera".to_string(),
        path: "scripted:0".to_string(),
        facing: CameraFacing::Back,
        driver: None,
        supports_zoom: true,
        supports_torch: true,
    }
}

/// 2x2 frame whose first red byte carries `marker`
pub fn test_frame(marker: u8) -> CameraFrame {
    let mut data = vec![255u8; 16];
    data[0] = marker;
    CameraFrame::from_rgba(2, 2, data, marker as u64)
}

impl CameraProvider for ScriptedProvider {
    fn cameras(&self) -> Vec<CameraDevice> {
        vec![rear_camera()]
    }

    fn bind(
        &mut self,
        scope: &LifecycleScope,
        selector: &CameraSelector,
        _use_cases: &[UseCase],
    ) -> BackendResult<Box<dyn CameraHandle>> {
        scope.ensure_active()?;
        self.script.record(HwEvent::Bind);
        if let Some(message) = self.script.bind_error.lock().unwrap().clone() {
            return Err(BackendError::BindFailed(message));
        }
        let devices = self.cameras();
        let device = selector
            .select(&devices)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound("no camera".to_string()))?;

        let slot = Arc::new(FrameSlot::new());
        slot.publish(test_frame(42));
        self.slot = Some(Arc::clone(&slot));

        Ok(Box::new(ScriptedHandle {
            script: Arc::clone(&self.script),
            device,
            slot,
        }))
    }

    fn unbind_all(&mut self) -> BackendResult<()> {
        self.script.record(HwEvent::UnbindAll);
        if let Some(slot) = self.slot.take() {
            slot.clear();
        }
        Ok(())
    }
}

struct ScriptedHandle {
    script: Arc<Script>,
    device: CameraDevice,
    slot: Arc<FrameSlot>,
}

impl CameraHandle for ScriptedHandle {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn set_zoom_ratio(&mut self, ratio: f32) -> BackendResult<()> {
        self.script.record(HwEvent::Zoom(ratio));
        if self.script.zoom_fails.load(Ordering::SeqCst) {
            return Err(BackendError::ControlFailed("zoom motor jammed".to_string()));
        }
        Ok(())
    }

    fn enable_torch(&mut self, enabled: bool) -> BackendResult<()> {
        self.script.record(HwEvent::Torch(enabled));
        if self.script.torch_fails.load(Ordering::SeqCst) {
            return Err(BackendError::ControlFailed("torch LED busy".to_string()));
        }
        Ok(())
    }

    fn surface(&self) -> Arc<dyn CaptureSurface> {
        self.slot.clone()
    }
}

/// Settings with a short settle delay so resume tests stay fast
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        resume_settle_delay: Duration::from_millis(5),
        ..SessionSettings::default()
    }
}

/// Session on a fresh scripted platform with an active scope
pub fn scripted_session() -> (CameraSession, Arc<Script>) {
    let script = Arc::new(Script::default());
    let platform = Arc::new(ScriptedPlatform {
        script: Arc::clone(&script),
    });
    let session =
        CameraSession::with_settings(platform, LifecycleScope::active("test"), fast_settings());
    (session, script)
}

/// Session whose provider acquisition fails with `message`
pub fn failing_session(message: &str) -> (CameraSession, Arc<Script>) {
    let (session, script) = scripted_session();
    script.fail_acquire(message);
    (session, script)
}
