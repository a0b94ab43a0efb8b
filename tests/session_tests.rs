// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the camera session lifecycle

mod common;

use common::{HwEvent, failing_session, fast_settings, scripted_session};
use futures::StreamExt;
use magnifier::constants::zoom::{DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM};
use magnifier::{CameraSession, LifecycleScope, SessionState};
use std::sync::Arc;

#[tokio::test]
async fn test_zoom_is_clamped_without_binding() {
    let (session, script) = scripted_session();

    session.set_zoom(10.0).await;
    assert_eq!(session.state().zoom_level, MAX_ZOOM);

    session.set_zoom(0.1).await;
    assert_eq!(session.state().zoom_level, MIN_ZOOM);

    session.set_zoom(2.25).await;
    assert_eq!(session.state().zoom_level, 2.25);

    session.set_zoom(f32::NAN).await;
    assert_eq!(session.state().zoom_level, DEFAULT_ZOOM);

    // Nothing bound, nothing reached the hardware
    assert!(script.events().is_empty());
    assert!(session.state().error.is_none());
}

#[tokio::test]
async fn test_initialize_binds_and_publishes() {
    let (session, script) = scripted_session();
    let mut transitions = session.transitions();

    assert!(session.initialize().await);

    let state = session.state();
    assert!(!state.loading);
    assert!(state.initialized);
    assert!(state.bound);
    assert!(state.error.is_none());

    let events = script.events();
    assert_eq!(events[0], HwEvent::Acquire);
    assert_eq!(events[1], HwEvent::Bind);
    assert!(events.contains(&HwEvent::Zoom(DEFAULT_ZOOM)));

    let published = transitions.try_recv().unwrap();
    assert_eq!(published, state);

    session.release().await;
}

#[tokio::test]
async fn test_zoom_after_initialize_reaches_hardware() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);

    session.set_zoom(100.0).await;

    assert_eq!(session.state().zoom_level, 5.0);
    assert_eq!(script.events().last(), Some(&HwEvent::Zoom(5.0)));
    session.release().await;
}

#[tokio::test]
async fn test_toggle_flash_twice_while_bound() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    script.clear_events();

    assert!(session.toggle_flash().await);
    assert!(session.state().flash_enabled);
    assert!(!session.toggle_flash().await);
    assert!(!session.state().flash_enabled);

    assert_eq!(
        script.events(),
        vec![HwEvent::Torch(true), HwEvent::Torch(false)]
    );
    session.release().await;
}

#[tokio::test]
async fn test_toggle_flash_unbound_fails_closed() {
    let (session, script) = scripted_session();
    let before = session.state();

    assert!(!session.toggle_flash().await);

    assert_eq!(session.state(), before);
    assert!(script.events().is_empty());
}

#[tokio::test]
async fn test_toggle_flash_hardware_failure_keeps_flag() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    script.fail_torch(true);

    assert!(!session.toggle_flash().await);

    let state = session.state();
    assert!(!state.flash_enabled);
    assert!(state.error.as_deref().unwrap().contains("torch LED busy"));
    session.release().await;
}

#[tokio::test]
async fn test_zoom_failure_still_stores_value() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    script.fail_zoom(true);

    session.set_zoom(3.0).await;

    let state = session.state();
    assert_eq!(state.zoom_level, 3.0);
    assert!(state.error.as_deref().unwrap().contains("zoom motor jammed"));
    session.release().await;
}

#[tokio::test]
async fn test_capture_frame_lifecycle() {
    let (session, _script) = scripted_session();
    assert!(session.capture_frame().is_none());

    assert!(session.initialize().await);
    let frame = session.capture_frame().unwrap();
    assert_eq!((frame.width, frame.height), (2, 2));
    assert_eq!(frame.pixel_rgb(0, 0), (42, 255, 255));

    // Copies are independent of each other
    let again = session.capture_frame().unwrap();
    assert!(!Arc::ptr_eq(&frame.data, &again.data));

    session.pause().await;
    assert!(session.capture_frame().is_none());

    session.release().await;
    assert!(session.capture_frame().is_none());
    assert!(session.state().error.is_none());
}

#[tokio::test]
async fn test_freeze_flag_changes_nothing_else() {
    let (session, _script) = scripted_session();
    assert!(session.initialize().await);
    session.set_zoom(2.0).await;
    let before = session.state();

    session.set_frozen(true);
    let frozen = session.state();
    assert!(frozen.frozen);
    assert_eq!(
        SessionState {
            frozen: false,
            ..frozen
        },
        before
    );

    session.set_frozen(false);
    assert_eq!(session.state(), before);
    session.release().await;
}

#[tokio::test]
async fn test_provider_failure_reports_error() {
    let (session, _script) = failing_session("boom");

    assert!(!session.initialize().await);

    let state = session.state();
    assert!(state.error.as_deref().unwrap().contains("boom"));
    assert!(!state.loading);
    assert!(!state.initialized);
    assert!(!state.bound);
}

#[tokio::test]
async fn test_initialize_recovers_after_failure() {
    let (session, script) = failing_session("boom");
    assert!(!session.initialize().await);

    script.succeed_acquire();
    assert!(session.initialize().await);

    let state = session.state();
    assert!(state.bound);
    assert!(state.initialized);
    // The old message stays until cleared
    assert!(state.error.is_some());

    session.clear_error();
    assert!(session.state().error.is_none());
    session.release().await;
}

#[tokio::test]
async fn test_failed_reinitialize_drops_old_binding() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);

    script.fail_acquire("boom");
    script.clear_events();
    assert!(!session.initialize().await);

    let state = session.state();
    assert!(!state.bound);
    assert!(state.error.as_deref().unwrap().contains("boom"));
    assert!(script.events().contains(&HwEvent::UnbindAll));

    // Nothing may still be driving the torch or the surface
    script.clear_events();
    assert!(!session.toggle_flash().await);
    assert!(!session.state().flash_enabled);
    assert!(script.events().is_empty());
    assert!(session.capture_frame().is_none());

    // The provider is gone too, so resume cannot bind the old one
    assert!(!session.resume().await);
    assert!(!session.state().bound);
    session.release().await;
}

#[tokio::test]
async fn test_inactive_scope_refuses_bind() {
    let (_, script) = scripted_session();
    let platform = Arc::new(common::ScriptedPlatform::from_script(Arc::clone(&script)));
    let scope = LifecycleScope::new("hidden");
    let session = CameraSession::with_settings(platform, scope.clone(), fast_settings());

    assert!(!session.initialize().await);
    assert!(session.state().error.as_deref().unwrap().contains("not active"));

    scope.activate();
    assert!(session.initialize().await);
    session.release().await;
}

#[tokio::test]
async fn test_pause_resume_restores_controls() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    session.set_zoom(2.5).await;
    assert!(session.toggle_flash().await);

    session.pause().await;
    let paused = session.state();
    assert!(!paused.bound);
    assert!(paused.initialized);
    assert_eq!(paused.zoom_level, 2.5);
    assert!(paused.flash_enabled);

    script.clear_events();
    assert!(session.resume().await);

    let resumed = session.state();
    assert!(resumed.bound);
    assert_eq!(resumed.zoom_level, 2.5);
    assert!(resumed.flash_enabled);
    assert_eq!(
        script.events(),
        vec![HwEvent::Bind, HwEvent::Zoom(2.5), HwEvent::Torch(true)]
    );
    session.release().await;
}

#[tokio::test]
async fn test_resume_while_bound_rebinds() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    script.clear_events();

    assert!(session.resume().await);

    assert_eq!(
        script.events(),
        vec![HwEvent::UnbindAll, HwEvent::Bind, HwEvent::Zoom(DEFAULT_ZOOM)]
    );
    assert!(session.state().bound);
    assert!(session.capture_frame().is_some());
    session.release().await;
}

#[tokio::test]
async fn test_zoom_while_paused_applies_on_resume() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    session.pause().await;
    script.clear_events();

    session.set_zoom(4.0).await;
    assert!(script.events().is_empty());

    assert!(session.resume().await);
    assert!(script.events().contains(&HwEvent::Zoom(4.0)));
    session.release().await;
}

#[tokio::test]
async fn test_resume_torch_failure_turns_flag_off() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    assert!(session.toggle_flash().await);
    session.pause().await;

    script.fail_torch(true);
    assert!(session.resume().await);

    let state = session.state();
    assert!(state.bound);
    assert!(!state.flash_enabled);
    assert!(state.error.is_some());
    session.release().await;
}

#[tokio::test]
async fn test_pause_when_unbound_is_noop() {
    let (session, script) = scripted_session();
    let before = session.state();

    session.pause().await;

    assert_eq!(session.state(), before);
    assert!(script.events().is_empty());
}

#[tokio::test]
async fn test_resume_without_provider_fails() {
    let (session, _script) = scripted_session();

    assert!(!session.resume().await);

    let state = session.state();
    assert!(!state.bound);
    assert!(state.error.as_deref().unwrap().contains("not initialized"));
}

#[tokio::test]
async fn test_release_resets_and_disables_session() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    session.set_zoom(3.0).await;
    assert!(session.toggle_flash().await);

    session.release().await;
    assert!(session.is_released());
    assert_eq!(session.state(), SessionState::default());
    assert_eq!(script.events().last(), Some(&HwEvent::UnbindAll));

    script.clear_events();
    session.release().await;
    assert!(!session.initialize().await);
    assert!(!session.resume().await);
    session.pause().await;
    session.set_zoom(2.0).await;
    assert!(!session.toggle_flash().await);
    session.set_frozen(true);
    session.clear_error();

    assert_eq!(session.state(), SessionState::default());
    assert!(script.events().is_empty());
}

#[tokio::test]
async fn test_hardware_calls_share_one_thread() {
    let (session, script) = scripted_session();
    assert!(session.initialize().await);
    session.set_zoom(2.0).await;
    session.toggle_flash().await;
    session.pause().await;
    session.resume().await;
    session.release().await;

    let threads = script.hardware_threads();
    assert!(!threads.is_empty());
    assert!(threads.iter().all(|t| t.as_deref() == Some("camera-hw")));
}

#[tokio::test]
async fn test_state_stream_yields_current_then_changes() {
    let (session, _script) = scripted_session();
    let mut stream = Box::pin(session.state_stream());

    let first = stream.next().await.unwrap();
    assert_eq!(first, SessionState::default());

    session.set_frozen(true);
    let next = stream.next().await.unwrap();
    assert!(next.frozen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_release_during_operations_is_safe() {
    let (session, _script) = scripted_session();
    let session = Arc::new(session);
    assert!(session.initialize().await);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            session.set_zoom(1.0 + i as f32 * 0.25).await;
            session.toggle_flash().await;
            let _ = session.capture_frame();
        }));
    }
    let releaser = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.release().await })
    };

    for task in tasks {
        task.await.unwrap();
    }
    releaser.await.unwrap();

    assert!(session.is_released());
    assert!(session.capture_frame().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_racing_release_leaves_default_state() {
    for _ in 0..32 {
        let (session, _script) = scripted_session();
        let session = Arc::new(session);
        assert!(session.initialize().await);

        let pausing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.pause().await })
        };
        let releasing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.release().await })
        };
        pausing.await.unwrap();
        releasing.await.unwrap();

        assert_eq!(session.state(), SessionState::default());
    }
}
