// SPDX-License-Identifier: GPL-3.0-only

//! Camera session
//!
//! [`CameraSession`] is the only owner of camera hardware. It acquires a
//! provider, binds and unbinds the capture pipeline, applies zoom and torch
//! requests, and publishes every resulting [`SessionState`].
//!
//! ```text
//!   UNINITIALIZED ──initialize ok──► BOUND ◄──resume── PAUSED
//!        │                             │                 ▲
//!        └──initialize err──► ERROR    └──────pause──────┘
//!
//!   any state ──release──► RELEASED (terminal)
//! ```
//!
//! Operations never return errors. Failures land in [`SessionState::error`]
//! and stay there until [`CameraSession::clear_error`].

pub mod executor;
pub mod state;

pub use state::{SessionState, StateStore};

use crate::backends::camera::{
    BackendError, CameraFrame, CameraHandle, CameraPlatform, CameraSelector, CaptureSurface,
    LifecycleScope, UseCase,
};
use crate::constants::{timing, zoom};
use crate::errors::CameraError;
use executor::{Binding, HardwareContext, HardwareExecutor};
use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Tunables for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Wait before re-binding in [`CameraSession::resume`]
    pub resume_settle_delay: Duration,
    /// Which camera to bind
    pub selector: CameraSelector,
    /// Use cases bound with the camera
    pub use_cases: Vec<UseCase>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            resume_settle_delay: timing::RESUME_SETTLE_DELAY,
            selector: CameraSelector::DEFAULT_BACK,
            use_cases: vec![UseCase::Preview, UseCase::Snapshot],
        }
    }
}

/// Result of a bind performed on the hardware thread
struct BindOutcome {
    surface: Arc<dyn CaptureSurface>,
    device_name: String,
    /// Torch state after restoring it
    flash_enabled: bool,
    /// Zoom or torch could not be re-applied
    control_error: Option<CameraError>,
}

/// Owns one camera for one lifecycle scope
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct CameraSession {
    platform: Arc<dyn CameraPlatform>,
    scope: LifecycleScope,
    settings: SessionSettings,
    executor: HardwareExecutor,
    state: Arc<StateStore>,
    /// Surface of the current binding, read by `capture_frame`
    surface: Mutex<Option<Arc<dyn CaptureSurface>>>,
    /// Serializes initialize, pause, resume and release
    lifecycle: tokio::sync::Mutex<()>,
    released: AtomicBool,
}

impl CameraSession {
    /// Create a session with default settings
    pub fn new(platform: Arc<dyn CameraPlatform>, scope: LifecycleScope) -> Self {
        Self::with_settings(platform, scope, SessionSettings::default())
    }

    /// Create a session
    ///
    /// Spawns the hardware thread. If the thread cannot be created the
    /// session starts in an error state and every hardware operation fails
    /// softly.
    pub fn with_settings(
        platform: Arc<dyn CameraPlatform>,
        scope: LifecycleScope,
        settings: SessionSettings,
    ) -> Self {
        let state = Arc::new(StateStore::new(SessionState::default()));

        let executor = match HardwareExecutor::spawn("camera-hw") {
            Ok(executor) => executor,
            Err(e) => {
                warn!(error = %e, "Hardware thread unavailable");
                state.update(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
                // A closed executor turns every later job into a soft error
                let closed = HardwareExecutor::closed();
                return Self::assemble(platform, scope, settings, closed, state);
            }
        };

        Self::assemble(platform, scope, settings, executor, state)
    }

    fn assemble(
        platform: Arc<dyn CameraPlatform>,
        scope: LifecycleScope,
        settings: SessionSettings,
        executor: HardwareExecutor,
        state: Arc<StateStore>,
    ) -> Self {
        info!(platform = platform.name(), scope = scope.name(), "Creating camera session");
        Self {
            platform,
            scope,
            settings,
            executor,
            state,
            surface: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            released: AtomicBool::new(false),
        }
    }

    // ===== State access =====

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Watch the current state (intermediate values may be skipped)
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Receive every transition from now on
    pub fn transitions(&self) -> broadcast::Receiver<SessionState> {
        self.state.transitions()
    }

    /// Stream yielding the current state and then each change
    pub fn state_stream(&self) -> impl Stream<Item = SessionState> + Send + use<> {
        let mut receiver = self.state.subscribe();
        async_stream::stream! {
            let first = receiver.borrow_and_update().clone();
            yield first;
            while receiver.changed().await.is_ok() {
                let next = receiver.borrow_and_update().clone();
                yield next;
            }
        }
    }

    pub fn scope(&self) -> &LifecycleScope {
        &self.scope
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    // ===== Lifecycle =====

    /// Acquire a provider and bind the camera
    ///
    /// Returns true iff the capture pipeline is bound afterwards.
    pub async fn initialize(&self) -> bool {
        if self.reject_released("initialize") {
            return false;
        }
        let _guard = self.lifecycle.lock().await;
        if self.reject_released("initialize") {
            return false;
        }

        info!(platform = self.platform.name(), "Initializing camera session");

        let platform = Arc::clone(&self.platform);
        let acquired = tokio::task::spawn_blocking(move || platform.acquire_provider()).await;
        let provider = match acquired {
            Ok(Ok(provider)) => provider,
            Ok(Err(e)) => {
                warn!(error = %e, "Camera provider acquisition failed");
                self.drop_provider().await;
                self.publish_bind_failure(CameraError::Acquisition(e));
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Camera provider acquisition aborted");
                self.drop_provider().await;
                self.publish_bind_failure(CameraError::Acquisition(BackendError::Other(
                    e.to_string(),
                )));
                return false;
            }
        };

        let scope = self.scope.clone();
        let settings = self.settings.clone();
        let state = Arc::clone(&self.state);
        let outcome = self
            .executor
            .run(move |ctx| {
                if let Some(mut previous) = ctx.provider.take() {
                    ctx.binding = Binding::Unbound;
                    if let Err(e) = previous.unbind_all() {
                        warn!(error = %e, "Unbinding previous provider failed");
                    }
                }
                ctx.provider = Some(provider);
                bind_in(ctx, &scope, &settings, &state)
            })
            .await
            .and_then(|result| result);

        self.finish_bind(outcome)
    }

    /// Unbind the camera, keeping the provider for a later resume
    pub async fn pause(&self) {
        if self.reject_released("pause") {
            return;
        }
        let _guard = self.lifecycle.lock().await;
        if self.reject_released("pause") {
            return;
        }

        self.clear_surface();
        let result = self.executor.run(unbind_in).await;

        match result {
            Ok(Ok(true)) => info!("Camera paused"),
            Ok(Ok(false)) => debug!("Pause requested while not bound"),
            Ok(Err(e)) => {
                warn!(error = %e, "Unbind reported an error");
                self.state.update(|s| s.error = Some(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Pause could not reach the hardware thread");
                self.state.update(|s| s.error = Some(e.to_string()));
            }
        }
        self.state.update(|s| s.bound = false);
    }

    /// Re-bind after the settle delay, restoring zoom and torch
    pub async fn resume(&self) -> bool {
        if self.reject_released("resume") {
            return false;
        }
        let _guard = self.lifecycle.lock().await;

        tokio::time::sleep(self.settings.resume_settle_delay).await;
        if self.reject_released("resume") {
            return false;
        }

        let scope = self.scope.clone();
        let settings = self.settings.clone();
        let state = Arc::clone(&self.state);
        let outcome = self
            .executor
            .run(move |ctx| {
                if ctx.provider.is_none() {
                    return Err(CameraError::NotAcquired);
                }
                bind_in(ctx, &scope, &settings, &state)
            })
            .await
            .and_then(|result| result);

        self.finish_bind(outcome)
    }

    /// Tear everything down; the session cannot be used afterwards
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!("Camera session already released");
            return;
        }
        let _guard = self.lifecycle.lock().await;
        info!("Releasing camera session");

        self.drop_provider().await;

        self.executor.shutdown().await;
        self.clear_surface();
        self.state.replace(SessionState::default());
        info!("Camera session released");
    }

    // ===== Controls =====

    /// Set the zoom ratio, clamped to the session range
    ///
    /// The clamped value is stored even when nothing is bound and is
    /// re-applied on the next bind.
    pub async fn set_zoom(&self, level: f32) {
        if self.reject_released("set_zoom") {
            return;
        }
        let ratio = zoom::clamp_zoom(level);
        let state = Arc::clone(&self.state);

        let result = self
            .executor
            .run(move |ctx| {
                let applied = ctx
                    .binding
                    .handle_mut()
                    .map(|handle| handle.set_zoom_ratio(ratio));
                state.update(|s| {
                    s.zoom_level = ratio;
                    if let Some(Err(e)) = &applied {
                        s.error = Some(CameraError::Control(e.clone()).to_string());
                    }
                });
                applied
            })
            .await;

        match result {
            Ok(Some(Ok(()))) => debug!(ratio, "Zoom applied"),
            Ok(None) => debug!(ratio, "Zoom stored for next bind"),
            Ok(Some(Err(e))) => warn!(ratio, error = %e, "Zoom request failed"),
            Err(e) => {
                // Hardware thread gone: the stored value must still follow the request
                warn!(error = %e, "Zoom could not reach the hardware thread");
                if !self.is_released() {
                    self.state.update(|s| {
                        s.zoom_level = ratio;
                        s.error = Some(e.to_string());
                    });
                }
            }
        }
    }

    /// Invert the torch; returns the torch state afterwards
    ///
    /// Fails closed: without a bound camera nothing changes and false is
    /// returned. The new state is committed only once the hardware accepts it.
    pub async fn toggle_flash(&self) -> bool {
        if self.reject_released("toggle_flash") {
            return false;
        }
        let state = Arc::clone(&self.state);

        let result = self
            .executor
            .run(move |ctx| {
                let Some(handle) = ctx.binding.handle_mut() else {
                    return Ok(false);
                };
                let requested = !state.get().flash_enabled;
                match handle.enable_torch(requested) {
                    Ok(()) => {
                        state.update(|s| s.flash_enabled = requested);
                        Ok(requested)
                    }
                    Err(e) => {
                        let current = state
                            .update(|s| s.error = Some(CameraError::Control(e.clone()).to_string()))
                            .flash_enabled;
                        Err((e, current))
                    }
                }
            })
            .await;

        match result {
            Ok(Ok(enabled)) => {
                debug!(enabled, "Torch toggled");
                enabled
            }
            Ok(Err((e, current))) => {
                warn!(error = %e, "Torch request failed");
                current
            }
            Err(e) => {
                warn!(error = %e, "Torch toggle could not reach the hardware thread");
                false
            }
        }
    }

    /// Copy of the frame currently shown by the live feed
    ///
    /// None when nothing is bound or no frame has arrived yet. Never sets
    /// an error.
    pub fn capture_frame(&self) -> Option<CameraFrame> {
        if self.is_released() {
            return None;
        }
        let surface = self
            .surface
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        let frame = surface.snapshot();
        if frame.is_none() {
            debug!("No frame available to capture");
        }
        frame
    }

    /// Mark whether the UI is showing a frozen still
    pub fn set_frozen(&self, frozen: bool) {
        if self.reject_released("set_frozen") {
            return;
        }
        self.state.update(|s| s.frozen = frozen);
    }

    /// Dismiss the current error
    pub fn clear_error(&self) {
        if self.reject_released("clear_error") {
            return;
        }
        self.state.update(|s| s.error = None);
    }

    // ===== Internals =====

    fn reject_released(&self, operation: &str) -> bool {
        let released = self.is_released();
        if released {
            warn!(operation, "Ignoring call on released camera session");
        }
        released
    }

    fn clear_surface(&self) {
        *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Unbind and forget the provider so no stale handle outlives a failure
    async fn drop_provider(&self) {
        self.clear_surface();
        let result = self
            .executor
            .run(|ctx| {
                let unbound = unbind_in(ctx);
                ctx.provider = None;
                unbound
            })
            .await;

        match result {
            Ok(Ok(true)) => debug!("Previous binding torn down"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => warn!(error = %e, "Unbinding camera failed"),
            Err(e) => debug!(error = %e, "Hardware thread unavailable for unbind"),
        }
    }

    fn publish_bind_failure(&self, error: CameraError) {
        self.clear_surface();
        self.state.update(|s| {
            s.loading = false;
            s.bound = false;
            s.error = Some(error.to_string());
        });
    }

    fn finish_bind(&self, outcome: Result<BindOutcome, CameraError>) -> bool {
        match outcome {
            Ok(outcome) => {
                info!(device = %outcome.device_name, "Camera bound");
                *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome.surface);
                self.state.update(|s| {
                    s.loading = false;
                    s.initialized = true;
                    s.bound = true;
                    s.flash_enabled = outcome.flash_enabled;
                    if let Some(e) = &outcome.control_error {
                        s.error = Some(e.to_string());
                    }
                });
                true
            }
            Err(e) => {
                warn!(error = %e, "Camera bind failed");
                self.publish_bind_failure(e);
                false
            }
        }
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("platform", &self.platform.name())
            .field("scope", &self.scope.name())
            .field("released", &self.is_released())
            .field("state", &self.state.get())
            .finish()
    }
}

/// Bind on the hardware thread and restore zoom and torch from `state`
fn bind_in(
    ctx: &mut HardwareContext,
    scope: &LifecycleScope,
    settings: &SessionSettings,
    state: &StateStore,
) -> Result<BindOutcome, CameraError> {
    let provider = ctx.provider.as_mut().ok_or(CameraError::NotAcquired)?;

    if ctx.binding.is_bound() {
        ctx.binding = Binding::Unbound;
        if let Err(e) = provider.unbind_all() {
            warn!(error = %e, "Unbind before re-bind failed");
        }
    }

    let mut handle = provider
        .bind(scope, &settings.selector, &settings.use_cases)
        .map_err(CameraError::Bind)?;

    let last = state.get();
    let control_error = restore_controls(handle.as_mut(), &last);
    let flash_enabled = last.flash_enabled && control_error.as_ref().is_none_or(|(_, torch)| !torch);

    let outcome = BindOutcome {
        surface: handle.surface(),
        device_name: handle.device().name.clone(),
        flash_enabled,
        control_error: control_error.map(|(e, _)| e),
    };
    ctx.binding = Binding::Bound(handle);
    Ok(outcome)
}

/// Re-apply zoom and torch; the flag is true when the torch failed
fn restore_controls(handle: &mut dyn CameraHandle, last: &SessionState) -> Option<(CameraError, bool)> {
    let mut failure = None;

    if let Err(e) = handle.set_zoom_ratio(last.zoom_level) {
        warn!(ratio = last.zoom_level, error = %e, "Restoring zoom failed");
        failure = Some((CameraError::Control(e), false));
    }

    if last.flash_enabled
        && let Err(e) = handle.enable_torch(true)
    {
        warn!(error = %e, "Restoring torch failed");
        failure = Some((CameraError::Control(e), true));
    }

    failure
}

/// Unbind on the hardware thread; Ok(true) when something was bound
fn unbind_in(ctx: &mut HardwareContext) -> Result<bool, CameraError> {
    let was_bound = ctx.binding.is_bound();
    ctx.binding = Binding::Unbound;

    if was_bound && let Some(provider) = ctx.provider.as_mut() {
        provider.unbind_all().map_err(CameraError::Teardown)?;
    }
    Ok(was_bound)
}
