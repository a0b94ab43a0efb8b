// SPDX-License-Identifier: GPL-3.0-only
//! Capture thread lifecycle
//!
//! Every provider feeds its [`FrameSlot`](super::FrameSlot) from a dedicated
//! thread. This module owns starting that thread, signalling it to stop and
//! joining it, so unbinding a camera always waits for its producer to exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the per-iteration callback wants the loop to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Shared flag a capture body polls to learn it should exit
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Owns one capture thread
///
/// Dropping the controller stops and joins the thread.
///
/// ```ignore
/// let slot = Arc::new(FrameSlot::new());
/// let producer = Arc::clone(&slot);
/// let mut capture = CaptureLoopController::start("test-pattern", move || {
///     producer.publish(render_next_frame());
///     LoopAction::Continue
/// });
/// // ...
/// capture.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: StopSignal,
    name: String,
}

impl CaptureLoopController {
    /// Run `loop_fn` repeatedly on a new thread until it returns
    /// [`LoopAction::Stop`] or the controller is stopped
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn(name, move |stop| {
            while !stop.is_set() {
                if loop_fn() == LoopAction::Stop {
                    break;
                }
            }
        })
    }

    /// Run `body` once on a new thread
    ///
    /// The body drives its own loop and must return soon after
    /// [`StopSignal::is_set`] turns true. Used when per-thread resources
    /// borrow from each other (a device and its mapped buffers).
    pub fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let stop_signal = StopSignal::default();
        let thread_stop = stop_signal.clone();
        let thread_name = name.to_string();

        info!(name = %name, "Starting capture loop");

        let spawned = thread::Builder::new()
            .name(format!("capture-{}", name))
            .spawn(move || {
                debug!(name = %thread_name, "Capture thread started");
                body(thread_stop);
                info!(name = %thread_name, "Capture thread exiting");
            });

        let thread_handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn capture thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the thread to stop without waiting for it
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.set();
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread without signalling it
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take()
            && let Err(e) = handle.join()
        {
            warn!(name = %self.name, "Capture thread panicked: {:?}", e);
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::start("self-stop", move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_signal_reaches_body() {
        let iterations = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&iterations);

        let mut controller = CaptureLoopController::spawn("owned-loop", move |stop| {
            while !stop.is_set() {
                seen.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }
        });

        thread::sleep(Duration::from_millis(30));
        assert!(controller.is_running());
        controller.stop();

        assert!(!controller.is_running());
        assert!(iterations.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_drop_joins_thread() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let controller = CaptureLoopController::spawn("drop-join", move |stop| {
            while !stop.is_set() {
                thread::sleep(Duration::from_millis(2));
            }
            flag.store(true, Ordering::SeqCst);
        });
        drop(controller);

        assert!(finished.load(Ordering::SeqCst));
    }
}
