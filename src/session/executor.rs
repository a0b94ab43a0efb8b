// SPDX-License-Identifier: GPL-3.0-only

//! Serialized hardware thread
//!
//! Camera stacks expect bind, unbind and control calls to come from one
//! consistent thread. The executor owns that thread together with the
//! provider and the current binding; everything else reaches the hardware
//! by submitting a job and awaiting its reply.

use crate::backends::camera::{CameraHandle, CameraProvider};
use crate::errors::CameraError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Camera binding as seen by the hardware thread
pub enum Binding {
    Unbound,
    Bound(Box<dyn CameraHandle>),
}

impl Binding {
    pub fn is_bound(&self) -> bool {
        matches!(self, Binding::Bound(_))
    }

    pub fn handle_mut(&mut self) -> Option<&mut (dyn CameraHandle + 'static)> {
        match self {
            Binding::Bound(handle) => Some(handle.as_mut()),
            Binding::Unbound => None,
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Unbound => write!(f, "Unbound"),
            Binding::Bound(handle) => write!(f, "Bound({})", handle.device().name),
        }
    }
}

/// Resources only the hardware thread may touch
pub struct HardwareContext {
    pub provider: Option<Box<dyn CameraProvider>>,
    pub binding: Binding,
}

impl HardwareContext {
    fn new() -> Self {
        Self {
            provider: None,
            binding: Binding::Unbound,
        }
    }
}

impl Drop for HardwareContext {
    fn drop(&mut self) {
        self.binding = Binding::Unbound;
        if let Some(provider) = self.provider.as_mut()
            && let Err(e) = provider.unbind_all()
        {
            warn!(error = %e, "Unbind during hardware thread shutdown failed");
        }
    }
}

type Job = Box<dyn FnOnce(&mut HardwareContext) + Send>;

/// Single worker thread that runs hardware jobs in submission order
pub struct HardwareExecutor {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl HardwareExecutor {
    /// Spawn the worker thread
    pub fn spawn(name: &str) -> Result<Self, CameraError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = name.to_string();

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, "Hardware thread started");
                let mut context = HardwareContext::new();
                while let Ok(job) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(|| job(&mut context))).is_err() {
                        error!(thread = %thread_name, "Hardware job panicked");
                    }
                }
                drop(context);
                debug!(thread = %thread_name, "Hardware thread finished");
            })
            .map_err(|e| CameraError::ExecutorUnavailable(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// An executor without a thread; every job fails with
    /// [`CameraError::ExecutorUnavailable`]
    pub fn closed() -> Self {
        Self {
            sender: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Run `f` on the hardware thread and wait for its result
    pub async fn run<R, F>(&self, f: F) -> Result<R, CameraError>
    where
        R: Send + 'static,
        F: FnOnce(&mut HardwareContext) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |context| {
            let _ = reply_tx.send(f(context));
        });

        {
            let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
            let Some(sender) = sender.as_ref() else {
                return Err(CameraError::ExecutorUnavailable(
                    "session has been released".to_string(),
                ));
            };
            sender.send(job).map_err(|_| {
                CameraError::ExecutorUnavailable("hardware thread has exited".to_string())
            })?;
        }

        reply_rx
            .await
            .map_err(|_| CameraError::ExecutorUnavailable("hardware job aborted".to_string()))
    }

    /// Whether jobs can still be submitted
    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Stop accepting jobs, let queued jobs finish and join the thread
    ///
    /// Idempotent. The join happens on a blocking worker so async callers
    /// are not stalled.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(thread) = thread else {
            return;
        };

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => info!("Hardware thread joined"),
            Ok(Err(_)) => warn!("Hardware thread panicked during shutdown"),
            Err(e) => warn!(error = %e, "Failed to join hardware thread"),
        }
    }
}

impl Drop for HardwareExecutor {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain and exit on its own
        let sender = self
            .sender
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_jobs_run_on_one_thread_in_order() {
        let executor = HardwareExecutor::spawn("test-hw").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut names = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            let name = executor
                .run(move |_| {
                    order.lock().unwrap().push(i);
                    thread::current().name().map(str::to_string)
                })
                .await
                .unwrap();
            names.push(name);
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(names.iter().all(|n| n.as_deref() == Some("test-hw")));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_reports_error_and_thread_survives() {
        let executor = HardwareExecutor::spawn("test-panic").unwrap();

        let result: Result<(), _> = executor.run(|_| panic!("hardware exploded")).await;
        assert!(matches!(result, Err(CameraError::ExecutorUnavailable(_))));

        let ok = executor.run(|ctx| ctx.binding.is_bound()).await;
        assert_eq!(ok, Ok(false));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_after_shutdown_fails() {
        let executor = HardwareExecutor::spawn("test-shutdown").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        executor.shutdown().await;
        executor.shutdown().await;
        assert!(!executor.is_running());

        let c = Arc::clone(&counter);
        let result = executor
            .run(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
