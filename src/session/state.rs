// SPDX-License-Identifier: GPL-3.0-only

//! Session state value and its publisher

use crate::constants::zoom::DEFAULT_ZOOM;
use tokio::sync::{broadcast, watch};

/// Capacity of the transition channel before slow subscribers start lagging
const TRANSITION_CAPACITY: usize = 64;

/// Snapshot of everything the UI needs to render the camera
///
/// Values are never mutated in place by readers: every change publishes a
/// complete new value.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// True until the first bind succeeds or initialization fails
    pub loading: bool,
    /// The pipeline has been bound at least once
    pub initialized: bool,
    /// A hardware handle is bound right now
    pub bound: bool,
    /// Torch state as last applied to hardware
    pub flash_enabled: bool,
    /// The UI is showing a captured still
    pub frozen: bool,
    /// Current zoom ratio, always within the session's range
    pub zoom_level: f32,
    /// Last failure, kept until cleared
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            loading: true,
            initialized: false,
            bound: false,
            flash_enabled: false,
            frozen: false,
            zoom_level: DEFAULT_ZOOM,
            error: None,
        }
    }
}

impl SessionState {
    /// The live feed can be shown
    pub fn is_live(&self) -> bool {
        self.bound && !self.frozen
    }
}

/// Single-writer state container
///
/// Holds the current value in a `watch` channel and mirrors each transition
/// onto a `broadcast` channel for subscribers that must see every step.
/// Both are updated under the watch lock, so the two views never disagree
/// on ordering.
#[derive(Debug)]
pub struct StateStore {
    current: watch::Sender<SessionState>,
    transitions: broadcast::Sender<SessionState>,
}

impl StateStore {
    pub fn new(initial: SessionState) -> Self {
        let (current, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            current,
            transitions,
        }
    }

    /// Clone of the current value
    pub fn get(&self) -> SessionState {
        self.current.borrow().clone()
    }

    /// Apply `f` to a copy of the current value and publish it if it changed
    ///
    /// Returns the value that is current afterwards.
    pub fn update<F>(&self, f: F) -> SessionState
    where
        F: FnOnce(&mut SessionState),
    {
        let mut after = None;
        self.current.send_if_modified(|state| {
            let mut next = state.clone();
            f(&mut next);
            let changed = next != *state;
            if changed {
                *state = next.clone();
                // No receivers is fine
                let _ = self.transitions.send(next.clone());
            }
            after = Some(next);
            changed
        });
        after.unwrap_or_else(|| self.get())
    }

    /// Replace the whole value
    pub fn replace(&self, next: SessionState) -> SessionState {
        self.update(|state| *state = next)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.current.subscribe()
    }

    pub fn transitions(&self) -> broadcast::Receiver<SessionState> {
        self.transitions.subscribe()
    }
}
