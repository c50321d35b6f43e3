use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::task::{TaskTracker, task_tracker::TaskTrackerToken};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No push in flight.
    Idle,
    /// At least one push in flight.
    Active,
    /// Stop requested, waiting for in-flight pushes.
    Draining,
    Stopped,
}

/// Counts in-flight pushes so that shutdown can wait for them.
#[derive(Debug, Default)]
pub struct Lifecycle {
    in_flight: TaskTracker,
    stopping: AtomicBool,
}

/// Held by a push for its whole duration.
#[derive(Debug)]
pub struct InFlight {
    _token: TaskTrackerToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a push. Returns `None` once a stop has been requested.
    pub fn enter(&self) -> Option<InFlight> {
        // Take the token before checking the flag: a concurrent `stop` either
        // sees this push in flight or this push sees the flag.
        let token = self.in_flight.token();
        if self.stopping.load(Ordering::SeqCst) {
            return None;
        }
        Some(InFlight { _token: token })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn state(&self) -> LifecycleState {
        match (self.stopping.load(Ordering::SeqCst), self.in_flight.is_empty()) {
            (false, true) => LifecycleState::Idle,
            (false, false) => LifecycleState::Active,
            (true, false) => LifecycleState::Draining,
            (true, true) => LifecycleState::Stopped,
        }
    }

    /// Nothing to set up: connections are opened lazily.
    pub fn start(&self) {
        debug!("HEC exporter started");
    }

    /// Refuse new pushes and wait until every in-flight push has finished.
    /// In-flight work is not cancelled.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.in_flight.close();
        if !self.in_flight.is_empty() {
            debug!(in_flight = self.in_flight.len(), "waiting for in-flight pushes");
        }
        self.in_flight.wait().await;
        debug!("HEC exporter stopped");
    }
}
