//! The shared executor group.
//!
//! The source treats this as a standard async executor exposing
//! schedule-at-fixed-rate and submit, with healthy/shutting-down/terminated
//! states. This module is the minimal concrete form of that collaborator:
//! a handle to the ambient Tokio runtime plus a tri-state health flag that
//! every submission checks first.
//!
//! Modeled after the `Db`/`Shared` shape used elsewhere in this crate for
//! "cheaply cloneable handle to state shared with a background task": an
//! `ExecutorGroup` is a small `Clone` struct wrapping an `Arc<AtomicU8>` for
//! health plus the ambient `tokio::runtime::Handle`.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ExecutorUnavailable;

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const TERMINATED: u8 = 2;

/// Handle to a background task scheduled at a fixed rate (the periodic
/// refresh tick). Cancellation is non-interrupting: `abort()` requests
/// cancellation but does not wait for the task to observe it.
#[derive(Debug)]
pub struct ScheduledHandle {
    join: JoinHandle<()>,
}

impl ScheduledHandle {
    /// Cancel the periodic task. Any `JoinError` produced by the aborted
    /// task is not this caller's concern - `suspend_periodic` swallows it
    /// at debug, matching the design's "errors swallowed at debug" note.
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// A standard async executor group with healthy / shutting-down /
/// terminated states, backed by the ambient Tokio runtime.
#[derive(Debug, Clone)]
pub struct ExecutorGroup {
    state: Arc<AtomicU8>,
}

impl ExecutorGroup {
    /// Construct a new, healthy executor group. Must be called from within
    /// a Tokio runtime context (`tokio::runtime::Handle::current()` is used
    /// to spawn work regardless of which task calls into the group later).
    pub fn new() -> Self {
        ExecutorGroup {
            state: Arc::new(AtomicU8::new(RUNNING)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Submit a one-shot task. Fails with `ExecutorUnavailable` if the group
    /// is shutting down or terminated, rather than silently queueing work
    /// that will never run.
    pub fn submit<F>(&self, fut: F) -> Result<JoinHandle<F::Output>, ExecutorUnavailable>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_healthy() {
            return Err(ExecutorUnavailable);
        }
        Ok(tokio::spawn(fut))
    }

    /// Schedule `task` to run at a fixed rate, starting immediately. The
    /// returned `ScheduledHandle` can cancel it; the loop also exits on its
    /// own once the group is shut down.
    pub fn spawn_at_fixed_rate<F, Fut>(
        &self,
        period: Duration,
        mut task: F,
    ) -> Result<ScheduledHandle, ExecutorUnavailable>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.is_healthy() {
            return Err(ExecutorUnavailable);
        }
        let state = self.state.clone();
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if state.load(Ordering::Acquire) != RUNNING {
                    debug!("executor group no longer running, stopping periodic task");
                    break;
                }
                task().await;
            }
        });
        Ok(ScheduledHandle { join })
    }

    /// Transition `Running -> ShuttingDown`. Submissions fail from this
    /// point on; in-flight work is left to finish on its own.
    pub fn begin_shutdown(&self) {
        self.state.store(SHUTTING_DOWN, Ordering::Release);
    }

    /// Transition to `Terminated`, the final state.
    pub fn terminate(&self) {
        self.state.store(TERMINATED, Ordering::Release);
    }
}

impl Default for ExecutorGroup {
    fn default() -> Self {
        ExecutorGroup::new()
    }
}
