//! Debounce timeout.
//!
//! A small value type: a monotonic expiration stamp used by the scheduler
//! to rate-limit adaptive refresh triggers. Never shared mutably - the
//! scheduler swaps the whole value behind an `ArcSwapOption` instead.
//!
//! Built on `tokio::time::Instant` rather than `std::time::Instant` so that
//! debounce windows respect a paused/advanced test clock (`tokio::time::pause`)
//! the same way the scheduler's periodic ticks do - a single consistent
//! clock source, as the design requires.

use std::time::Duration;
use tokio::time::Instant;

/// A monotonic point in time at which a debounce window closes.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    expires_at: Instant,
}

impl Timeout {
    /// Construct a `Timeout` that expires `duration` from now.
    pub fn from_now(duration: Duration) -> Self {
        Timeout {
            expires_at: Instant::now() + duration,
        }
    }

    /// Whether this timeout has already expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Duration remaining until expiration, clamped at zero.
    pub fn remaining_ms(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_millis() as u64
    }
}
