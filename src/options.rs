//! Configuration surface for the topology refresh scheduler.
//!
//! A plain-data struct with a `Default` impl stands in for the source's
//! `FALLBACK_OPTIONS` singleton: constructing a default is cheap enough that
//! no lazy-static is needed, and `ClusterClientOptions::default()` can be
//! called wherever the caller does not supply cluster-aware options.

use std::collections::HashSet;
use std::time::Duration;

/// The wire-level or lifecycle signal that can adaptively trigger a
/// topology refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    MovedRedirect,
    AskRedirect,
    PersistentReconnects,
    UncoveredSlot,
    UnknownNode,
}

/// Cluster-aware client configuration consumed by the scheduler.
#[derive(Debug, Clone)]
pub struct ClusterClientOptions {
    /// Periodic refresh interval, used once `periodic_refresh_enabled` is
    /// true and `activate_periodic_if_needed` has run.
    pub refresh_period: Duration,
    /// Master enable for scheduling the periodic task at all.
    pub periodic_refresh_enabled: bool,
    /// Master enable checked on every periodic tick, independent of
    /// `periodic_refresh_enabled` which only gates *scheduling* the task.
    pub refresh_cluster_view: bool,
    /// Debounce window for adaptive triggers.
    pub adaptive_refresh_timeout: Duration,
    /// Which wire-level signals are wired to adaptive refresh.
    pub adaptive_refresh_triggers: HashSet<RefreshTrigger>,
    /// Reconnect-attempt threshold for `RefreshTrigger::PersistentReconnects`.
    pub refresh_triggers_reconnect_attempts: u32,
}

impl Default for ClusterClientOptions {
    fn default() -> Self {
        ClusterClientOptions {
            refresh_period: Duration::from_secs(30),
            periodic_refresh_enabled: false,
            refresh_cluster_view: true,
            adaptive_refresh_timeout: Duration::from_millis(500),
            adaptive_refresh_triggers: HashSet::from([
                RefreshTrigger::MovedRedirect,
                RefreshTrigger::PersistentReconnects,
            ]),
            refresh_triggers_reconnect_attempts: 3,
        }
    }
}
