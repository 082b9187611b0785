//! Events published on the shared event bus.
//!
//! The source models these as a small class hierarchy
//! (`AdaptiveRefreshTriggeredEvent` and two subtypes). A closed set of
//! variants on one `Clone` enum is the idiomatic Rust shape here, and is
//! required anyway: the payload travels over a `tokio::sync::broadcast`
//! channel, whose message type must be `Clone`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::options::RefreshTrigger;
use crate::partitions::Partitions;

/// A cluster-lifecycle event observable by anything subscribed to the
/// event bus.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// An adaptive refresh was scheduled in response to a generic trigger
    /// (MOVED/ASK redirect, unknown node).
    AdaptiveRefreshTriggered {
        trigger: RefreshTrigger,
        partitions: Arc<Partitions>,
    },
    /// An adaptive refresh was scheduled because of repeated reconnect
    /// attempts to the same node.
    PersistentReconnectsAdaptiveRefreshTriggered {
        attempt: u32,
        partitions: Arc<Partitions>,
    },
    /// An adaptive refresh was scheduled because a slot had no owner in the
    /// current partitions snapshot.
    UncoveredSlotAdaptiveRefreshTriggered {
        slot: u16,
        partitions: Arc<Partitions>,
    },
}

impl ClusterEvent {
    pub fn trigger_kind(&self) -> RefreshTrigger {
        match self {
            ClusterEvent::AdaptiveRefreshTriggered { trigger, .. } => *trigger,
            ClusterEvent::PersistentReconnectsAdaptiveRefreshTriggered { .. } => {
                RefreshTrigger::PersistentReconnects
            }
            ClusterEvent::UncoveredSlotAdaptiveRefreshTriggered { .. } => {
                RefreshTrigger::UncoveredSlot
            }
        }
    }
}

/// Fire-and-forget event bus.
///
/// Backed by a `broadcast` channel: `publish` never blocks and never fails
/// observably - if there are no subscribers, the send error is swallowed,
/// exactly as a fire-and-forget bus should behave.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClusterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// Publish an event. Fire-and-forget: if nobody is listening, this is a
    /// no-op.
    pub fn publish(&self, event: ClusterEvent) {
        if self.sender.send(event).is_err() {
            debug!("published cluster event with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(1024)
    }
}
