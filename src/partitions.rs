//! Partitions snapshot.
//!
//! The client's in-memory map of cluster slots to nodes. The core treats
//! this as an immutable-by-swap value: readers dereference an `ArcSwap`
//! rather than taking a lock, matching the concurrency model the rest of
//! the crate uses for shared state.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::node::NodeId;

pub const TOTAL_SLOTS: u16 = 16384;

/// A contiguous range of hash slots owned by a single node.
#[derive(Debug, Clone)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub node: NodeId,
}

/// An immutable view of cluster topology.
///
/// The core never interprets slot contents beyond counting coverage for its
/// own tests; assigning slots to nodes is the reload callback's job, not
/// this crate's.
#[derive(Debug, Clone, Default)]
pub struct Partitions {
    pub slot_ranges: Vec<SlotRange>,
    /// Monotonically increasing generation, bumped on every reload so
    /// observers can tell two snapshots apart even if they happen to cover
    /// the same ranges.
    pub epoch: u64,
}

impl Partitions {
    pub fn empty() -> Self {
        Partitions::default()
    }

    /// Number of slots covered by some range. Used by tests to express the
    /// "uncovered slot" trigger condition the scheduler reacts to.
    pub fn covered_slots(&self) -> usize {
        self.slot_ranges
            .iter()
            .map(|r| r.end.saturating_sub(r.start) as usize + 1)
            .sum()
    }
}

/// Atomically swappable holder for the current `Partitions` snapshot.
///
/// Cloning a `PartitionsView` is shallow (an `Arc` clone), matching the
/// rest of the crate's "handle to shared state" shape.
#[derive(Debug, Clone)]
pub struct PartitionsView {
    inner: Arc<ArcSwap<Partitions>>,
}

impl PartitionsView {
    pub fn new(initial: Partitions) -> Self {
        PartitionsView {
            inner: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// Cheap accessor to the current snapshot.
    pub fn load(&self) -> Arc<Partitions> {
        self.inner.load_full()
    }

    /// Publish a freshly reloaded snapshot.
    pub fn store(&self, partitions: Partitions) {
        self.inner.store(Arc::new(partitions));
    }
}

impl Default for PartitionsView {
    fn default() -> Self {
        PartitionsView::new(Partitions::empty())
    }
}
