//! The crate's one concrete `ConnectionKey` (`K`) implementation.
//!
//! `ConnectionBroker` is generic over `K`; a real cluster driver built on
//! top of this core would likely key connections by host/port/role/intent
//! exactly as `NodeId` does here. This type exists so the broker and
//! scheduler are runnable and testable without pulling in a full routing
//! layer.

use std::fmt;
use std::net::SocketAddr;

/// Whether a connection is used for normal command traffic or for the
/// admin-style connections topology discovery needs (e.g. `CLUSTER SLOTS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionIntent {
    /// General-purpose command connection.
    Default,
    /// Reserved for topology discovery / admin commands.
    ClusterTopology,
}

/// The role a node plays at the moment the key was created.
///
/// Cluster topology can reassign roles at any time; a `NodeId` is a
/// snapshot, not a live pointer - stale keys simply fail to connect or end
/// up superseded by a fresh topology reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Replica,
}

/// Opaque, value-equatable identifier of a target endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub addr: SocketAddr,
    pub role: NodeRole,
    pub intent: ConnectionIntent,
}

impl NodeId {
    pub fn new(addr: SocketAddr, role: NodeRole, intent: ConnectionIntent) -> Self {
        NodeId { addr, role, intent }
    }

    /// Convenience constructor for the common case: a default-intent master
    /// connection, which is what most of the broker's tests exercise.
    pub fn master(addr: SocketAddr) -> Self {
        NodeId::new(addr, NodeRole::Master, ConnectionIntent::Default)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}/{:?}", self.addr, self.role, self.intent)
    }
}
