pub mod error;
pub use error::{BrokerError, ConnectError, ExecutorUnavailable, ReloadError};

pub mod node;
pub use node::{ConnectionIntent, NodeId, NodeRole};

pub mod options;
pub use options::{ClusterClientOptions, RefreshTrigger};

pub mod partitions;
pub use partitions::{Partitions, PartitionsView, SlotRange, TOTAL_SLOTS};

pub mod events;
pub use events::{ClusterEvent, EventBus};

pub mod executor;
pub use executor::{ExecutorGroup, ScheduledHandle};

pub mod timeout;
pub use timeout::Timeout;

pub mod broker;
pub use broker::{AsyncClose, ConnectionBroker, ConnectionFactory, ConnectionKey, ConnectionValue};

pub mod scheduler;
pub use scheduler::{ClusterEventListener, SchedulerHandle, TopologyRefreshScheduler};

pub mod frame;
pub use frame::Frame;

pub mod connection;
pub use connection::{connect, Connection};

/// Error returned by the frame codec.
///
/// A boxed `std::error::Error` is sufficient here: `frame::Error` (an
/// expected, recoverable condition on a partial read) converts into it via
/// `std::error::Error`. Everything else in this crate that can fail has its
/// own `thiserror` type instead of going through this box.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type used by the frame codec.
pub type Result<T> = std::result::Result<T, Error>;
