//! Error types for the cluster coordination core.
//!
//! Every error kind named in the design is modeled as its own `thiserror`
//! enum rather than a single catch-all, so callers can match on exactly the
//! outcomes the broker and scheduler promise (see `BrokerError`) without
//! reaching into a generic `Box<dyn Error>`.

use std::sync::Arc;

/// Error returned by a `connection_factory` when establishing a connection
/// to a node fails.
///
/// `Arc`-wrapped sources are used throughout this module because a
/// `futures::future::Shared` future requires its output to be `Clone`, and
/// every concurrent caller of `get_connection` receives a clone of the same
/// terminal `Result`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    #[error("connection establishment was cancelled")]
    Cancelled,
    #[error("failed to connect: {0}")]
    Io(Arc<std::io::Error>),
    #[error("failed to connect: {0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        ConnectError::Io(Arc::new(err))
    }
}

/// Error returned by `ConnectionBroker::get_connection`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// `get_connection` was called after `close()` had already run.
    #[error("connection broker is closed")]
    Closed,
    /// The injected `connection_factory` failed.
    #[error("connection establishment failed: {0}")]
    ConnectFailed(#[from] ConnectError),
    /// Establishment was cancelled by a racing `close()`/`close_key()`.
    #[error("connection establishment was cancelled")]
    Cancelled,
}

/// Error returned by the injected `reload_topology` callback.
///
/// Never propagated to a caller of the scheduler's public API - only
/// logged at `warn` by the refresh task's completion driver.
#[derive(Debug, thiserror::Error)]
#[error("topology reload failed: {0}")]
pub struct ReloadError(pub Box<dyn std::error::Error + Send + Sync>);

impl From<Box<dyn std::error::Error + Send + Sync>> for ReloadError {
    fn from(cause: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ReloadError(cause)
    }
}

/// The executor group is not in a state that accepts new work.
///
/// Never propagated either - submissions are suppressed with a debug log.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("executor group is shutting down or terminated")]
pub struct ExecutorUnavailable;
