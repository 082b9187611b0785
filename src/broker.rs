//! The connection broker.
//!
//! Maintains a keyed registry of in-flight and established connections,
//! deduplicating concurrent opens for the same key and managing orderly
//! shutdown. See `SPEC_FULL.md` §4.1 for the full algorithm; the
//! implementation below follows it step for step.
//!
//! The registry is a `DashMap`; its `entry()` API is the "atomic
//! get-or-create" the design calls for - the shard lock it holds for the
//! duration of the closure is what guarantees only one `connection_factory`
//! call happens per key, no matter how many callers race `get_connection`
//! at once. The completion driver for a freshly created entry is spawned
//! exactly once, from inside that same closure (see DESIGN.md, Open
//! Question 1).

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{BrokerError, ConnectError};

/// Capability bound for a connection owned by the broker: it must be
/// possible to tear it down asynchronously.
#[async_trait::async_trait]
pub trait AsyncClose: Send + Sync {
    async fn close(&self);
}

/// Blanket bound for keys the broker can be generic over. Equivalent to
/// repeating `K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static` at
/// every call site; kept as its own trait for readability.
pub trait ConnectionKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}
impl<K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static> ConnectionKey for K {}

/// Blanket bound for connections the broker can hold.
pub trait ConnectionValue: AsyncClose + Send + Sync + 'static {}
impl<T: AsyncClose + Send + Sync + 'static> ConnectionValue for T {}

/// Factory invoked at most once per key per establishment cycle. Receives a
/// `CancellationToken` so the broker can ask an in-flight connect to give
/// up early when the broker (or just that key) is being closed; a factory
/// that ignores it simply runs to completion, possibly wastefully, but
/// never incorrectly.
pub type ConnectionFactory<K, T> =
    Arc<dyn Fn(K, CancellationToken) -> BoxFuture<'static, Result<T, ConnectError>> + Send + Sync>;

type ConnectResult<T> = Result<Arc<T>, ConnectError>;
type SharedConnectFuture<T> = Shared<BoxFuture<'static, ConnectResult<T>>>;

const IN_PROGRESS: u8 = 0;
const COMPLETE: u8 = 1;
const FAILED: u8 = 2;
const CANCELED: u8 = 3;

struct PendingEntry<T> {
    future: SharedConnectFuture<T>,
    phase: AtomicU8,
    connection: ArcSwapOption<T>,
    cancel: CancellationToken,
}

impl<T> PendingEntry<T> {
    fn phase(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }
}

/// Deduplicated, keyed registry of connections.
///
/// Cloning a `ConnectionBroker` is shallow - every clone shares the same
/// registry, closed flag, and factory.
pub struct ConnectionBroker<K: ConnectionKey, T: ConnectionValue> {
    registry: Arc<DashMap<K, Arc<PendingEntry<T>>>>,
    closed: Arc<AtomicBool>,
    connection_factory: ConnectionFactory<K, T>,
}

impl<K: ConnectionKey, T: ConnectionValue> Clone for ConnectionBroker<K, T> {
    fn clone(&self) -> Self {
        ConnectionBroker {
            registry: self.registry.clone(),
            closed: self.closed.clone(),
            connection_factory: self.connection_factory.clone(),
        }
    }
}

impl<K: ConnectionKey, T: ConnectionValue> ConnectionBroker<K, T> {
    pub fn new<F, Fut>(connection_factory: F) -> Self
    where
        F: Fn(K, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ConnectError>> + Send + 'static,
    {
        let factory: ConnectionFactory<K, T> =
            Arc::new(move |key, cancel| connection_factory(key, cancel).boxed());
        ConnectionBroker {
            registry: Arc::new(DashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
            connection_factory: factory,
        }
    }

    /// Returns a completion handle backed by the same in-flight attempt for
    /// every concurrent caller with the same key.
    #[instrument(skip(self))]
    pub async fn get_connection(&self, key: K) -> Result<Arc<T>, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }

        let entry = self.get_or_create_entry(key.clone());

        // The broker may have transitioned to closed between the check
        // above and the entry being published; if so, this freshly created
        // entry was never seen by `close()`'s sweep and must be torn down
        // here instead.
        if self.closed.load(Ordering::Acquire) {
            self.terminate_entry(key, entry).await;
            return Err(BrokerError::Closed);
        }

        entry.future.clone().await.map_err(|err| match err {
            ConnectError::Cancelled => BrokerError::Cancelled,
            other => BrokerError::ConnectFailed(other),
        })
    }

    fn get_or_create_entry(&self, key: K) -> Arc<PendingEntry<T>> {
        let key_for_create = key.clone();
        self.registry
            .entry(key)
            .or_insert_with(|| self.create_entry(key_for_create))
            .value()
            .clone()
    }

    /// Builds a fresh `PendingEntry`, invoking the factory exactly once,
    /// and spawns the single completion driver for it. Only ever called
    /// from within the `DashMap::entry` closure in `get_or_create_entry`.
    fn create_entry(&self, key: K) -> Arc<PendingEntry<T>> {
        let cancel = CancellationToken::new();
        let raw = (self.connection_factory)(key.clone(), cancel.clone());
        let shared: SharedConnectFuture<T> = async move { raw.await.map(Arc::new) }.boxed().shared();

        let entry = Arc::new(PendingEntry {
            future: shared.clone(),
            phase: AtomicU8::new(IN_PROGRESS),
            connection: ArcSwapOption::empty(),
            cancel,
        });

        let registry = self.registry.clone();
        let driver_entry = entry.clone();
        tokio::spawn(async move {
            match shared.await {
                Ok(conn) => {
                    driver_entry.connection.store(Some(conn));
                    let _ = driver_entry.phase.compare_exchange(
                        IN_PROGRESS,
                        COMPLETE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
                Err(ConnectError::Cancelled) => {
                    let _ = driver_entry.phase.compare_exchange(
                        IN_PROGRESS,
                        CANCELED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
                Err(_) => {
                    let _ = driver_entry.phase.compare_exchange(
                        IN_PROGRESS,
                        FAILED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    registry.remove_if(&key, |_, existing| Arc::ptr_eq(existing, &driver_entry));
                    debug!(?key, "evicted failed connection attempt");
                }
            }
        });

        entry
    }

    /// Installs an already-established connection at `key`, overwriting
    /// any prior entry. The prior entry's connection is not closed here -
    /// that is the caller's responsibility.
    pub fn register(&self, key: K, connection: T) {
        let conn = Arc::new(connection);
        let shared: SharedConnectFuture<T> = futures::future::ready(Ok(conn.clone()))
            .boxed()
            .shared();
        let entry = Arc::new(PendingEntry {
            future: shared,
            phase: AtomicU8::new(COMPLETE),
            connection: ArcSwapOption::from(Some(conn)),
            cancel: CancellationToken::new(),
        });
        self.registry.insert(key, entry);
    }

    /// Number of entries currently in the `COMPLETE` phase. May under-count
    /// briefly while a completion driver is mid-transition.
    pub fn connection_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|e| e.value().phase() == COMPLETE)
            .count()
    }

    /// Marks the broker closed, then asynchronously tears down every
    /// current entry. Resolves once every individual teardown has
    /// completed.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let snapshot: Vec<(K, Arc<PendingEntry<T>>)> = self
            .registry
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(snapshot.len());
        for (key, entry) in snapshot {
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                this.terminate_entry(key, entry).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Removes the entry for `key` and asynchronously closes its
    /// connection (if established) or cancels it (if still pending).
    pub async fn close_key(&self, key: K) {
        if let Some(entry) = self.registry.get(&key).map(|e| e.value().clone()) {
            self.terminate_entry(key, entry).await;
        }
    }

    async fn terminate_entry(&self, key: K, entry: Arc<PendingEntry<T>>) {
        self.registry
            .remove_if(&key, |_, existing| Arc::ptr_eq(existing, &entry));
        entry.cancel.cancel();
        if let Ok(conn) = entry.future.clone().await {
            conn.close().await;
        }
    }

    /// Applies `action` to every connection, waiting for pending entries to
    /// complete before invoking it on them.
    pub async fn for_each<F, Fut>(&self, action: F)
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let entries: Vec<Arc<PendingEntry<T>>> =
            self.registry.iter().map(|e| e.value().clone()).collect();
        let action = Arc::new(action);

        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            let action = action.clone();
            handles.push(tokio::spawn(async move {
                if let Ok(conn) = entry.future.clone().await {
                    action(conn).await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Applies `action` to the connection for `key`, deferring until
    /// completion if it is still pending. No-op if `key` is not present.
    pub async fn for_each_key<F, Fut>(&self, key: &K, action: F)
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(entry) = self.registry.get(key).map(|e| e.value().clone()) {
            if let Ok(conn) = entry.future.clone().await {
                action(conn).await;
            }
        }
    }
}
