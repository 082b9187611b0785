use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis_cluster_core::{AsyncClose, BrokerError, ConnectError, ConnectionBroker};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct FakeConn {
    id: usize,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl AsyncClose for FakeConn {
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

#[tokio::test]
async fn concurrent_callers_share_one_factory_invocation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let broker: ConnectionBroker<SocketAddr, FakeConn> =
        ConnectionBroker::new(move |key: SocketAddr, _cancel: CancellationToken| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(FakeConn {
                    id: key.port() as usize,
                    closed: Arc::new(AtomicBool::new(false)),
                })
            }
        });

    let key = addr(7000);
    let (a, b, c) = tokio::join!(
        broker.get_connection(key),
        broker.get_connection(key),
        broker.get_connection(key),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.connection_count(), 1);
}

#[tokio::test]
async fn failed_attempt_is_evicted_and_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let broker: ConnectionBroker<SocketAddr, FakeConn> =
        ConnectionBroker::new(move |_key: SocketAddr, _cancel: CancellationToken| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConnectError::from(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )))
            }
        });

    let key = addr(7001);
    let first = broker.get_connection(key).await;
    assert!(matches!(first, Err(BrokerError::ConnectFailed(_))));
    assert_eq!(broker.connection_count(), 0);

    let second = broker.get_connection(key).await;
    assert!(matches!(second, Err(BrokerError::ConnectFailed(_))));
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "a failed attempt must not be cached - the next caller retries the factory"
    );
}

#[tokio::test]
async fn close_tears_down_established_connections_and_rejects_new_ones() {
    let closed = Arc::new(AtomicBool::new(false));
    let closed_clone = closed.clone();
    let broker: ConnectionBroker<SocketAddr, FakeConn> =
        ConnectionBroker::new(move |_key: SocketAddr, _cancel: CancellationToken| {
            let closed = closed_clone.clone();
            async move {
                Ok(FakeConn {
                    id: 1,
                    closed,
                })
            }
        });

    let key = addr(7002);
    let conn = broker.get_connection(key).await.unwrap();
    drop(conn);

    broker.close().await;
    assert!(closed.load(Ordering::SeqCst));

    let err = broker.get_connection(key).await.unwrap_err();
    assert!(matches!(err, BrokerError::Closed));
}

#[tokio::test]
async fn close_key_cancels_an_in_flight_attempt() {
    let broker: ConnectionBroker<SocketAddr, FakeConn> =
        ConnectionBroker::new(|_key: SocketAddr, cancel: CancellationToken| async move {
            cancel.cancelled().await;
            Err(ConnectError::Cancelled)
        });

    let key = addr(7003);
    let waiter = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.get_connection(key).await })
    };
    tokio::task::yield_now().await;

    broker.close_key(key).await;
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(BrokerError::Cancelled)));
}

#[tokio::test]
async fn close_while_connecting_cancels_the_pending_entry() {
    let broker: ConnectionBroker<SocketAddr, FakeConn> =
        ConnectionBroker::new(|_key: SocketAddr, cancel: CancellationToken| async move {
            cancel.cancelled().await;
            Err(ConnectError::Cancelled)
        });

    let key = addr(7005);
    let waiter = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.get_connection(key).await })
    };
    tokio::task::yield_now().await;

    broker.close().await;
    let result = waiter.await.unwrap();
    assert!(matches!(
        result,
        Err(BrokerError::Cancelled) | Err(BrokerError::Closed)
    ));

    let err = broker.get_connection(key).await.unwrap_err();
    assert!(matches!(err, BrokerError::Closed));
}

#[tokio::test]
async fn register_installs_an_already_established_connection() {
    let broker: ConnectionBroker<SocketAddr, FakeConn> =
        ConnectionBroker::new(|_key: SocketAddr, _cancel: CancellationToken| async {
            panic!("factory must not be called for a registered connection")
        });

    let key = addr(7004);
    broker.register(
        key,
        FakeConn {
            id: 9,
            closed: Arc::new(AtomicBool::new(false)),
        },
    );

    assert_eq!(broker.connection_count(), 1);
    let conn = broker.get_connection(key).await.unwrap();
    assert_eq!(conn.id, 9);
}
