use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis_cluster_core::scheduler::{reload_topology_fn, ClusterEventListener, TopologyRefreshScheduler};
use redis_cluster_core::{
    ClusterClientOptions, ClusterEvent, EventBus, ExecutorGroup, PartitionsView, RefreshTrigger,
    ReloadError,
};

fn options(periodic: bool) -> ClusterClientOptions {
    ClusterClientOptions {
        refresh_period: Duration::from_millis(10),
        periodic_refresh_enabled: periodic,
        refresh_cluster_view: true,
        adaptive_refresh_timeout: Duration::from_millis(50),
        adaptive_refresh_triggers: HashSet::from([
            RefreshTrigger::MovedRedirect,
            RefreshTrigger::PersistentReconnects,
        ]),
        refresh_triggers_reconnect_attempts: 2,
    }
}

fn counting_reload(count: Arc<AtomicUsize>) -> redis_cluster_core::scheduler::ReloadTopology {
    reload_topology_fn(move || {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ReloadError>(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_reloads_on_each_tick() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(true)),
        counting_reload(count.clone()),
    );

    scheduler.activate_periodic_if_needed();
    tokio::time::advance(Duration::from_millis(35)).await;
    tokio::task::yield_now().await;

    assert!(count.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn activate_periodic_if_needed_is_idempotent() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(true)),
        counting_reload(count.clone()),
    );

    scheduler.activate_periodic_if_needed();
    scheduler.activate_periodic_if_needed();
    scheduler.activate_periodic_if_needed();

    tokio::time::advance(Duration::from_millis(35)).await;
    tokio::task::yield_now().await;

    // A second periodic task would double every tick's count; a handful of
    // ticks at a 10ms period over 35ms should land well under 2x.
    assert!(count.load(Ordering::SeqCst) <= 4);
}

#[tokio::test(start_paused = true)]
async fn suspend_periodic_stops_further_ticks() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(true)),
        counting_reload(count.clone()),
    );

    scheduler.activate_periodic_if_needed();
    tokio::time::advance(Duration::from_millis(25)).await;
    tokio::task::yield_now().await;
    let before = count.load(Ordering::SeqCst);
    assert!(before >= 2);

    scheduler.suspend_periodic();
    tokio::time::advance(Duration::from_millis(50)).await;
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), before);
}

#[tokio::test(start_paused = true)]
async fn adaptive_trigger_debounces_within_window() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(false)),
        counting_reload(count.clone()),
    );

    scheduler.on_moved_redirection();
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    scheduler.on_moved_redirection();
    tokio::task::yield_now().await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        1,
        "a second trigger within the debounce window must not schedule another reload"
    );

    tokio::time::advance(Duration::from_millis(60)).await;
    scheduler.on_moved_redirection();
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn adaptive_trigger_not_in_options_set_is_ignored() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(false)),
        counting_reload(count.clone()),
    );

    // `UncoveredSlot` is not in this options value's trigger set.
    scheduler.on_uncovered_slot(42);
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_attempts_below_threshold_do_not_trigger() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(false)),
        counting_reload(count.clone()),
    );

    scheduler.on_reconnect_attempt(1);
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    scheduler.on_reconnect_attempt(2);
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn adaptive_trigger_publishes_a_cluster_event() {
    let count = Arc::new(AtomicUsize::new(0));
    let event_bus = EventBus::default();
    let mut events = event_bus.subscribe();

    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        event_bus,
        PartitionsView::default(),
        Arc::new(|| options(false)),
        counting_reload(count.clone()),
    );

    scheduler.on_moved_redirection();
    tokio::task::yield_now().await;

    let event = events.try_recv().expect("adaptive trigger should publish an event");
    assert!(matches!(
        event,
        ClusterEvent::AdaptiveRefreshTriggered {
            trigger: RefreshTrigger::MovedRedirect,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn is_refresh_in_progress_reflects_single_flight_state() {
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
    let gate_rx = Arc::new(tokio::sync::Mutex::new(Some(gate_rx)));

    let scheduler = TopologyRefreshScheduler::new(
        ExecutorGroup::new(),
        EventBus::default(),
        PartitionsView::default(),
        Arc::new(|| options(false)),
        reload_topology_fn(move || {
            let gate_rx = gate_rx.clone();
            async move {
                if let Some(rx) = gate_rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<(), ReloadError>(())
            }
        }),
    );

    assert!(!scheduler.is_refresh_in_progress());
    scheduler.on_moved_redirection();
    tokio::task::yield_now().await;
    assert!(scheduler.is_refresh_in_progress());

    let _ = gate_tx.send(());
    tokio::task::yield_now().await;
    assert!(!scheduler.is_refresh_in_progress());
}
