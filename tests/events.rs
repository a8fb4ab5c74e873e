//! Event bus delivery tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dualserve::events::{EventBus, RELOAD};

#[tokio::test]
async fn test_reload_reaches_every_handler_once() {
    let bus = EventBus::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let count = |counter: &Arc<AtomicUsize>| {
        let counter = Arc::clone(counter);
        move |event: dualserve::events::Event| {
            let counter = Arc::clone(&counter);
            async move {
                assert!(event.payload.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    };
    let _a = bus.handle(RELOAD, count(&first));
    let _b = bus.handle(RELOAD, count(&second));

    assert!(bus.emit(RELOAD, Vec::new()).wait_timeout(Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_emit_without_subscribers_resolves_immediately() {
    let bus = EventBus::new();
    let delivery = bus.emit("nobody-listens", Vec::new());
    assert!(delivery.is_ready());
    delivery.wait().await;
}

#[tokio::test]
async fn test_unsubscribe_during_emit() {
    // Queue depth 1 so the second emit blocks until the subscriber goes away.
    let bus = EventBus::with_capacity(1);
    let subscription = bus.subscribe("jobs");
    let id = subscription.id();

    bus.emit("jobs", Vec::new()).wait().await;
    let pending = bus.emit("jobs", Vec::new());
    assert!(!pending.is_ready());

    bus.unsubscribe("jobs", &[id]);
    assert!(pending.wait_timeout(Duration::from_secs(1)).await);
    assert_eq!(bus.subscriber_count("jobs"), 0);
    drop(subscription);
}

#[tokio::test]
async fn test_remove_topic_closes_receivers() {
    let bus = EventBus::new();
    let mut subscription = bus.subscribe(RELOAD);

    bus.remove_topic(RELOAD);

    assert!(subscription.is_closed());
    assert!(subscription.recv().await.is_none());
}
