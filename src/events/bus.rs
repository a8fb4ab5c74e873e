//! Topic-keyed publish/subscribe bus.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::delivery::Delivery;
use crate::observability::metrics;
use crate::rpc::recovery;

/// Default queue depth per subscriber.
pub const DEFAULT_CAPACITY: usize = 16;

/// An event published on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub payload: Vec<Value>,
}

/// Identifies one subscriber within the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Sender side kept by the bus.
struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<Event>,
    closed: CancellationToken,
}

#[derive(Default)]
struct Topic {
    subscribers: RwLock<Vec<Subscriber>>,
}

struct Inner {
    topics: DashMap<String, Arc<Topic>>,
    capacity: usize,
    next_id: AtomicU64,
}

/// Receive end of a subscription.
///
/// Once closed (via [`EventBus::unsubscribe`] or [`EventBus::remove_topic`])
/// `recv` returns whatever is already queued, then `None`.
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    rx: mpsc::Receiver<Event>,
    closed: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Receive the next event, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Ok(event) = self.rx.try_recv() {
            return Some(event);
        }
        tokio::select! {
            biased;
            event = self.rx.recv() => event,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }
}

/// Detach handle returned by [`EventBus::handle`].
#[must_use = "dropping the guard leaves the handler attached; call detach to stop it"]
pub struct HandlerGuard {
    bus: EventBus,
    topic: String,
    id: SubscriptionId,
}

impl HandlerGuard {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop the handler loop.
    pub fn detach(self) {
        self.bus.unsubscribe(&self.topic, &[self.id]);
    }
}

/// Publish/subscribe bus. Cheap to clone; clones share the topic map.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose subscriber queues hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn topic(&self, topic: &str) -> Option<Arc<Topic>> {
        self.inner.topics.get(topic).map(|t| Arc::clone(t.value()))
    }

    /// Register a new receiver on `topic`, creating the topic if needed.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let entry = Arc::clone(
            self.inner
                .topics
                .entry(topic.to_string())
                .or_default()
                .value(),
        );

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let closed = CancellationToken::new();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        entry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                tx,
                closed: closed.clone(),
            });

        tracing::trace!(topic, subscription = %id, "Subscribed");
        Subscription {
            id,
            topic: topic.to_string(),
            rx,
            closed,
        }
    }

    /// Close and remove the given receivers.
    pub fn unsubscribe(&self, topic: &str, ids: &[SubscriptionId]) {
        let Some(entry) = self.topic(topic) else {
            return;
        };
        let mut subscribers = entry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| {
            if ids.contains(&s.id) {
                s.closed.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Close every receiver currently subscribed to `topic`.
    pub fn remove_topic(&self, topic: &str) {
        let Some(entry) = self.topic(topic) else {
            return;
        };
        let drained: Vec<Subscriber> = entry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscriber in &drained {
            subscriber.closed.cancel();
        }
        tracing::debug!(topic, closed = drained.len(), "Topic removed");
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topic(topic)
            .map(|t| {
                t.subscribers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len()
            })
            .unwrap_or(0)
    }

    /// Deliver an event to every current subscriber of `topic`.
    ///
    /// Each hand-off runs on its own task. The returned [`Delivery`]
    /// resolves once every hand-off has either queued the event or found
    /// the receiver closed. Never fails.
    pub fn emit(&self, topic: &str, payload: Vec<Value>) -> Delivery {
        let targets: Vec<(mpsc::Sender<Event>, CancellationToken)> = match self.topic(topic) {
            Some(entry) => entry
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|s| (s.tx.clone(), s.closed.clone()))
                .collect(),
            None => Vec::new(),
        };

        metrics::record_event_emitted(topic, targets.len());
        if targets.is_empty() {
            return Delivery::ready();
        }

        let event = Event {
            topic: topic.to_string(),
            payload,
        };
        let handles = targets
            .into_iter()
            .map(|(tx, closed)| {
                let event = event.clone();
                tokio::spawn(async move {
                    if closed.is_cancelled() {
                        return;
                    }
                    tokio::select! {
                        // A send error means the receiver was dropped: same as closed.
                        _ = tx.send(event) => {}
                        _ = closed.cancelled() => {}
                    }
                })
            })
            .collect();

        Delivery::spawn(handles)
    }

    /// Run `callback` for every event on `topic` on a dedicated task.
    pub fn handle<F, Fut>(&self, topic: &str, callback: F) -> HandlerGuard
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe(topic);
        let id = subscription.id();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let Err(report) = recovery::catch(|| callback(event)).await {
                    tracing::error!(
                        topic = subscription.topic(),
                        subscription = %id,
                        panic = %report.message,
                        "Event handler panicked"
                    );
                }
            }
            tracing::trace!(topic = subscription.topic(), subscription = %id, "Handler detached");
        });

        HandlerGuard {
            bus: self.clone(),
            topic: topic.to_string(),
            id,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn subscriber_receives_payload() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("greet");

        bus.emit("greet", vec![json!("hello"), json!(1)]).wait().await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.topic, "greet");
        assert_eq!(event.payload, vec![json!("hello"), json!(1)]);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_ready() {
        let bus = EventBus::new();
        let delivery = bus.emit("nobody", vec![]);
        assert!(delivery.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn unsubscribe_closes_receiver() {
        let bus = EventBus::new();
        let mut keep = bus.subscribe("t");
        let mut gone = bus.subscribe("t");
        bus.unsubscribe("t", &[gone.id()]);

        assert!(gone.is_closed());
        assert_eq!(gone.recv().await, None);
        assert_eq!(bus.subscriber_count("t"), 1);

        bus.emit("t", vec![]).wait().await;
        assert!(keep.recv().await.is_some());
    }

    #[tokio::test]
    async fn remove_topic_closes_everyone() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("t");
        let mut b = bus.subscribe("t");
        bus.remove_topic("t");

        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, None);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn queued_events_survive_close() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("t");
        bus.emit("t", vec![json!(1)]).wait().await;
        bus.unsubscribe("t", &[sub.id()]);

        assert_eq!(sub.recv().await.map(|e| e.payload), Some(vec![json!(1)]));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn handler_survives_a_panicking_event() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let _guard = bus.handle("t", move |_event| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("first event is poison");
                }
            }
        });

        for _ in 0..3 {
            bus.emit("t", vec![]).wait().await;
        }
        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(bus.subscriber_count("t"), 1);
    }

    #[tokio::test]
    async fn full_queue_blocks_only_its_own_delivery() {
        let bus = EventBus::with_capacity(1);
        let _stalled = bus.subscribe("t");
        let mut live = bus.subscribe("t");

        bus.emit("t", vec![]).wait().await;
        // The stalled queue is now full; the next delivery to it cannot finish.
        let second = bus.emit("t", vec![]);
        assert!(live.recv().await.is_some());
        assert!(live.recv().await.is_some());
        assert!(!second.wait_timeout(Duration::from_millis(50)).await);
    }
}
