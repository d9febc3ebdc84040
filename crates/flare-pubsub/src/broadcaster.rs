//! Topic registry and fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use flare_core::SubscriberId;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::bus::{Broadcast, PubSubBus, TopicSink};
use crate::errors::PubSubError;

/// The delivery capability of a subscription.
pub trait Subscriber: Send + Sync {
    /// Called once per message published on the subscribed topic.
    ///
    /// Runs on a bus worker. Must not block.
    fn deliver(&self, message: &Broadcast);
}

impl<F> Subscriber for F
where
    F: Fn(&Broadcast) + Send + Sync,
{
    fn deliver(&self, message: &Broadcast) {
        self(message);
    }
}

struct Entry {
    generation: u64,
    handler: Arc<dyn Subscriber>,
}

type TopicTable = HashMap<String, HashMap<SubscriberId, Entry>>;

struct Inner {
    bus: Arc<dyn PubSubBus>,
    topics: RwLock<TopicTable>,
    generation: AtomicU64,
}

impl Inner {
    /// Snapshot the handlers for `topic`, then call each outside the lock.
    fn dispatch(&self, message: &Broadcast) {
        let handlers: Vec<Arc<dyn Subscriber>> = match self.topics.read().get(&message.topic) {
            Some(subscribers) => subscribers.values().map(|e| Arc::clone(&e.handler)).collect(),
            None => return,
        };
        trace!(topic = %message.topic, handlers = handlers.len(), "dispatching broadcast");
        for handler in handlers {
            handler.deliver(message);
        }
    }

    /// Remove one subscriber. With `generation`, only that registration is
    /// removed. Returns whether anything was removed.
    fn remove(&self, topic: &str, id: &SubscriberId, generation: Option<u64>) -> bool {
        let mut topics = self.topics.write();
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let matches = subscribers
            .get(id)
            .is_some_and(|e| generation.is_none_or(|g| g == e.generation));
        if !matches {
            return false;
        }
        let _ = subscribers.remove(id);
        if subscribers.is_empty() {
            let _ = topics.remove(topic);
            self.bus.unsubscribe(topic);
            debug!(topic, "last subscriber left, topic closed");
        }
        true
    }
}

/// Per-topic subscriber sets on top of a [`PubSubBus`].
///
/// The first subscriber on a topic opens the bus subscription and the last
/// one to leave closes it. Cloning shares the same registry.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    /// Create a broadcaster over `bus`.
    pub fn new(bus: Arc<dyn PubSubBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                topics: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Register `handler` on `topic` under `id`.
    ///
    /// Subscribing an id that is already on the topic replaces its handler.
    /// Tokens from the replaced registration become inert.
    pub fn subscribe(
        &self,
        topic: &str,
        id: SubscriberId,
        handler: impl Subscriber + 'static,
    ) -> Subscription {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            generation,
            handler: Arc::new(handler),
        };
        {
            let mut topics = self.inner.topics.write();
            let first = !topics.contains_key(topic);
            let _ = topics
                .entry(topic.to_owned())
                .or_default()
                .insert(id.clone(), entry);
            if first {
                self.inner.bus.subscribe(topic, self.sink_for());
                debug!(topic, "first subscriber, topic opened");
            }
        }
        debug!(topic, subscriber = %id, "subscribed");
        Subscription {
            topic: topic.to_owned(),
            id,
            generation,
            registry: Arc::downgrade(&self.inner),
            released: Arc::new(AtomicBool::new(false)),
            done: CancellationToken::new(),
        }
    }

    /// Like [`subscribe`](Self::subscribe), and release the subscription
    /// when `cancel` fires.
    ///
    /// Must be called inside a tokio runtime.
    pub fn subscribe_scoped(
        &self,
        topic: &str,
        id: SubscriberId,
        handler: impl Subscriber + 'static,
        cancel: &CancellationToken,
    ) -> Subscription {
        let subscription = self.subscribe(topic, id, handler);
        let watcher = subscription.clone();
        let cancel = cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => watcher.release(),
                () = watcher.done.cancelled() => {}
            }
        });
        subscription
    }

    /// Remove `id` from `topic` regardless of which registration it is.
    pub fn unsubscribe(&self, topic: &str, id: &SubscriberId) {
        if self.inner.remove(topic, id, None) {
            debug!(topic, subscriber = %id, "unsubscribed");
        }
    }

    /// Publish through the bus.
    pub fn publish(&self, topic: &str, event: &str, payload: Value) -> Result<(), PubSubError> {
        self.inner.bus.publish(Broadcast {
            topic: topic.to_owned(),
            event: event.to_owned(),
            payload,
        })
    }

    /// Number of subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics.read().get(topic).map_or(0, HashMap::len)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.inner.topics.read().len()
    }

    fn sink_for(&self) -> TopicSink {
        let registry = Arc::downgrade(&self.inner);
        Arc::new(move |message: &Broadcast| {
            if let Some(inner) = registry.upgrade() {
                inner.dispatch(message);
            }
        })
    }
}

/// Token for one registration made by [`Broadcaster::subscribe`].
///
/// Releasing is idempotent across clones. Dropping a token does not
/// unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    id: SubscriberId,
    generation: u64,
    registry: Weak<Inner>,
    released: Arc<AtomicBool>,
    done: CancellationToken,
}

impl Subscription {
    /// Topic this subscription is on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscriber id it was registered under.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Unsubscribe. Only the first call has an effect, and only if this
    /// registration has not since been replaced.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.done.cancel();
        if let Some(inner) = self.registry.upgrade() {
            let _ = inner.remove(&self.topic, &self.id, Some(self.generation));
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalPubSub;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn broadcaster() -> (Broadcaster, Arc<LocalPubSub>) {
        let bus = Arc::new(LocalPubSub::with_defaults());
        (Broadcaster::new(Arc::clone(&bus) as Arc<dyn PubSubBus>), bus)
    }

    fn counting() -> (Arc<AtomicUsize>, impl Subscriber + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move |_: &Broadcast| {
            let _ = handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn first_subscriber_opens_bus_topic() {
        let (b, bus) = broadcaster();
        let (_, handler) = counting();
        let _sub = b.subscribe("room", SubscriberId::from("a"), handler);
        assert_eq!(bus.topic_count(), 1);
        assert_eq!(b.subscriber_count("room"), 1);
    }

    #[tokio::test]
    async fn last_unsubscribe_closes_bus_topic() {
        let (b, bus) = broadcaster();
        let (_, h1) = counting();
        let (_, h2) = counting();
        let _ = b.subscribe("room", SubscriberId::from("a"), h1);
        let _ = b.subscribe("room", SubscriberId::from("b"), h2);

        b.unsubscribe("room", &SubscriberId::from("a"));
        assert_eq!(bus.topic_count(), 1);
        b.unsubscribe("room", &SubscriberId::from("b"));
        assert_eq!(bus.topic_count(), 0);
        assert_eq!(b.topic_count(), 0);
    }

    #[tokio::test]
    async fn fan_out_delivers_exactly_once_each() {
        let (b, _bus) = broadcaster();
        let counts: Vec<_> = (0..5)
            .map(|i| {
                let (count, handler) = counting();
                let _ = b.subscribe("room", SubscriberId::from(format!("s{i}")), handler);
                count
            })
            .collect();

        b.publish("room", "msg", json!({})).unwrap();
        settle().await;

        for count in counts {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn unsubscribed_before_publish_never_receives() {
        let (b, _bus) = broadcaster();
        let (kept, h1) = counting();
        let (gone, h2) = counting();
        let _ = b.subscribe("room", SubscriberId::from("kept"), h1);
        let sub = b.subscribe("room", SubscriberId::from("gone"), h2);
        sub.release();

        b.publish("room", "msg", json!({})).unwrap();
        settle().await;

        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(gone.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resubscribe_replaces_handler() {
        let (b, _bus) = broadcaster();
        let (old, h1) = counting();
        let (new, h2) = counting();
        let _ = b.subscribe("room", SubscriberId::from("a"), h1);
        let _ = b.subscribe("room", SubscriberId::from("a"), h2);
        assert_eq!(b.subscriber_count("room"), 1);

        b.publish("room", "msg", json!({})).unwrap();
        settle().await;

        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_token_does_not_remove_newer_handler() {
        let (b, _bus) = broadcaster();
        let (_, h1) = counting();
        let (_, h2) = counting();
        let stale = b.subscribe("room", SubscriberId::from("a"), h1);
        let fresh = b.subscribe("room", SubscriberId::from("a"), h2);

        stale.release();
        assert_eq!(b.subscriber_count("room"), 1);
        fresh.release();
        assert_eq!(b.subscriber_count("room"), 0);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (b, _bus) = broadcaster();
        let (_, h1) = counting();
        let sub = b.subscribe("room", SubscriberId::from("a"), h1);
        let copy = sub.clone();
        sub.release();
        copy.release();
        sub.release();
        assert!(copy.is_released());
        assert_eq!(b.topic_count(), 0);
    }

    #[tokio::test]
    async fn scoped_subscription_released_on_cancel() {
        let (b, bus) = broadcaster();
        let (_, handler) = counting();
        let cancel = CancellationToken::new();
        let sub = b.subscribe_scoped("room", SubscriberId::from("a"), handler, &cancel);
        assert_eq!(b.subscriber_count("room"), 1);

        cancel.cancel();
        settle().await;

        assert!(sub.is_released());
        assert_eq!(b.subscriber_count("room"), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn handler_may_unsubscribe_itself() {
        let (b, _bus) = broadcaster();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = b.clone();
        let _ = b.subscribe("room", SubscriberId::from("self"), move |_: &Broadcast| {
            inner.unsubscribe("room", &SubscriberId::from("self"));
            let _ = tx.send(());
        });

        b.publish("room", "msg", json!({})).unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.subscriber_count("room"), 0);
    }

    #[tokio::test]
    async fn publish_reaches_only_its_topic() {
        let (b, _bus) = broadcaster();
        let (room, h1) = counting();
        let (other, h2) = counting();
        let _ = b.subscribe("room", SubscriberId::from("a"), h1);
        let _ = b.subscribe("other", SubscriberId::from("a"), h2);

        b.publish("room", "msg", json!({})).unwrap();
        settle().await;

        assert_eq!(room.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }
}
