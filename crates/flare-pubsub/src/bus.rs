//! Upstream bus abstraction and the in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::errors::PubSubError;

/// Default number of dispatch workers for [`LocalPubSub`].
pub const DEFAULT_WORKERS: usize = 4;
/// Default dispatch queue capacity for [`LocalPubSub`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A message published to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Topic it was published on.
    pub topic: String,
    /// Application event name.
    pub event: String,
    /// Arbitrary payload.
    pub payload: Value,
}

/// Receives every message the bus delivers for one topic.
pub type TopicSink = Arc<dyn Fn(&Broadcast) + Send + Sync>;

/// Upstream transport for published messages.
///
/// A bus holds at most one sink per topic. Implementations must not call a
/// sink while holding a lock that `subscribe` or `unsubscribe` takes.
pub trait PubSubBus: Send + Sync {
    /// Route messages for `topic` to `sink`, replacing any previous sink.
    fn subscribe(&self, topic: &str, sink: TopicSink);

    /// Stop routing messages for `topic`.
    fn unsubscribe(&self, topic: &str);

    /// Hand a message to the bus. Must not block.
    fn publish(&self, message: Broadcast) -> Result<(), PubSubError>;
}

struct Job {
    sink: TopicSink,
    message: Broadcast,
}

/// In-process bus dispatching on a fixed pool of tokio tasks.
///
/// Publishing enqueues one job per message into a bounded queue; when the
/// queue is full the message is dropped. Workers exit once the bus is
/// dropped.
pub struct LocalPubSub {
    sinks: RwLock<HashMap<String, TopicSink>>,
    queue: mpsc::Sender<Job>,
}

impl LocalPubSub {
    /// Start a bus with `workers` dispatch tasks and a queue of
    /// `queue_capacity` pending messages. Both are clamped to at least 1.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..workers.max(1) {
            let _ = tokio::spawn(run_worker(worker, Arc::clone(&rx)));
        }
        Self {
            sinks: RwLock::new(HashMap::new()),
            queue,
        }
    }

    /// Start a bus with [`DEFAULT_WORKERS`] and [`DEFAULT_QUEUE_CAPACITY`].
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }

    /// Number of topics with a sink.
    pub fn topic_count(&self) -> usize {
        self.sinks.read().len()
    }
}

async fn run_worker(worker: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else { break };
        (job.sink)(&job.message);
    }
    debug!(worker, "pubsub worker stopped");
}

impl PubSubBus for LocalPubSub {
    fn subscribe(&self, topic: &str, sink: TopicSink) {
        let _ = self.sinks.write().insert(topic.to_owned(), sink);
        debug!(topic, "bus subscription opened");
    }

    fn unsubscribe(&self, topic: &str) {
        if self.sinks.write().remove(topic).is_some() {
            debug!(topic, "bus subscription closed");
        }
    }

    fn publish(&self, message: Broadcast) -> Result<(), PubSubError> {
        let Some(sink) = self.sinks.read().get(&message.topic).cloned() else {
            debug!(topic = %message.topic, "publish to topic with no subscribers");
            return Ok(());
        };
        let topic = message.topic.clone();
        match self.queue.try_send(Job { sink, message }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("pubsub_dispatch_drops_total").increment(1);
                warn!(topic, "pubsub dispatch queue full, dropping message");
                Err(PubSubError::QueueFull { topic })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PubSubError::Closed),
        }
    }
}
