//! What a view can reach from its callbacks.

use flare_core::{ConnectionId, SubscriberId};
use flare_pubsub::{Broadcast, Broadcaster, Subscription};
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ViewError;

/// A broadcast waiting on a connection's event loop.
#[derive(Debug, Clone)]
pub struct InboxMessage {
    /// Join sequence number of the session that subscribed.
    pub(crate) session: u64,
    /// The delivered message.
    pub message: Broadcast,
}

/// Per-session handle passed to every [`LiveView`](crate::LiveView) callback.
///
/// Subscriptions made here belong to the session and are released when it
/// leaves or its connection closes.
pub struct ViewContext {
    connection_id: ConnectionId,
    topic: String,
    session: u64,
    broadcaster: Broadcaster,
    inbox: mpsc::Sender<InboxMessage>,
    cancel: CancellationToken,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ViewContext {
    pub(crate) fn new(
        connection_id: ConnectionId,
        topic: String,
        session: u64,
        broadcaster: Broadcaster,
        inbox: mpsc::Sender<InboxMessage>,
    ) -> Self {
        Self {
            connection_id,
            topic,
            session,
            broadcaster,
            inbox,
            cancel: CancellationToken::new(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Connection the session runs on.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Topic the session joined.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive messages published on `topic` through
    /// [`LiveView::handle_info`](crate::LiveView::handle_info).
    ///
    /// Subscribing twice to the same topic keeps one delivery.
    pub fn subscribe(&self, topic: &str) {
        let inbox = self.inbox.clone();
        let session = self.session;
        let connection_id = self.connection_id.clone();
        let handler = move |message: &Broadcast| {
            let item = InboxMessage {
                session,
                message: message.clone(),
            };
            match inbox.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    counter!("live_inbox_drops_total").increment(1);
                    warn!(
                        connection_id = %connection_id,
                        topic = %message.topic,
                        "inbox full, dropping broadcast"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        };

        let subscription = self.broadcaster.subscribe_scoped(
            topic,
            SubscriberId::from(&self.connection_id),
            handler,
            &self.cancel,
        );
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|s| s.topic() != topic);
        subscriptions.push(subscription);
        debug!(connection_id = %self.connection_id, topic, "view subscribed");
    }

    /// Stop receiving messages for `topic`.
    pub fn unsubscribe(&self, topic: &str) {
        self.subscriptions.lock().retain(|s| {
            if s.topic() == topic {
                s.release();
                false
            } else {
                true
            }
        });
    }

    /// Topics this session currently receives.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .iter()
            .map(|s| s.topic().to_owned())
            .collect()
    }

    /// Publish to every subscriber of `topic`, this session included when it
    /// is subscribed.
    pub fn broadcast(&self, topic: &str, event: &str, payload: Value) -> Result<(), ViewError> {
        self.broadcaster.publish(topic, event, payload)?;
        Ok(())
    }

    /// Release every subscription. Safe to call more than once.
    pub(crate) fn release_all(&self) {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.release();
        }
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewContext")
            .field("connection_id", &self.connection_id)
            .field("topic", &self.topic)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
