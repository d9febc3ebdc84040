//! Session table and the per-connection join/event/leave state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use flare_core::ConnectionId;
use flare_protocol::{EventKind, EventPayload, JoinPayload, Message, replies};
use flare_pubsub::Broadcaster;
use metrics::{counter, gauge, histogram};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::context::{InboxMessage, ViewContext};
use crate::errors::LiveError;
use crate::session::{Session, SessionEntry, Snapshot};
use crate::view::{AcceptAll, SessionVerifier, ViewRegistry};

/// Default per-connection inbox capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Session manager tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Every Nth render after the join is sent in full. 0 disables.
    pub full_render_every: u32,
    /// Broadcasts buffered per connection before dropping.
    pub inbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            full_render_every: 0,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// Owns the session table. One per server.
pub struct SessionManager {
    views: Arc<ViewRegistry>,
    broadcaster: Broadcaster,
    verifier: Arc<dyn SessionVerifier>,
    config: SessionConfig,
    sessions: RwLock<HashMap<ConnectionId, Arc<SessionEntry>>>,
    next_seq: AtomicU64,
}

impl SessionManager {
    /// Manager serving `views`, accepting every session token.
    pub fn new(views: Arc<ViewRegistry>, broadcaster: Broadcaster, config: SessionConfig) -> Self {
        Self {
            views,
            broadcaster,
            verifier: Arc::new(AcceptAll),
            config,
            sessions: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Check join tokens with `verifier`.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SessionVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Start tracking a new connection in the Connected state.
    pub fn connect(self: &Arc<Self>, id: ConnectionId) -> LiveConnection {
        let (inbox_tx, inbox_rx) = mpsc::channel(self.config.inbox_capacity.max(1));
        LiveConnection {
            id,
            manager: Arc::clone(self),
            state: ConnectionState::Connected,
            inbox_tx,
            inbox_rx,
        }
    }

    /// Registered views.
    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// Shared broadcaster.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Number of joined sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Connections joined to `topic`, sorted.
    pub fn sessions_on(&self, topic: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, entry)| entry.topic == topic)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Session count per joined topic.
    pub fn topics(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for entry in self.sessions.read().values() {
            *counts.entry(entry.topic.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Topic `id` is joined to.
    pub fn topic_of(&self, id: &ConnectionId) -> Option<String> {
        self.sessions.read().get(id).map(|e| e.topic.clone())
    }

    /// The client behind `id` may have missed a frame; its next patch is
    /// sent in full. Returns `false` when no session is joined.
    pub fn mark_desynced(&self, id: &ConnectionId) -> bool {
        match self.sessions.read().get(id) {
            Some(entry) => {
                entry.mark_desynced();
                true
            }
            None => false,
        }
    }

    fn session(&self, id: &ConnectionId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().get(id).cloned()
    }

    fn insert(&self, id: ConnectionId, entry: Arc<SessionEntry>) {
        let _ = self.sessions.write().insert(id, entry);
        gauge!("live_sessions_active").increment(1.0);
    }

    /// Drop `id`'s session and release its subscriptions.
    fn remove(&self, id: &ConnectionId) -> Option<Arc<SessionEntry>> {
        let entry = self.sessions.write().remove(id)?;
        entry.ctx.release_all();
        gauge!("live_sessions_active").decrement(1.0);
        Some(entry)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("views", &self.views)
            .field("config", &self.config)
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    Connected,
    /// One session on `topic`.
    Joined {
        /// Joined topic.
        topic: String,
        /// Ref of the join request, echoed on pushes.
        join_ref: Option<String>,
    },
    /// Terminal.
    Closed,
}

/// The session side of one transport connection.
///
/// Methods take `&mut self`, so frames and broadcasts for a connection are
/// handled one at a time.
pub struct LiveConnection {
    id: ConnectionId,
    manager: Arc<SessionManager>,
    state: ConnectionState,
    inbox_tx: mpsc::Sender<InboxMessage>,
    inbox_rx: mpsc::Receiver<InboxMessage>,
}

impl LiveConnection {
    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether a session is joined.
    pub fn is_joined(&self) -> bool {
        matches!(self.state, ConnectionState::Joined { .. })
    }

    /// Handle one client frame and return the frame to send back.
    ///
    /// Heartbeats are the transport's business and yield nothing here.
    #[instrument(
        skip_all,
        fields(connection_id = %self.id, topic = %message.topic, event = %message.event)
    )]
    pub async fn handle_message(&mut self, message: &Message) -> Option<Message> {
        let kind = message.kind();
        let result = match kind {
            EventKind::Join => self.join(message).await,
            EventKind::Event => self.event(message).await,
            EventKind::Leave => self.leave(message),
            EventKind::Heartbeat => {
                debug!("heartbeat reached session manager, ignoring");
                return None;
            }
            _ => Err(LiveError::UnsupportedEvent(message.event.clone())),
        };

        let error = match result {
            Ok(reply) => return Some(reply),
            Err(error) => error,
        };
        warn!(error = %error, "client frame rejected");

        let reason = error.to_string();
        let built = match kind {
            EventKind::Join | EventKind::Leave => replies::error_reply(message, &reason),
            _ => replies::error_frame(message, &reason),
        };
        match built {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(error = %e, "failed to encode error reply");
                None
            }
        }
    }

    /// Wait for the next broadcast delivered to this connection.
    pub async fn next_info(&mut self) -> Option<InboxMessage> {
        self.inbox_rx.recv().await
    }

    /// Run a delivered broadcast through the view and return the resulting
    /// diff, if the render changed anything.
    ///
    /// Deliveries subscribed by an earlier session are discarded. A failing
    /// `handle_info` is logged and produces nothing.
    #[instrument(skip_all, fields(connection_id = %self.id, topic = %item.message.topic))]
    pub async fn handle_info(&mut self, item: InboxMessage) -> Option<Message> {
        if !self.is_joined() {
            return None;
        }
        let entry = self.manager.session(&self.id)?;
        if entry.seq != item.session {
            debug!("dropping delivery for a previous session");
            return None;
        }

        let mut session = entry.state.lock().await;
        let Session { view, snapshot } = &mut *session;
        if let Err(error) = view.handle_info(&item.message, &entry.ctx).await {
            warn!(error = %error, "handle_info failed");
            return None;
        }

        let started = Instant::now();
        let node = view.render().into_node();
        let patch = snapshot.advance(node, entry.take_desynced());
        histogram!("live_diff_duration_seconds").record(started.elapsed().as_secs_f64());
        if patch.is_noop() {
            return None;
        }

        match replies::diff(&entry.topic, entry.join_ref.as_deref(), None, &patch) {
            Ok(frame) => Some(frame),
            Err(error) => {
                warn!(error = %error, "failed to encode diff");
                None
            }
        }
    }

    /// The transport failed to deliver a frame; send the next patch in full.
    pub fn mark_desynced(&self) {
        if self.manager.mark_desynced(&self.id) {
            debug!(connection_id = %self.id, "session marked for resync");
        }
    }

    /// Tear down any session and enter the terminal state.
    ///
    /// Returns the `phx_close` frame for the topic that was joined, for
    /// transports closing on their own initiative. Calling again returns
    /// `None`.
    pub fn close(&mut self) -> Option<Message> {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        let ConnectionState::Joined { topic, join_ref } = previous else {
            return None;
        };
        let _ = self.manager.remove(&self.id);
        info!(connection_id = %self.id, topic, "session closed");
        match replies::close(&topic, join_ref.as_deref()) {
            Ok(frame) => Some(frame),
            Err(error) => {
                warn!(error = %error, "failed to encode close frame");
                None
            }
        }
    }

    // ── Transitions ─────────────────────────────────────────────────────

    async fn join(&mut self, request: &Message) -> Result<Message, LiveError> {
        match &self.state {
            ConnectionState::Connected => {}
            ConnectionState::Joined { topic, .. } => {
                return Err(LiveError::AlreadyJoined(topic.clone()));
            }
            ConnectionState::Closed => return Err(LiveError::Closed),
        }

        let topic = request.topic.as_str();
        let manager = Arc::clone(&self.manager);
        let mut view = manager
            .views
            .build(topic)
            .ok_or_else(|| LiveError::UnknownTopic(topic.to_owned()))?;
        let payload: JoinPayload = request.payload_as()?;
        manager
            .verifier
            .verify(topic, &payload.session)
            .map_err(LiveError::Unauthorized)?;

        let seq = manager.next_seq.fetch_add(1, Ordering::Relaxed);
        let ctx = ViewContext::new(
            self.id.clone(),
            topic.to_owned(),
            seq,
            manager.broadcaster.clone(),
            self.inbox_tx.clone(),
        );

        let mounted = match view.mount(&payload.params, &ctx).await {
            Ok(()) => view.handle_params(&payload.params, &ctx).await,
            Err(error) => Err(error),
        };
        if let Err(error) = mounted {
            ctx.release_all();
            return Err(LiveError::Mount(error));
        }

        let node = view.render().into_node();
        let reply = match replies::join_reply(request, &node) {
            Ok(reply) => reply,
            Err(error) => {
                ctx.release_all();
                return Err(error.into());
            }
        };

        let session = Session {
            view,
            snapshot: Snapshot::new(node, manager.config.full_render_every),
        };
        let entry = SessionEntry::new(
            topic.to_owned(),
            request.join_ref.clone(),
            seq,
            ctx,
            session,
        );
        manager.insert(self.id.clone(), Arc::new(entry));
        self.state = ConnectionState::Joined {
            topic: topic.to_owned(),
            join_ref: request.join_ref.clone(),
        };
        info!(connection_id = %self.id, topic, "session joined");
        Ok(reply)
    }

    async fn event(&mut self, request: &Message) -> Result<Message, LiveError> {
        match &self.state {
            ConnectionState::Joined { topic, .. } if *topic == request.topic => {}
            ConnectionState::Joined { .. } => {
                return Err(LiveError::NotJoined(request.topic.clone()));
            }
            ConnectionState::Connected => return Err(LiveError::NoActiveSession),
            ConnectionState::Closed => return Err(LiveError::Closed),
        }
        let entry = self
            .manager
            .session(&self.id)
            .ok_or(LiveError::NoActiveSession)?;
        let payload: EventPayload = request.payload_as()?;

        let mut session = entry.state.lock().await;
        let Session { view, snapshot } = &mut *session;
        view.handle_event(&payload.event, &payload.value, &entry.ctx)
            .await
            .map_err(LiveError::Event)?;
        counter!("live_events_total").increment(1);

        let started = Instant::now();
        let node = view.render().into_node();
        let patch = snapshot.advance(node, entry.take_desynced());
        histogram!("live_diff_duration_seconds").record(started.elapsed().as_secs_f64());

        Ok(replies::diff(
            &entry.topic,
            entry.join_ref.as_deref(),
            request.msg_ref.as_deref(),
            &patch,
        )?)
    }

    fn leave(&mut self, request: &Message) -> Result<Message, LiveError> {
        match &self.state {
            ConnectionState::Joined { topic, .. } if *topic == request.topic => {}
            ConnectionState::Joined { .. } | ConnectionState::Connected => {
                return Err(LiveError::NotJoined(request.topic.clone()));
            }
            ConnectionState::Closed => return Err(LiveError::Closed),
        }
        let _ = self.manager.remove(&self.id);
        self.state = ConnectionState::Connected;
        info!(connection_id = %self.id, topic = %request.topic, "session left");
        Ok(replies::ok_reply(request)?)
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
