//! Session manager error types.

use flare_protocol::{DecodeError, ProtocolError};
use flare_pubsub::PubSubError;
use thiserror::Error;

/// Failure reported by a view callback.
///
/// The message is sent to the client as the error reason, so it should be
/// safe to show.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The view rejected the call.
    #[error("{0}")]
    Rejected(String),
    /// Publishing from the view failed.
    #[error("broadcast failed: {0}")]
    Broadcast(#[from] PubSubError),
}

impl ViewError {
    /// Reject with a client-visible reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Why a client frame could not be handled.
///
/// The `Display` text is the wire `reason`.
#[derive(Debug, Error)]
pub enum LiveError {
    /// No view factory is registered for the topic.
    #[error("unknown topic")]
    UnknownTopic(String),
    /// A join arrived while a session is open.
    #[error("already joined {0}")]
    AlreadyJoined(String),
    /// A leave or event names a topic this connection has not joined.
    #[error("not joined to {0}")]
    NotJoined(String),
    /// The connection is joined but the session table has no entry for it.
    #[error("no active session")]
    NoActiveSession,
    /// The connection has been closed.
    #[error("connection closed")]
    Closed,
    /// The session token was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// `mount` or `handle_params` failed.
    #[error("{0}")]
    Mount(#[source] ViewError),
    /// `handle_event` failed.
    #[error("{0}")]
    Event(#[source] ViewError),
    /// The frame payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    Payload(#[from] DecodeError),
    /// The event is not one a client may send.
    #[error("unsupported event {0}")]
    UnsupportedEvent(String),
    /// The reply could not be serialized.
    #[error("failed to encode reply: {0}")]
    Encode(#[from] ProtocolError),
}
