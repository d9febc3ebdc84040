//! The protocol frame and its event tokens.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::errors::{DecodeError, ProtocolError};

/// Event tokens shared with the browser client. Exact and case-sensitive.
pub mod events {
    /// Client asks to join a topic.
    pub const JOIN: &str = "phx_join";
    /// Server answers a request, successfully or not.
    pub const REPLY: &str = "phx_reply";
    /// Client-side UI event.
    pub const EVENT: &str = "event";
    /// Server pushes a patch.
    pub const DIFF: &str = "diff";
    /// Keepalive from the client.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Server closes a joined topic.
    pub const CLOSE: &str = "phx_close";
    /// Server reports a failure outside a join reply.
    pub const ERROR: &str = "phx_error";
    /// Client leaves a topic.
    pub const LEAVE: &str = "phx_leave";

    /// Topic used for heartbeat frames.
    pub const PHOENIX_TOPIC: &str = "phoenix";
}

/// Parsed form of [`Message::event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `phx_join`
    Join,
    /// `phx_reply`
    Reply,
    /// `event`
    Event,
    /// `diff`
    Diff,
    /// `heartbeat`
    Heartbeat,
    /// `phx_close`
    Close,
    /// `phx_error`
    Error,
    /// `phx_leave`
    Leave,
    /// Anything else.
    Unknown,
}

impl EventKind {
    /// Map a wire token to its kind.
    pub fn parse(token: &str) -> Self {
        match token {
            events::JOIN => Self::Join,
            events::REPLY => Self::Reply,
            events::EVENT => Self::Event,
            events::DIFF => Self::Diff,
            events::HEARTBEAT => Self::Heartbeat,
            events::CLOSE => Self::Close,
            events::ERROR => Self::Error,
            events::LEAVE => Self::Leave,
            _ => Self::Unknown,
        }
    }

    /// The wire token, or `None` for [`Unknown`](Self::Unknown).
    pub fn token(self) -> Option<&'static str> {
        Some(match self {
            Self::Join => events::JOIN,
            Self::Reply => events::REPLY,
            Self::Event => events::EVENT,
            Self::Diff => events::DIFF,
            Self::Heartbeat => events::HEARTBEAT,
            Self::Close => events::CLOSE,
            Self::Error => events::ERROR,
            Self::Leave => events::LEAVE,
            Self::Unknown => return None,
        })
    }
}

/// One protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Correlates every frame of one join lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
    /// Correlates a request with its reply.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<String>,
    /// Topic the frame belongs to.
    pub topic: String,
    /// Event token, see [`events`].
    pub event: String,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
}

const EMPTY_PAYLOAD: &str = "{}";

impl Message {
    /// Build a frame with a serialized payload.
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            join_ref: None,
            msg_ref: None,
            topic: topic.into(),
            event: event.into(),
            payload: Some(serde_json::value::to_raw_value(payload)?),
        })
    }

    /// Set the join correlation id.
    #[must_use]
    pub fn with_join_ref(mut self, join_ref: Option<impl Into<String>>) -> Self {
        self.join_ref = join_ref.map(Into::into);
        self
    }

    /// Set the request correlation id.
    #[must_use]
    pub fn with_ref(mut self, msg_ref: Option<impl Into<String>>) -> Self {
        self.msg_ref = msg_ref.map(Into::into);
        self
    }

    /// Decode a frame from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(DecodeError::Frame)
    }

    /// Encode to JSON text.
    ///
    /// The payload is written exactly as it was received or serialized.
    pub fn encode(&self) -> String {
        let payload = self.payload_str();
        let mut out = String::with_capacity(48 + self.topic.len() + payload.len());
        out.push('{');
        if let Some(join_ref) = &self.join_ref {
            push_field(&mut out, "join_ref", join_ref);
        }
        if let Some(msg_ref) = &self.msg_ref {
            push_field(&mut out, "ref", msg_ref);
        }
        push_field(&mut out, "topic", &self.topic);
        push_field(&mut out, "event", &self.event);
        out.push_str("\"payload\":");
        out.push_str(payload);
        out.push('}');
        out
    }

    /// Parsed event token.
    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event)
    }

    /// Raw payload text. A missing or null payload reads as `{}`.
    pub fn payload_str(&self) -> &str {
        self.payload.as_deref().map_or(EMPTY_PAYLOAD, RawValue::get)
    }
}

fn push_field(out: &mut String, key: &str, value: &str) {
    // Display on a JSON string value escapes it.
    let _ = write!(out, "\"{key}\":{},", Value::String(value.to_owned()));
}
