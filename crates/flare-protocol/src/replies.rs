//! Constructors for server-sent frames.
//!
//! Replies echo the request's `join_ref` and `ref` so the client can match
//! them to what it sent.

use flare_render::{Patch, RenderedNode};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::ProtocolError;
use crate::message::{Message, events};
use crate::payload::{ErrorPayload, ReplyPayload};

#[derive(Serialize)]
struct Rendered<'a> {
    rendered: &'a RenderedNode,
}

fn reply_to(
    request: &Message,
    topic: &str,
    event: &str,
    payload: &impl Serialize,
) -> Result<Message, ProtocolError> {
    Ok(Message::new(topic, event, payload)?
        .with_join_ref(request.join_ref.clone())
        .with_ref(request.msg_ref.clone()))
}

/// Successful join: `phx_reply` carrying the full rendered tree.
pub fn join_reply(request: &Message, rendered: &RenderedNode) -> Result<Message, ProtocolError> {
    reply_to(
        request,
        &request.topic,
        events::REPLY,
        &ReplyPayload::ok(Rendered { rendered }),
    )
}

/// Successful reply with an empty response, used for leave.
pub fn ok_reply(request: &Message) -> Result<Message, ProtocolError> {
    reply_to(
        request,
        &request.topic,
        events::REPLY,
        &ReplyPayload::ok(Map::<String, Value>::new()),
    )
}

/// Failed request answered as `phx_reply` with error status.
pub fn error_reply(request: &Message, reason: &str) -> Result<Message, ProtocolError> {
    reply_to(request, &request.topic, events::REPLY, &ErrorPayload::new(reason))
}

/// Failure reported as `phx_error`.
pub fn error_frame(request: &Message, reason: &str) -> Result<Message, ProtocolError> {
    reply_to(request, &request.topic, events::ERROR, &ErrorPayload::new(reason))
}

/// Answer to a `heartbeat`, always on the `phoenix` topic.
pub fn heartbeat_reply(request: &Message) -> Result<Message, ProtocolError> {
    reply_to(
        request,
        events::PHOENIX_TOPIC,
        events::REPLY,
        &ReplyPayload::ok(Map::<String, Value>::new()),
    )
}

/// A patch pushed to a joined topic.
///
/// `msg_ref` is the ref of the client event that caused it, or `None` when a
/// broadcast caused it.
pub fn diff(
    topic: &str,
    join_ref: Option<&str>,
    msg_ref: Option<&str>,
    patch: &Patch,
) -> Result<Message, ProtocolError> {
    Ok(Message::new(topic, events::DIFF, patch)?
        .with_join_ref(join_ref)
        .with_ref(msg_ref))
}

/// Server-initiated close of a joined topic.
pub fn close(topic: &str, join_ref: Option<&str>) -> Result<Message, ProtocolError> {
    Ok(Message::new(topic, events::CLOSE, &Map::<String, Value>::new())?.with_join_ref(join_ref))
}
