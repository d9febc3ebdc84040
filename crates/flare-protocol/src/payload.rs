//! Typed payloads and the tolerant payload decoder.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::DecodeError;
use crate::message::Message;

/// A payload type that can be read out of a [`Message`].
pub trait Payload: DeserializeOwned {
    /// Short name used in decode errors.
    const NAME: &'static str;
}

/// Decode a typed payload from raw JSON.
///
/// Older clients double-encode payloads as a JSON string holding the JSON
/// object. When the direct decode fails and the raw text is a string, its
/// contents are decoded instead. The error from the direct attempt is the
/// one reported.
pub fn decode_payload<T: Payload>(raw: &str) -> Result<T, DecodeError> {
    match serde_json::from_str::<T>(raw) {
        Ok(value) => Ok(value),
        Err(direct) => serde_json::from_str::<String>(raw)
            .ok()
            .and_then(|inner| serde_json::from_str::<T>(&inner).ok())
            .ok_or(DecodeError::Payload {
                expected: T::NAME,
                source: direct,
            }),
    }
}

impl Message {
    /// Decode this frame's payload as `T`.
    pub fn payload_as<T: Payload>(&self) -> Result<T, DecodeError> {
        decode_payload(self.payload_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload of `phx_join`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinPayload {
    /// Parameters handed to the view's `mount`.
    #[serde(deserialize_with = "null_as_default")]
    pub params: Map<String, Value>,
    /// Signed session token, checked by the session verifier.
    #[serde(deserialize_with = "null_as_default")]
    pub session: String,
    /// Static token from the initial HTTP render.
    #[serde(rename = "static", deserialize_with = "null_as_default")]
    pub static_token: String,
}

impl Payload for JoinPayload {
    const NAME: &'static str = "join";
}

/// Payload of a client `event`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// DOM event type, e.g. `click` or `form`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Application event name the view dispatches on.
    pub event: String,
    /// Event value, usually an object.
    #[serde(default)]
    pub value: Value,
    /// Element the event targets, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    /// Elements the event targets, if several.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl Payload for EventPayload {
    const NAME: &'static str = "event";
}

/// Successful reply body: `{"status": "ok", "response": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload<R = Value> {
    /// Always `"ok"`.
    pub status: String,
    /// Event-specific response.
    pub response: R,
}

impl<R> ReplyPayload<R> {
    /// Wrap a response with `"ok"` status.
    pub fn ok(response: R) -> Self {
        Self {
            status: "ok".into(),
            response,
        }
    }
}

impl<R: DeserializeOwned> Payload for ReplyPayload<R> {
    const NAME: &'static str = "reply";
}

/// Failure body: `{"status": "error", "reason": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Always `"error"`.
    pub status: String,
    /// Human-readable reason.
    pub reason: String,
}

impl ErrorPayload {
    /// Build an error body.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            reason: reason.into(),
        }
    }
}

impl Payload for ErrorPayload {
    const NAME: &'static str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn join_payload_direct() {
        let join: JoinPayload =
            decode_payload(r#"{"params":{"room":"a"},"session":"tok","static":"st"}"#).unwrap();
        assert_eq!(join.params["room"], "a");
        assert_eq!(join.session, "tok");
        assert_eq!(join.static_token, "st");
    }

    #[test]
    fn join_payload_defaults_missing_and_null_fields() {
        let join: JoinPayload = decode_payload(r#"{"params":null}"#).unwrap();
        assert!(join.params.is_empty());
        assert!(join.session.is_empty());
        let empty: JoinPayload = decode_payload("{}").unwrap();
        assert_eq!(empty, JoinPayload::default());
    }

    #[test]
    fn event_payload_direct() {
        let ev: EventPayload =
            decode_payload(r#"{"type":"click","event":"inc","value":{"value":"3"}}"#).unwrap();
        assert_eq!(ev.kind, "click");
        assert_eq!(ev.event, "inc");
        assert_eq!(ev.value["value"], "3");
        assert!(ev.target.is_empty());
    }

    #[test]
    fn event_payload_double_encoded() {
        let inner = r#"{"type":"click","event":"dec","value":{}}"#;
        let raw = serde_json::to_string(inner).unwrap();
        let ev: EventPayload = decode_payload(&raw).unwrap();
        assert_eq!(ev.event, "dec");
        assert_eq!(ev.value, json!({}));
    }

    #[test]
    fn double_encoded_garbage_fails() {
        let raw = serde_json::to_string("not an object").unwrap();
        let err = decode_payload::<EventPayload>(&raw).unwrap_err();
        assert_matches!(err, DecodeError::Payload { expected: "event", .. });
    }

    #[test]
    fn event_without_name_fails() {
        let err = decode_payload::<EventPayload>(r#"{"type":"click"}"#).unwrap_err();
        assert_matches!(err, DecodeError::Payload { .. });
    }

    #[test]
    fn reply_payload_shape() {
        let value = serde_json::to_value(ReplyPayload::ok(json!({}))).unwrap();
        assert_eq!(value, json!({"status": "ok", "response": {}}));
    }

    #[test]
    fn error_payload_shape() {
        let value = serde_json::to_value(ErrorPayload::new("unknown topic")).unwrap();
        assert_eq!(value, json!({"status": "error", "reason": "unknown topic"}));
    }

    #[test]
    fn payload_as_reads_message() {
        let msg = Message::decode(
            br#"{"topic":"t","event":"event","payload":{"type":"click","event":"inc"}}"#,
        )
        .unwrap();
        let ev: EventPayload = msg.payload_as().unwrap();
        assert_eq!(ev.event, "inc");
        assert!(ev.value.is_null());
    }
}
