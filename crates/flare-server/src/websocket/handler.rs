//! Inbound frame dispatch.

use flare_live::LiveConnection;
use flare_protocol::{EventKind, Message, replies};
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::WS_DECODE_ERRORS_TOTAL;

/// Decode one inbound frame and produce the reply, if any.
///
/// Undecodable frames are logged, counted and dropped. Heartbeats are
/// answered here and never reach the session manager.
pub async fn handle_frame(bytes: &[u8], live: &mut LiveConnection) -> Option<Message> {
    let message = match Message::decode(bytes) {
        Ok(message) => message,
        Err(error) => {
            counter!(WS_DECODE_ERRORS_TOTAL).increment(1);
            warn!(
                connection_id = %live.id(),
                error = %error,
                len = bytes.len(),
                "dropping undecodable frame"
            );
            return None;
        }
    };

    if message.kind() == EventKind::Heartbeat {
        debug!(connection_id = %live.id(), "heartbeat");
        return match replies::heartbeat_reply(&message) {
            Ok(reply) => Some(reply),
            Err(error) => {
                warn!(error = %error, "failed to encode heartbeat reply");
                None
            }
        };
    }

    live.handle_message(&message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use flare_core::ConnectionId;
    use flare_core::logging::capture_logs;
    use flare_live::{
        LiveView, Params, SessionConfig, SessionManager, ViewContext, ViewError, ViewRegistry,
    };
    use flare_protocol::events;
    use flare_pubsub::{Broadcaster, LocalPubSub};
    use flare_render::Renderable;
    use serde_json::{Value, json};

    const JOIN: &[u8] =
        br#"{"join_ref":"1","ref":"1","topic":"hello","event":"phx_join","payload":{"params":{}}}"#;

    struct Hello;

    #[async_trait]
    impl LiveView for Hello {
        async fn mount(&mut self, _: &Params, _: &ViewContext) -> Result<(), ViewError> {
            Ok(())
        }

        async fn handle_event(
            &mut self,
            _: &str,
            _: &Value,
            _: &ViewContext,
        ) -> Result<(), ViewError> {
            Ok(())
        }

        fn render(&self) -> Renderable {
            "<p>hello</p>".into()
        }
    }

    fn live() -> LiveConnection {
        let views = ViewRegistry::new();
        views.register("hello", || Hello);
        let broadcaster = Broadcaster::new(Arc::new(LocalPubSub::new(1, 8)));
        let manager = Arc::new(SessionManager::new(
            Arc::new(views),
            broadcaster,
            SessionConfig::default(),
        ));
        manager.connect(ConnectionId::new())
    }

    fn payload(frame: &Message) -> Value {
        serde_json::from_str(frame.payload_str()).unwrap()
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped() {
        let (logs, _guard) = capture_logs();
        let mut live = live();
        assert!(handle_frame(b"not json", &mut live).await.is_none());
        assert!(handle_frame(br#"{"topic": 1}"#, &mut live).await.is_none());

        let dropped: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.level == tracing::Level::WARN)
            .filter(|e| e.message.contains("dropping undecodable frame"))
            .collect();
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped[0].field("len"), Some("8"));
        assert_eq!(dropped[0].field("connection_id"), Some(live.id().as_str()));
    }

    #[tokio::test]
    async fn valid_frame_logs_no_warning() {
        let (logs, _guard) = capture_logs();
        let mut live = live();
        let _ = handle_frame(
            br#"{"ref":"1","topic":"phoenix","event":"heartbeat","payload":{}}"#,
            &mut live,
        )
        .await;
        assert_eq!(logs.count_at_level(tracing::Level::WARN), 0);
    }

    #[tokio::test]
    async fn heartbeat_answered_inline() {
        let mut live = live();
        let reply = handle_frame(
            br#"{"ref":"7","topic":"phoenix","event":"heartbeat","payload":{}}"#,
            &mut live,
        )
        .await
        .unwrap();
        assert_eq!(reply.topic, events::PHOENIX_TOPIC);
        assert_eq!(reply.event, events::REPLY);
        assert_eq!(reply.msg_ref.as_deref(), Some("7"));
        assert_eq!(payload(&reply), json!({"status": "ok", "response": {}}));
    }

    #[tokio::test]
    async fn join_is_dispatched() {
        let mut live = live();
        let reply = handle_frame(
            JOIN,
            &mut live,
        )
        .await
        .unwrap();
        assert_eq!(
            payload(&reply)["response"]["rendered"],
            json!({"s": ["<p>hello</p>"], "d": []})
        );
        assert!(live.is_joined());
    }
}
