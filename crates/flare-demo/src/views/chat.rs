//! Shared chat room.
//!
//! Every session subscribes to [`TOPIC`] on mount. Sending a message
//! publishes it to the room rather than appending locally, so the sender sees
//! its own message through the same broadcast path as everyone else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flare_live::{LiveView, Params, ViewContext, ViewError};
use flare_pubsub::Broadcast;
use flare_render::{RenderedNode, Renderable, Slot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{escape, node};

/// Topic the chat is joined on and broadcasts to.
pub const TOPIC: &str = "chat:room";

/// Broadcast event carrying a [`ChatMessage`].
pub const NEW_MESSAGE: &str = "new_message";

const DEFAULT_USERNAME: &str = "Anonymous";

/// One posted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique id.
    pub id: Uuid,
    /// Author's display name.
    pub user: String,
    /// Message body.
    pub text: String,
    /// When it was sent.
    pub sent_at: DateTime<Utc>,
}

/// Chat room state for one session.
#[derive(Debug, Default)]
pub struct Chat {
    username: String,
    messages: Vec<ChatMessage>,
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

impl Chat {
    fn render_message(message: &ChatMessage) -> RenderedNode {
        node(
            &[
                "<div class=\"message\"><span class=\"user\">",
                ":</span> <span class=\"text\">",
                "</span> <span class=\"time\">",
                "</span></div>",
            ],
            vec![
                escape(&message.user).into(),
                escape(&message.text).into(),
                message.sent_at.format("%H:%M").to_string().into(),
            ],
        )
    }
}

#[async_trait]
impl LiveView for Chat {
    async fn mount(&mut self, params: &Params, ctx: &ViewContext) -> Result<(), ViewError> {
        self.username = non_empty(params.get("username")).unwrap_or(DEFAULT_USERNAME).to_owned();
        self.messages.clear();
        ctx.subscribe(TOPIC);
        Ok(())
    }

    async fn handle_event(
        &mut self,
        event: &str,
        value: &Value,
        ctx: &ViewContext,
    ) -> Result<(), ViewError> {
        match event {
            "send_message" => {
                // Blank messages are ignored.
                let Some(text) = non_empty(value.get("message")) else {
                    return Ok(());
                };
                let message = ChatMessage {
                    id: Uuid::now_v7(),
                    user: self.username.clone(),
                    text: text.to_owned(),
                    sent_at: Utc::now(),
                };
                let payload = serde_json::to_value(&message)
                    .map_err(|e| ViewError::new(format!("failed to encode message: {e}")))?;
                ctx.broadcast(TOPIC, NEW_MESSAGE, payload)?;
            }
            "set_username" => {
                self.username = non_empty(value.get("username"))
                    .unwrap_or(DEFAULT_USERNAME)
                    .to_owned();
            }
            other => return Err(ViewError::new(format!("unknown event {other}"))),
        }
        Ok(())
    }

    async fn handle_info(
        &mut self,
        message: &Broadcast,
        _ctx: &ViewContext,
    ) -> Result<(), ViewError> {
        if message.event != NEW_MESSAGE {
            return Ok(());
        }
        let posted: ChatMessage = serde_json::from_value(message.payload.clone())
            .map_err(|e| ViewError::new(format!("malformed chat message: {e}")))?;
        self.messages.push(posted);
        Ok(())
    }

    fn render(&self) -> Renderable {
        let items: Vec<RenderedNode> = self.messages.iter().map(Self::render_message).collect();
        node(
            &[
                "<div class=\"chat\"><h1>Chat Room</h1>\
                 <input type=\"text\" name=\"username\" value=\"",
                "\" phx-change=\"set_username\"/><div class=\"messages\">",
                "</div><form phx-submit=\"send_message\">\
                 <input type=\"text\" name=\"message\" placeholder=\"Type a message...\"/>\
                 <button type=\"submit\">Send</button></form></div>",
            ],
            vec![escape(&self.username).into(), Slot::List(items)],
        )
        .into()
    }
}
