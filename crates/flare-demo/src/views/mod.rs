//! Demo views.
//!
//! | Topic | View |
//! |-------|------|
//! | `counter` | [`counter::Counter`] |
//! | `chat:room` | [`chat::Chat`] |
//! | `form` | [`form::Form`] |

pub mod chat;
pub mod counter;
pub mod form;

use flare_live::ViewRegistry;
use flare_render::{RenderedNode, Slot};
use tracing::warn;

/// Register every demo view under its topic.
pub fn register_all(views: &ViewRegistry) {
    views.register(counter::TOPIC, counter::Counter::default);
    views.register(chat::TOPIC, chat::Chat::default);
    views.register(form::TOPIC, form::Form::default);
}

/// Build a node from fixed template statics.
pub(crate) fn node(statics: &[&str], dynamics: Vec<Slot>) -> RenderedNode {
    let statics = statics.iter().map(|s| (*s).to_owned()).collect();
    RenderedNode::new(statics, dynamics).unwrap_or_else(|error| {
        warn!(%error, "template statics do not match dynamics");
        RenderedNode::text("")
    })
}

/// Escape text for use in element content or a quoted attribute.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_markup() {
        assert_eq!(escape(r#"<b a="x">&'"#), "&lt;b a=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn mismatched_template_renders_empty() {
        assert_eq!(node(&["a", "b"], Vec::new()), RenderedNode::text(""));
    }

    #[test]
    fn all_topics_registered() {
        let views = ViewRegistry::new();
        register_all(&views);
        assert_eq!(views.topics(), vec!["chat:room", "counter", "form"]);
    }
}
