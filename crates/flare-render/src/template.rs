//! Turning view output into rendered nodes.
//!
//! Views either build a [`RenderedNode`] directly or return markup in which
//! every dynamic value is wrapped in positional markers:
//!
//! ```text
//! <div>Count: <!--$0-->5<!--/$0--></div>
//! ```
//!
//! [`decompose`] splits that markup into statics (the text around markers)
//! and text slots (the marker contents).

use std::sync::LazyLock;

use regex::Regex;

use crate::node::{RenderedNode, Slot};

/// One `<!--$N-->value<!--/$N-->` marker. Each open marker pairs with the
/// nearest close marker after it; the two indices are not compared.
static MARKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--\$\d+-->(.*?)<!--/\$\d+-->").unwrap());

/// Split marker-annotated markup into a node.
///
/// Markup without markers becomes a text-only node. The trailing static is
/// always present, possibly empty, so the result is valid for every input.
pub fn decompose(markup: &str) -> RenderedNode {
    let mut statics = Vec::new();
    let mut dynamics = Vec::new();
    let mut last = 0;

    for captures in MARKER_PATTERN.captures_iter(markup) {
        let (Some(whole), Some(value)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        statics.push(markup[last..whole.start()].to_owned());
        dynamics.push(Slot::Text(value.as_str().to_owned()));
        last = whole.end();
    }
    statics.push(markup[last..].to_owned());

    // One static per marker plus the trailing one.
    RenderedNode::new(statics, dynamics).unwrap_or_else(|_| RenderedNode::text(markup))
}

/// What a view returns from `render`.
#[derive(Debug, Clone, PartialEq)]
pub enum Renderable {
    /// Markup with positional markers, split by [`decompose`].
    Markup(String),
    /// An already-built tree.
    Tree(RenderedNode),
}

impl Renderable {
    /// Convert to a node.
    pub fn into_node(self) -> RenderedNode {
        match self {
            Self::Markup(markup) => decompose(&markup),
            Self::Tree(node) => node,
        }
    }
}

impl From<String> for Renderable {
    fn from(markup: String) -> Self {
        Self::Markup(markup)
    }
}

impl From<&str> for Renderable {
    fn from(markup: &str) -> Self {
        Self::Markup(markup.to_owned())
    }
}

impl From<RenderedNode> for Renderable {
    fn from(node: RenderedNode) -> Self {
        Self::Tree(node)
    }
}
