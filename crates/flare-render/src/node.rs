//! Rendered nodes and their slot values.

use std::fmt::Write as _;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::errors::{ConstructionError, Result};

/// One dynamic value inside a [`RenderedNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Text, compared byte for byte.
    Text(String),
    /// An opaque number.
    Number(Number),
    /// An opaque boolean.
    Bool(bool),
    /// Renders as nothing.
    Null,
    /// A nested node with its own statics.
    Node(RenderedNode),
    /// An ordered list of nodes, rendered back to back.
    List(Vec<RenderedNode>),
}

impl Slot {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::Node(_) => "node",
            Self::List(_) => "list",
        }
    }

    /// Append this slot's rendered text to `out`.
    pub fn render_into(&self, out: &mut String) {
        match self {
            Self::Text(s) => out.push_str(s),
            Self::Number(n) => {
                let _ = write!(out, "{n}");
            }
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Null => {}
            Self::Node(node) => node.render_into(out),
            Self::List(items) => {
                for item in items {
                    item.render_into(out);
                }
            }
        }
    }

    /// Decode a slot from its wire form inside a full node.
    ///
    /// Objects must carry `"s"`; arrays must hold full nodes.
    pub fn from_wire(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => Ok(Self::Number(n.clone())),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Object(_) => RenderedNode::from_wire(value).map(Self::Node),
            Value::Array(items) => items
                .iter()
                .map(RenderedNode::from_wire)
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
        }
    }
}

impl From<String> for Slot {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Slot {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for Slot {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Slot {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<bool> for Slot {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<RenderedNode> for Slot {
    fn from(node: RenderedNode) -> Self {
        Self::Node(node)
    }
}

impl From<Vec<RenderedNode>> for Slot {
    fn from(items: Vec<RenderedNode>) -> Self {
        Self::List(items)
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => n.serialize(serializer),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Null => serializer.serialize_unit(),
            Self::Node(node) => node.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// The static/dynamic decomposition of one render pass.
///
/// Immutable once built. Statics and dynamics interleave as
/// `S[0] D[0] S[1] ... D[n-1] S[n]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct RenderedNode {
    statics: Vec<String>,
    dynamics: Vec<Slot>,
}

impl RenderedNode {
    /// Build a node, rejecting inputs where `len(statics) != len(dynamics) + 1`.
    pub fn new(statics: Vec<String>, dynamics: Vec<Slot>) -> Result<Self> {
        let expected = dynamics.len() + 1;
        if statics.len() != expected {
            return Err(ConstructionError::LengthMismatch {
                statics: statics.len(),
                dynamics: dynamics.len(),
                expected,
            });
        }
        Ok(Self { statics, dynamics })
    }

    /// A node with a single static and no dynamics.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            statics: vec![text.into()],
            dynamics: Vec::new(),
        }
    }

    /// The static fragments.
    pub fn statics(&self) -> &[String] {
        &self.statics
    }

    /// The dynamic slots.
    pub fn dynamics(&self) -> &[Slot] {
        &self.dynamics
    }

    /// Split into statics and dynamics.
    pub fn into_parts(self) -> (Vec<String>, Vec<Slot>) {
        (self.statics, self.dynamics)
    }

    /// Total number of slots in this node and everything nested under it.
    pub fn slot_count(&self) -> usize {
        self.dynamics
            .iter()
            .map(|slot| match slot {
                Slot::Node(node) => 1 + node.slot_count(),
                Slot::List(items) => 1 + items.iter().map(Self::slot_count).sum::<usize>(),
                _ => 1,
            })
            .sum()
    }

    /// Render to text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    /// Append the rendered text to `out`.
    pub fn render_into(&self, out: &mut String) {
        for (i, fragment) in self.statics.iter().enumerate() {
            out.push_str(fragment);
            if let Some(slot) = self.dynamics.get(i) {
                slot.render_into(out);
            }
        }
    }

    /// Concatenate nodes into one.
    ///
    /// The last static of each node is joined with the first static of the
    /// next, so the result renders to the concatenation of the inputs.
    pub fn merge(nodes: impl IntoIterator<Item = Self>) -> Self {
        let mut statics: Vec<String> = vec![String::new()];
        let mut dynamics = Vec::new();
        for node in nodes {
            let mut parts = node.statics.into_iter();
            if let (Some(first), Some(last)) = (parts.next(), statics.last_mut()) {
                last.push_str(&first);
            }
            statics.extend(parts);
            dynamics.extend(node.dynamics);
        }
        Self { statics, dynamics }
    }

    /// Decode a full node from its wire form `{"s": [...], "d": [...]}`.
    ///
    /// A missing `"d"` is treated as empty so text-only nodes may omit it.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ConstructionError::invalid("node", "expected an object"));
        };
        let statics = read_statics(map)?;
        let dynamics = match map.get("d") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(Slot::from_wire).collect::<Result<_>>()?,
            Some(_) => return Err(ConstructionError::invalid("node", "\"d\" must be an array")),
        };
        Self::new(statics, dynamics)
    }
}

fn read_statics(map: &Map<String, Value>) -> Result<Vec<String>> {
    let Some(raw) = map.get("s") else {
        return Err(ConstructionError::MissingField("s"));
    };
    let Value::Array(items) = raw else {
        return Err(ConstructionError::invalid("node", "\"s\" must be an array"));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| ConstructionError::invalid("node", "statics must be strings"))
        })
        .collect()
}

impl TryFrom<Value> for RenderedNode {
    type Error = ConstructionError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_wire(&value)
    }
}

impl Serialize for RenderedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("s", &self.statics)?;
        map.serialize_entry("d", &self.dynamics)?;
        map.end()
    }
}
