//! Diffing rendered nodes and applying the resulting patches.
//!
//! Wire form of a patch:
//!
//! | Patch part | JSON |
//! |---|---|
//! | structural patch | `{"s": [...], "d": [...]}` |
//! | value patch | `{"d": [...]}` |
//! | unchanged slot | `null` |
//! | replaced scalar | string, number or bool (a replacement null is `""`) |
//! | replaced node | object with `"s"` |
//! | nested value patch | object with only `"d"` |
//! | list patch | array of `null`, full nodes, or nested value patches |

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::errors::{ConstructionError, Result};
use crate::node::{RenderedNode, Slot};

/// The change between two renders.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// The layout changed; the client replaces everything.
    Structural(RenderedNode),
    /// Same layout; one entry per dynamic slot.
    Value(Vec<SlotDiff>),
}

/// The change to a single dynamic slot inside a value patch.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotDiff {
    /// Deep-equal to the previous value.
    Unchanged,
    /// The slot takes this new value outright.
    Replace(Slot),
    /// A nested node kept its statics; these are its slot changes.
    Nested(Vec<SlotDiff>),
    /// Element-wise changes to a list slot. The list takes this length;
    /// `None` keeps the previous element at that index.
    List(Vec<Option<Patch>>),
}

impl SlotDiff {
    fn kind(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Replace(_) => "replace",
            Self::Nested(_) => "nested",
            Self::List(_) => "list",
        }
    }
}

/// Compute the patch that turns `prev` into `curr`.
///
/// With no previous node, or when the statics differ in length or content,
/// the patch is structural and carries `curr` verbatim. Otherwise each slot
/// is compared in order.
pub fn diff(prev: Option<&RenderedNode>, curr: &RenderedNode) -> Patch {
    match prev {
        Some(prev) if prev.statics() == curr.statics() => {
            Patch::Value(diff_dynamics(prev.dynamics(), curr.dynamics()))
        }
        _ => Patch::Structural(curr.clone()),
    }
}

fn diff_dynamics(prev: &[Slot], curr: &[Slot]) -> Vec<SlotDiff> {
    // Equal statics imply equal slot counts.
    prev.iter()
        .zip(curr)
        .map(|(p, c)| diff_slot(p, c))
        .collect()
}

fn diff_slot(prev: &Slot, curr: &Slot) -> SlotDiff {
    match (prev, curr) {
        (Slot::Node(p), Slot::Node(c)) => match diff(Some(p), c) {
            Patch::Structural(node) => SlotDiff::Replace(Slot::Node(node)),
            Patch::Value(entries) if all_unchanged(&entries) => SlotDiff::Unchanged,
            Patch::Value(entries) => SlotDiff::Nested(entries),
        },
        (Slot::List(p), Slot::List(c)) => {
            let elements: Vec<Option<Patch>> = c
                .iter()
                .enumerate()
                .map(|(i, item)| match p.get(i) {
                    Some(before) => {
                        let patch = diff(Some(before), item);
                        (!patch.is_noop()).then_some(patch)
                    }
                    None => Some(Patch::Structural(item.clone())),
                })
                .collect();
            if p.len() == c.len() && elements.iter().all(Option::is_none) {
                SlotDiff::Unchanged
            } else {
                SlotDiff::List(elements)
            }
        }
        _ if prev == curr => SlotDiff::Unchanged,
        _ => SlotDiff::Replace(curr.clone()),
    }
}

fn all_unchanged(entries: &[SlotDiff]) -> bool {
    entries.iter().all(|e| matches!(e, SlotDiff::Unchanged))
}

impl Patch {
    /// An empty value patch for a node with `slots` dynamics.
    pub fn unchanged(slots: usize) -> Self {
        Self::Value(vec![SlotDiff::Unchanged; slots])
    }

    /// Whether this patch carries statics.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// Whether applying this patch changes nothing.
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Structural(_) => false,
            Self::Value(entries) => all_unchanged(entries),
        }
    }

    /// Apply to the previous node, producing the current one.
    pub fn apply(&self, prev: Option<&RenderedNode>) -> Result<RenderedNode> {
        match self {
            Self::Structural(node) => Ok(node.clone()),
            Self::Value(entries) => {
                let prev = prev.ok_or(ConstructionError::MissingBase)?;
                apply_value(prev, entries)
            }
        }
    }

    /// Decode a patch from its wire form.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ConstructionError::invalid("patch", "expected an object"));
        };
        if map.contains_key("s") {
            return RenderedNode::from_wire(value).map(Self::Structural);
        }
        match map.get("d") {
            Some(Value::Array(items)) => items
                .iter()
                .map(SlotDiff::from_wire)
                .collect::<Result<Vec<_>>>()
                .map(Self::Value),
            Some(_) => Err(ConstructionError::invalid("patch", "\"d\" must be an array")),
            None => Err(ConstructionError::MissingField("d")),
        }
    }
}

fn apply_value(prev: &RenderedNode, entries: &[SlotDiff]) -> Result<RenderedNode> {
    if entries.len() != prev.dynamics().len() {
        return Err(ConstructionError::SlotCount {
            expected: prev.dynamics().len(),
            found: entries.len(),
        });
    }
    let dynamics = prev
        .dynamics()
        .iter()
        .zip(entries)
        .map(|(slot, entry)| apply_slot(slot, entry))
        .collect::<Result<Vec<_>>>()?;
    RenderedNode::new(prev.statics().to_vec(), dynamics)
}

fn apply_slot(prev: &Slot, entry: &SlotDiff) -> Result<Slot> {
    match (prev, entry) {
        (_, SlotDiff::Unchanged) => Ok(prev.clone()),
        (_, SlotDiff::Replace(slot)) => Ok(slot.clone()),
        (Slot::Node(node), SlotDiff::Nested(entries)) => apply_value(node, entries).map(Slot::Node),
        (Slot::List(items), SlotDiff::List(elements)) => elements
            .iter()
            .enumerate()
            .map(|(i, element)| match (element, items.get(i)) {
                (None, Some(before)) => Ok(before.clone()),
                (None, None) => Err(ConstructionError::invalid(
                    "list patch",
                    format!("element {i} unchanged but list has {} items", items.len()),
                )),
                (Some(patch), before) => patch.apply(before),
            })
            .collect::<Result<Vec<_>>>()
            .map(Slot::List),
        // A list patch made only of full nodes is a plain replacement.
        (_, SlotDiff::List(elements)) => elements
            .iter()
            .map(|element| match element {
                Some(Patch::Structural(node)) => Ok(node.clone()),
                _ => Err(ConstructionError::ShapeMismatch {
                    delta: entry.kind(),
                    slot: prev.kind(),
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(Slot::List),
        (_, SlotDiff::Nested(_)) => Err(ConstructionError::ShapeMismatch {
            delta: entry.kind(),
            slot: prev.kind(),
        }),
    }
}

impl SlotDiff {
    /// Decode one value-patch entry.
    pub fn from_wire(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Unchanged),
            Value::Object(map) if map.contains_key("s") => {
                RenderedNode::from_wire(value).map(|node| Self::Replace(Slot::Node(node)))
            }
            Value::Object(_) => match Patch::from_wire(value)? {
                Patch::Value(entries) => Ok(Self::Nested(entries)),
                Patch::Structural(node) => Ok(Self::Replace(Slot::Node(node))),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => Ok(None),
                    other => Patch::from_wire(other).map(Some),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            scalar => Slot::from_wire(scalar).map(Self::Replace),
        }
    }
}

impl Serialize for Patch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Structural(node) => node.serialize(serializer),
            Self::Value(entries) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("d", entries)?;
                map.end()
            }
        }
    }
}

impl Serialize for SlotDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Unchanged => serializer.serialize_unit(),
            // `null` already means "unchanged" inside a value patch.
            Self::Replace(Slot::Null) => serializer.serialize_str(""),
            Self::Replace(slot) => slot.serialize(serializer),
            Self::Nested(entries) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("d", entries)?;
                map.end()
            }
            Self::List(elements) => {
                let mut seq = serializer.serialize_seq(Some(elements.len()))?;
                for element in elements {
                    seq.serialize_element(element)?;
                }
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn node(statics: &[&str], dynamics: Vec<Slot>) -> RenderedNode {
        RenderedNode::new(statics.iter().map(|s| (*s).to_owned()).collect(), dynamics).unwrap()
    }

    fn counter(n: i64) -> RenderedNode {
        node(&["<div>Count: ", "</div>"], vec![Slot::Text(n.to_string())])
    }

    fn item(text: &str) -> RenderedNode {
        node(&["<li>", "</li>"], vec![text.into()])
    }

    fn round_trip(prev: &RenderedNode, curr: &RenderedNode) -> RenderedNode {
        let patch = diff(Some(prev), curr);
        let wire = serde_json::to_value(&patch).unwrap();
        Patch::from_wire(&wire).unwrap().apply(Some(prev)).unwrap()
    }

    #[test]
    fn no_previous_is_structural() {
        let patch = diff(None, &counter(0));
        assert_eq!(patch, Patch::Structural(counter(0)));
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"s": ["<div>Count: ", "</div>"], "d": ["0"]})
        );
    }

    #[test]
    fn changed_statics_are_structural() {
        let prev = counter(0);
        let curr = node(&["<span>", "</span>"], vec!["0".into()]);
        assert!(diff(Some(&prev), &curr).is_structural());
    }

    #[test]
    fn different_static_count_is_structural() {
        let prev = counter(0);
        let curr = node(&["<div>Count: ", "", "</div>"], vec!["0".into(), "x".into()]);
        assert_eq!(diff(Some(&prev), &curr), Patch::Structural(curr));
    }

    #[test]
    fn identical_nodes_give_empty_value_patch() {
        let patch = diff(Some(&counter(3)), &counter(3));
        assert_eq!(patch, Patch::unchanged(1));
        assert!(patch.is_noop());
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"d": [null]}));
    }

    #[test]
    fn counter_increment_sends_only_value() {
        let patch = diff(Some(&counter(0)), &counter(1));
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"d": ["1"]}));
    }

    #[test]
    fn scalar_kind_change_is_replacement() {
        let prev = node(&["", ""], vec![Slot::Text("1".into())]);
        let curr = node(&["", ""], vec![Slot::from(1_i64)]);
        assert_eq!(
            diff(Some(&prev), &curr),
            Patch::Value(vec![SlotDiff::Replace(Slot::from(1_i64))])
        );
    }

    #[test]
    fn replacing_with_null_sends_empty_string() {
        let prev = node(&["", ""], vec!["x".into()]);
        let curr = node(&["", ""], vec![Slot::Null]);
        let wire = serde_json::to_value(diff(Some(&prev), &curr)).unwrap();
        assert_eq!(wire, json!({"d": [""]}));
        assert_eq!(round_trip(&prev, &curr).render(), "");
    }

    #[test]
    fn nested_value_change_embeds_delta() {
        let prev = node(&["<main>", "</main>"], vec![Slot::Node(counter(1))]);
        let curr = node(&["<main>", "</main>"], vec![Slot::Node(counter(2))]);
        let patch = diff(Some(&prev), &curr);
        assert_eq!(
            patch,
            Patch::Value(vec![SlotDiff::Nested(vec![SlotDiff::Replace("2".into())])])
        );
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"d": [{"d": ["2"]}]}));
    }

    #[test]
    fn nested_structural_change_replaces_slot() {
        let prev = node(&["<main>", "</main>"], vec![Slot::Node(counter(1))]);
        let inner = node(&["<p>", "</p>"], vec!["1".into()]);
        let curr = node(&["<main>", "</main>"], vec![Slot::Node(inner.clone())]);
        assert_eq!(
            diff(Some(&prev), &curr),
            Patch::Value(vec![SlotDiff::Replace(Slot::Node(inner))])
        );
    }

    #[test]
    fn unchanged_nested_is_nil() {
        let prev = node(&["<main>", "</main>"], vec![Slot::Node(counter(1))]);
        assert_eq!(diff(Some(&prev), &prev.clone()), Patch::unchanged(1));
    }

    #[test]
    fn list_with_no_changes_is_nil() {
        let prev = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a"), item("b")])]);
        assert_eq!(diff(Some(&prev), &prev.clone()), Patch::unchanged(1));
    }

    #[test]
    fn list_element_change_is_element_wise() {
        let prev = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a"), item("b")])]);
        let curr = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a"), item("c")])]);
        let wire = serde_json::to_value(diff(Some(&prev), &curr)).unwrap();
        assert_eq!(wire, json!({"d": [[null, {"d": ["c"]}]]}));
        assert_eq!(round_trip(&prev, &curr), curr);
    }

    #[test]
    fn list_growth_sends_new_elements_in_full() {
        let prev = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a")])]);
        let curr = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a"), item("b")])]);
        let wire = serde_json::to_value(diff(Some(&prev), &curr)).unwrap();
        assert_eq!(
            wire,
            json!({"d": [[null, {"s": ["<li>", "</li>"], "d": ["b"]}]]})
        );
        assert_eq!(round_trip(&prev, &curr), curr);
    }

    #[test]
    fn list_shrink_is_a_change() {
        let prev = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a"), item("b")])]);
        let curr = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a")])]);
        let patch = diff(Some(&prev), &curr);
        assert_eq!(patch, Patch::Value(vec![SlotDiff::List(vec![None])]));
        assert_eq!(round_trip(&prev, &curr), curr);
    }

    #[test]
    fn list_to_empty() {
        let prev = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a")])]);
        let curr = node(&["<ul>", "</ul>"], vec![Slot::List(vec![])]);
        assert_eq!(round_trip(&prev, &curr).render(), "<ul></ul>");
    }

    #[test]
    fn text_to_list_round_trips() {
        let prev = node(&["<ul>", "</ul>"], vec!["none".into()]);
        let curr = node(&["<ul>", "</ul>"], vec![Slot::List(vec![item("a")])]);
        assert_eq!(round_trip(&prev, &curr), curr);
    }

    #[test]
    fn value_patch_without_base_fails() {
        let err = Patch::unchanged(1).apply(None).unwrap_err();
        assert_eq!(err, ConstructionError::MissingBase);
    }

    #[test]
    fn value_patch_with_wrong_length_fails() {
        let err = Patch::unchanged(2).apply(Some(&counter(0))).unwrap_err();
        assert_matches!(err, ConstructionError::SlotCount { expected: 1, found: 2 });
    }

    #[test]
    fn nested_delta_on_text_slot_fails() {
        let patch = Patch::Value(vec![SlotDiff::Nested(vec![SlotDiff::Unchanged])]);
        let err = patch.apply(Some(&counter(0))).unwrap_err();
        assert_matches!(err, ConstructionError::ShapeMismatch { delta: "nested", slot: "text" });
    }

    #[test]
    fn from_wire_rejects_object_without_d() {
        let err = Patch::from_wire(&json!({"x": 1})).unwrap_err();
        assert_eq!(err, ConstructionError::MissingField("d"));
    }

    #[test]
    fn from_wire_rejects_malformed_child() {
        let err = Patch::from_wire(&json!({"d": [{"s": ["a"], "d": [1]}]})).unwrap_err();
        assert_matches!(err, ConstructionError::LengthMismatch { .. });
    }

    #[test]
    fn from_wire_reads_structural() {
        let patch = Patch::from_wire(&json!({"s": ["a", "b"], "d": [true]})).unwrap();
        assert_matches!(patch, Patch::Structural(ref n) if n.render() == "atrueb");
    }

    mod proptests {
        use super::*;
        use proptest::collection::vec;
        use proptest::prelude::*;

        fn scalar() -> impl Strategy<Value = Slot> {
            prop_oneof![
                "[a-z<>/ ]{0,6}".prop_map(Slot::Text),
                any::<i32>().prop_map(|n| Slot::from(i64::from(n))),
                any::<bool>().prop_map(Slot::Bool),
                Just(Slot::Null),
            ]
        }

        fn build(statics: Vec<String>, slots: Vec<Slot>) -> RenderedNode {
            RenderedNode::new(statics, slots).unwrap()
        }

        /// A pair of slots to compare, built so nested nodes and lists often
        /// share statics and therefore exercise the value-patch paths.
        fn slot_pair() -> impl Strategy<Value = (Slot, Slot)> {
            let leaf = (scalar(), scalar());
            leaf.prop_recursive(3, 48, 4, |inner| {
                let node_pair = vec(inner.clone(), 0..3)
                    .prop_flat_map(|pairs| {
                        let n = pairs.len();
                        (Just(pairs), vec("[a-z<> ]{0,4}", n + 1))
                    })
                    .prop_map(|(pairs, statics)| {
                        let (a, b): (Vec<Slot>, Vec<Slot>) = pairs.into_iter().unzip();
                        (build(statics.clone(), a), build(statics, b))
                    })
                    .boxed();
                prop_oneof![
                    inner.clone().prop_map(|(a, _)| (a.clone(), a)),
                    node_pair
                        .clone()
                        .prop_map(|(a, b)| (Slot::Node(a), Slot::Node(b))),
                    (vec(node_pair, 0..4), any::<prop::sample::Index>(), any::<bool>())
                        .prop_map(|(pairs, cut, shrink_curr)| {
                            let (a, b): (Vec<RenderedNode>, Vec<RenderedNode>) =
                                pairs.into_iter().unzip();
                            let keep = cut.index(a.len() + 1);
                            if shrink_curr {
                                (Slot::List(a), Slot::List(b[..keep].to_vec()))
                            } else {
                                (Slot::List(a[..keep].to_vec()), Slot::List(b))
                            }
                        }),
                    inner,
                ]
            })
        }

        fn node_pair() -> impl Strategy<Value = (RenderedNode, RenderedNode)> {
            vec(slot_pair(), 0..5)
                .prop_flat_map(|pairs| {
                    let n = pairs.len();
                    (Just(pairs), vec("[a-z<>/ ]{0,5}", n + 1))
                })
                .prop_map(|(pairs, statics)| {
                    let (a, b): (Vec<Slot>, Vec<Slot>) = pairs.into_iter().unzip();
                    (build(statics.clone(), a), build(statics, b))
                })
        }

        proptest! {
            #[test]
            fn diff_with_self_is_empty((node, _) in node_pair()) {
                let patch = diff(Some(&node), &node);
                prop_assert!(!patch.is_structural());
                prop_assert!(patch.is_noop());
                let applied = patch.apply(Some(&node)).unwrap();
                prop_assert_eq!(applied.render(), node.render());
            }

            #[test]
            fn applying_diff_reproduces_current((prev, curr) in node_pair()) {
                let patch = diff(Some(&prev), &curr);
                prop_assert!(!patch.is_structural());
                let applied = patch.apply(Some(&prev)).unwrap();
                prop_assert_eq!(applied.render(), curr.render());
            }

            #[test]
            fn wire_form_reproduces_current((prev, curr) in node_pair()) {
                let wire = serde_json::to_value(diff(Some(&prev), &curr)).unwrap();
                let applied = Patch::from_wire(&wire).unwrap().apply(Some(&prev)).unwrap();
                prop_assert_eq!(applied.render(), curr.render());
            }

            #[test]
            fn differing_statics_always_structural(
                (prev, curr) in node_pair(),
                suffix in "[a-z]{1,3}",
            ) {
                let (mut statics, dynamics) = curr.into_parts();
                if let Some(last) = statics.last_mut() {
                    last.push_str(&suffix);
                }
                let curr = build(statics, dynamics);
                let patch = diff(Some(&prev), &curr);
                prop_assert_eq!(patch, Patch::Structural(curr));
            }
        }
    }
}
