//! Structured configuration values.
//!
//! A resolved document is a plain JSON-compatible tree. [`flatten`] turns
//! that tree into environment-variable style names, e.g.
//! `mu.fargate.name` becomes `MU_FARGATE_NAME`.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// The parsed document tree: null, bool, number, string, sequence or mapping.
pub type StructuredValue = serde_json::Value;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// A value is either a leaf with a textual form or a container of named children.
enum Node<'a> {
    Leaf(String),
    Container(Vec<(String, &'a StructuredValue)>),
}

fn classify(value: &StructuredValue) -> Node<'_> {
    match value {
        StructuredValue::Null => Node::Leaf(String::new()),
        StructuredValue::Bool(b) => Node::Leaf(b.to_string()),
        StructuredValue::Number(n) => Node::Leaf(n.to_string()),
        StructuredValue::String(s) => Node::Leaf(s.clone()),
        StructuredValue::Array(items) => Node::Container(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect(),
        ),
        StructuredValue::Object(map) => {
            Node::Container(map.iter().map(|(k, v)| (k.clone(), v)).collect())
        }
    }
}

/// Convert one path segment to an environment name fragment.
fn env_segment(segment: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(segment, "_")
        .trim_matches('_')
        .to_ascii_uppercase()
}

fn join(name: &str, segment: &str) -> String {
    let raw = segment;
    let segment = env_segment(raw);
    if segment.is_empty() && !raw.is_empty() {
        warn!(key = raw, parent = name, "Key has no alphanumeric characters; using parent name");
    }
    match (name.is_empty(), segment.is_empty()) {
        (true, _) => segment,
        (false, true) => name.to_string(),
        (false, false) => format!("{name}_{segment}"),
    }
}

fn walk(value: &StructuredValue, name: String, out: &mut BTreeMap<String, String>) {
    match classify(value) {
        Node::Leaf(text) => {
            if name.is_empty() {
                return;
            }
            match out.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(text);
                }
                Entry::Occupied(mut slot) => {
                    warn!(name = %slot.key(), "Flattened keys collide; keeping the later value");
                    slot.insert(text);
                }
            }
        }
        Node::Container(children) => {
            for (segment, child) in children {
                walk(child, join(&name, &segment), out);
            }
        }
    }
}

/// Flatten a value into `NAME=value` pairs.
///
/// Mapping keys and sequence indices are joined with `_` and upper-cased.
/// Empty containers contribute nothing. A scalar at the root is only emitted
/// when `prefix` is non-empty.
///
/// Keys that sanitize to the same name (`a-b` and `a_b`) collide and the one
/// visited last wins; a key with no alphanumeric characters adds no segment.
/// Both cases are logged as warnings.
pub fn flatten(value: &StructuredValue, prefix: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    walk(value, join("", prefix), &mut out);
    out
}
