//! Structural document differ.
//!
//! [`diff`] compares two documents node by node and returns a [`DiffReport`]
//! mirroring their shared shape. It is purely structural: nothing about the
//! meaning of a change (breaking or not) is inferred.
//!
//! - Mappings: keys only in the original are removed, keys only in the
//!   update are added, shared keys recurse.
//! - Sequences: compared by index. Extra trailing elements of the longer
//!   sequence are whole additions or removals. With
//!   [`DiffOptions::scalar_sets`], sequences of scalars compare as sets.
//!   Scalar sequences under a [`SET_KEYWORDS`] key (`required`) always
//!   compare as sets, so dropping one required name is one change.
//! - Scalars: unequal values give an old/new pair.
//! - Different node types at the same path are a replacement.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

/// Mapping keys whose scalar sequences are unordered sets of names.
pub const SET_KEYWORDS: &[&str] = &["required"];

/// Differ switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Compare sequences whose members are all scalars as unordered sets.
    pub scalar_sets: bool,
}

/// One step of a path through a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// The document itself.
    Root,
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("$"),
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Renders a path as `a.b[2].c`.
pub fn format_path(path: &[PathSegment]) -> String {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            PathSegment::Index(_) => rendered.push_str(&segment.to_string()),
            _ => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(&segment.to_string());
            }
        }
    }
    rendered
}

/// A leaf difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Added { value: Value },
    Removed { value: Value },
    /// Same node type, different scalar value.
    Changed { old: Value, new: Value },
    /// Different node types.
    Replaced { old: Value, new: Value },
    /// Set difference of two scalar sequences.
    Members { added: Vec<Value>, removed: Vec<Value> },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { value } => write!(f, "added {}", inline(value)),
            Self::Removed { value } => write!(f, "removed {}", inline(value)),
            Self::Changed { old, new } => write!(f, "changed {} -> {}", inline(old), inline(new)),
            Self::Replaced { old, new } => {
                write!(f, "replaced {} with {}", inline(old), inline(new))
            }
            Self::Members { added, removed } => {
                let mut parts = Vec::new();
                if !added.is_empty() {
                    parts.push(format!("added {}", list(added)));
                }
                if !removed.is_empty() {
                    parts.push(format!("removed {}", list(removed)));
                }
                f.write_str(&parts.join(", "))
            }
        }
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => format!("`{s}`"),
        other => format!("`{other}`"),
    }
}

fn list(values: &[Value]) -> String {
    values.iter().map(inline).collect::<Vec<_>>().join(", ")
}

/// A node of the report: a leaf change or a nested report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiffNode {
    Nested(DiffReport),
    Change(Change),
}

/// Nested change report, ordered like the documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    entries: Vec<(PathSegment, DiffNode)>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of direct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(PathSegment, DiffNode)] {
        &self.entries
    }

    pub fn get(&self, segment: &PathSegment) -> Option<&DiffNode> {
        self.entries
            .iter()
            .find(|(s, _)| s == segment)
            .map(|(_, node)| node)
    }

    /// Looks up the node at a path below this report.
    pub fn at(&self, path: &[PathSegment]) -> Option<&DiffNode> {
        let (first, rest) = path.split_first()?;
        let node = self.get(first)?;
        if rest.is_empty() {
            return Some(node);
        }
        match node {
            DiffNode::Nested(report) => report.at(rest),
            DiffNode::Change(_) => None,
        }
    }

    /// The nested report at a path, if that path has nested changes.
    pub fn report_at(&self, path: &[PathSegment]) -> Option<&DiffReport> {
        if path.is_empty() {
            return Some(self);
        }
        match self.at(path)? {
            DiffNode::Nested(report) => Some(report),
            DiffNode::Change(_) => None,
        }
    }

    /// Total number of leaf changes.
    pub fn change_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, node)| match node {
                DiffNode::Nested(report) => report.change_count(),
                DiffNode::Change(_) => 1,
            })
            .sum()
    }

    /// Every leaf change with its full path, in report order.
    pub fn changes(&self) -> Vec<(Vec<PathSegment>, &Change)> {
        let mut out = Vec::new();
        self.collect(&mut Vec::new(), &mut out);
        out
    }

    fn collect<'r>(&'r self, prefix: &mut Vec<PathSegment>, out: &mut Vec<(Vec<PathSegment>, &'r Change)>) {
        for (segment, node) in &self.entries {
            prefix.push(segment.clone());
            match node {
                DiffNode::Nested(report) => report.collect(prefix, out),
                DiffNode::Change(change) => out.push((prefix.clone(), change)),
            }
            prefix.pop();
        }
    }
}

impl Serialize for DiffReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (segment, node) in &self.entries {
            map.serialize_entry(&segment.to_string(), node)?;
        }
        map.end()
    }
}

/// Diffs two documents with default options.
///
/// # Example
///
/// ```
/// use oas_toolkit_core::*;
/// use serde_json::json;
///
/// let original = Document::new(json!({"info": {"version": "1.0"}, "tags": ["a", "b", "c"]}));
/// let updated = Document::new(json!({"info": {"version": "1.1"}, "tags": ["a", "b", "c", "d", "e"]}));
///
/// let report = diff(&original, &updated);
/// assert_eq!(report.change_count(), 3);
/// assert!(diff(&original, &original).is_empty());
/// ```
pub fn diff(original: &Document, updated: &Document) -> DiffReport {
    diff_with(original, updated, &DiffOptions::default())
}

pub fn diff_with(original: &Document, updated: &Document, options: &DiffOptions) -> DiffReport {
    match diff_values(original.root(), updated.root(), options) {
        Some(DiffNode::Nested(report)) => report,
        Some(DiffNode::Change(change)) => DiffReport {
            entries: vec![(PathSegment::Root, DiffNode::Change(change))],
        },
        None => DiffReport::default(),
    }
}

/// Diffs two arbitrary nodes; `None` when they are structurally equal.
pub fn diff_values(a: &Value, b: &Value, options: &DiffOptions) -> Option<DiffNode> {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            let mut entries = Vec::new();
            for (key, old) in a {
                match b.get(key) {
                    Some(new) => {
                        let node = match (old, new) {
                            (Value::Array(x), Value::Array(y))
                                if SET_KEYWORDS.contains(&key.as_str())
                                    && all_scalar(x)
                                    && all_scalar(y) =>
                            {
                                members(x, y)
                            }
                            _ => diff_values(old, new, options),
                        };
                        if let Some(node) = node {
                            entries.push((PathSegment::from(key.as_str()), node));
                        }
                    }
                    None => entries.push((
                        PathSegment::from(key.as_str()),
                        DiffNode::Change(Change::Removed { value: old.clone() }),
                    )),
                }
            }
            for (key, new) in b {
                if !a.contains_key(key) {
                    entries.push((
                        PathSegment::from(key.as_str()),
                        DiffNode::Change(Change::Added { value: new.clone() }),
                    ));
                }
            }
            nested(entries)
        }
        (Value::Array(a), Value::Array(b)) => {
            if options.scalar_sets && all_scalar(a) && all_scalar(b) {
                return members(a, b);
            }
            let mut entries = Vec::new();
            for (index, (old, new)) in a.iter().zip(b.iter()).enumerate() {
                if let Some(node) = diff_values(old, new, options) {
                    entries.push((PathSegment::Index(index), node));
                }
            }
            for (index, old) in a.iter().enumerate().skip(b.len()) {
                entries.push((
                    PathSegment::Index(index),
                    DiffNode::Change(Change::Removed { value: old.clone() }),
                ));
            }
            for (index, new) in b.iter().enumerate().skip(a.len()) {
                entries.push((
                    PathSegment::Index(index),
                    DiffNode::Change(Change::Added { value: new.clone() }),
                ));
            }
            nested(entries)
        }
        (a, b) if a == b => None,
        (a, b) if same_kind(a, b) => Some(DiffNode::Change(Change::Changed {
            old: a.clone(),
            new: b.clone(),
        })),
        (a, b) => Some(DiffNode::Change(Change::Replaced {
            old: a.clone(),
            new: b.clone(),
        })),
    }
}

fn nested(entries: Vec<(PathSegment, DiffNode)>) -> Option<DiffNode> {
    if entries.is_empty() {
        None
    } else {
        Some(DiffNode::Nested(DiffReport { entries }))
    }
}

fn members(a: &[Value], b: &[Value]) -> Option<DiffNode> {
    let mut removed: Vec<Value> = Vec::new();
    for value in a {
        if !b.contains(value) && !removed.contains(value) {
            removed.push(value.clone());
        }
    }
    let mut added: Vec<Value> = Vec::new();
    for value in b {
        if !a.contains(value) && !added.contains(value) {
            added.push(value.clone());
        }
    }
    if added.is_empty() && removed.is_empty() {
        None
    } else {
        Some(DiffNode::Change(Change::Members { added, removed }))
    }
}

fn all_scalar(values: &[Value]) -> bool {
    values
        .iter()
        .all(|v| !matches!(v, Value::Array(_) | Value::Object(_)))
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
