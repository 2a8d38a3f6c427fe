//! Layout document model.
//!
//! A layout is a mapping of command identifiers to command nodes. Each node
//! has a description and an ordered list of entries; an entry either binds
//! an operation (`operationId`) or names a child command (`subcommandId`).
//!
//! ```yaml
//! main:
//!   description: Pet store
//!   operations:
//!     - name: pets
//!       subcommandId: pets
//! pets:
//!   description: Manage pets
//!   operations:
//!     - name: list
//!       operationId: pet_list
//!       summaryFields: id, name
//!       pagination:
//!         pageSize: limit
//!         nextProperty: next
//! ```
//!
//! Parsing is lenient: malformed nodes and entries are skipped and recorded
//! as [`LayoutError`]s, which [`compile_layout`](crate::compile_layout)
//! reports together with everything else it finds.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validate::LayoutError;

/// Default start node of a layout.
pub const DEFAULT_START: &str = "main";

/// Keys with a meaning in a node or entry; everything else is kept in `extra`.
pub const LAYOUT_KEYS: &[&str] = &[
    "name",
    "bugIds",
    "description",
    "operationId",
    "operations",
    "subcommandId",
    "summaryFields",
    "pagination",
];

/// Keys accepted inside a `pagination` block.
pub const PAGINATION_KEYS: &[&str] = &[
    "itemProperty",
    "itemStart",
    "nextHeader",
    "nextProperty",
    "pageSize",
    "pageStart",
];

/// Names of the fields that drive depagination of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationSpec {
    /// Request field limiting the items per page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<String>,
    /// Request field selecting the page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_start: Option<String>,
    /// Request field selecting the first item offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_start: Option<String>,
    /// Response property holding the item list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_property: Option<String>,
    /// Response property holding the next page URL or token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_property: Option<String>,
    /// Response header holding the next page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_header: Option<String>,
}

/// How a client follows pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategy {
    NextPageHeader,
    NextPageProperty,
    PageNumber,
    ItemOffset,
    SinglePage,
}

impl PaginationSpec {
    /// Picks the strategy a client should use.
    ///
    /// # Examples
    ///
    /// ```
    /// use oas_toolkit_core::{PaginationSpec, PaginationStrategy};
    ///
    /// let spec = PaginationSpec {
    ///     page_size: Some("limit".into()),
    ///     page_start: Some("page".into()),
    ///     next_property: Some("next".into()),
    ///     ..Default::default()
    /// };
    /// assert_eq!(spec.strategy(), PaginationStrategy::NextPageProperty);
    /// assert!(spec.is_active());
    /// assert!(!PaginationSpec::default().is_active());
    /// ```
    pub fn strategy(&self) -> PaginationStrategy {
        if self.next_header.is_some() {
            PaginationStrategy::NextPageHeader
        } else if self.next_property.is_some() {
            PaginationStrategy::NextPageProperty
        } else if self.page_start.is_some() {
            PaginationStrategy::PageNumber
        } else if self.item_start.is_some() {
            PaginationStrategy::ItemOffset
        } else {
            PaginationStrategy::SinglePage
        }
    }

    /// `true` when any option is set; clients then offer a "max items" control.
    pub fn is_active(&self) -> bool {
        self.next_header.is_some()
            || !self.request_fields().is_empty()
            || !self.response_fields().is_empty()
    }

    /// Set request-side options as `(option, field)` pairs.
    pub fn request_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("pageSize", &self.page_size),
            ("pageStart", &self.page_start),
            ("itemStart", &self.item_start),
        ]
        .into_iter()
        .filter_map(|(option, field)| field.as_deref().map(|f| (option, f)))
        .collect()
    }

    /// Set response-body options as `(option, field)` pairs.
    pub fn response_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("itemProperty", &self.item_property),
            ("nextProperty", &self.next_property),
        ]
        .into_iter()
        .filter_map(|(option, field)| field.as_deref().map(|f| (option, f)))
        .collect()
    }
}

/// What a layout entry points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTarget {
    Operation(String),
    Subcommand(String),
}

impl fmt::Display for EntryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(id) => write!(f, "operationId {id}"),
            Self::Subcommand(id) => write!(f, "subcommandId {id}"),
        }
    }
}

/// One entry of a command node's `operations` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEntry {
    pub name: String,
    pub target: EntryTarget,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summary_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bug_ids: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl LayoutEntry {
    pub fn operation(name: &str, operation_id: &str) -> Self {
        Self::new(name, EntryTarget::Operation(operation_id.to_string()))
    }

    pub fn subcommand(name: &str, command_id: &str) -> Self {
        Self::new(name, EntryTarget::Subcommand(command_id.to_string()))
    }

    fn new(name: &str, target: EntryTarget) -> Self {
        Self {
            name: name.to_string(),
            target,
            summary_fields: Vec::new(),
            pagination: None,
            bug_ids: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_pagination(mut self, pagination: PaginationSpec) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// A command node of the layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandNode {
    pub id: String,
    pub description: String,
    pub entries: Vec<LayoutEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summary_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bug_ids: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl CommandNode {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    pub fn with_entry(mut self, entry: LayoutEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

/// A parsed layout: command nodes in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    nodes: Vec<CommandNode>,
    problems: Vec<LayoutError>,
}

impl Layout {
    /// Parses a raw layout mapping.
    ///
    /// Fails only when the layout itself is not a mapping; problems with
    /// individual nodes and entries are kept in [`problems`](Self::problems).
    ///
    /// # Examples
    ///
    /// ```
    /// use oas_toolkit_core::{EntryTarget, Layout};
    /// use serde_json::json;
    ///
    /// let layout = Layout::from_value(&json!({
    ///     "main": {"description": "root", "operations": [
    ///         {"name": "list", "operationId": "widget_list", "summaryFields": "id, name"}
    ///     ]}
    /// })).unwrap();
    ///
    /// let main = layout.node("main").unwrap();
    /// assert_eq!(main.entries[0].target, EntryTarget::Operation("widget_list".into()));
    /// assert_eq!(main.entries[0].summary_fields, vec!["id", "name"]);
    /// assert!(layout.problems().is_empty());
    /// ```
    pub fn from_value(raw: &Value) -> Result<Self, LayoutError> {
        let Some(mapping) = raw.as_object() else {
            return Err(LayoutError::NotAMapping("<layout>".to_string()));
        };

        Ok(Self::from_entries(
            mapping.iter().map(|(id, node)| (id.as_str(), node)),
        ))
    }

    /// Parses `(id, node)` pairs in file order.
    ///
    /// Input formats that keep repeated keys can pass them through here: a
    /// repeated id keeps the first node and is reported as
    /// [`LayoutError::DuplicateCommandId`].
    ///
    /// ```
    /// use oas_toolkit_core::{Layout, LayoutError};
    /// use serde_json::json;
    ///
    /// let first = json!({"description": "first"});
    /// let second = json!({"description": "second"});
    /// let layout = Layout::from_entries([("main", &first), ("main", &second)]);
    /// assert_eq!(layout.node("main").unwrap().description, "first");
    /// assert_eq!(layout.problems(), &[LayoutError::DuplicateCommandId("main".into())]);
    /// ```
    pub fn from_entries<'v>(entries: impl IntoIterator<Item = (&'v str, &'v Value)>) -> Self {
        let mut layout = Layout::default();
        let mut seen = HashSet::new();
        for (id, node) in entries {
            if !seen.insert(id) {
                layout
                    .problems
                    .push(LayoutError::DuplicateCommandId(id.to_string()));
                continue;
            }
            match parse_node(id, node, &mut layout.problems) {
                Some(node) => layout.nodes.push(node),
                None => layout.problems.push(LayoutError::NotAMapping(id.to_string())),
            }
        }
        layout
    }

    /// Builds a layout from already-typed nodes; repeated ids keep the first.
    pub fn from_nodes(nodes: Vec<CommandNode>) -> Self {
        let mut layout = Layout::default();
        for node in nodes {
            if layout.node(&node.id).is_some() {
                layout
                    .problems
                    .push(LayoutError::DuplicateCommandId(node.id.clone()));
                continue;
            }
            layout.nodes.push(node);
        }
        layout
    }

    pub fn node(&self, id: &str) -> Option<&CommandNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> &[CommandNode] {
        &self.nodes
    }

    /// Problems found while parsing.
    pub fn problems(&self) -> &[LayoutError] {
        &self.problems
    }
}

/// Reads a list field given either as a sequence or as CSV text.
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::field_to_list;
/// use serde_json::json;
///
/// assert_eq!(field_to_list(Some(&json!("a, b,,c"))), vec!["a", "b", "c"]);
/// assert_eq!(field_to_list(Some(&json!([" x ", 7]))), vec!["x", "7"]);
/// assert!(field_to_list(None).is_empty());
/// ```
pub fn field_to_list(value: Option<&Value>) -> Vec<String> {
    let text = |v: &Value| match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(text)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => text(other)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn extras(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| !LAYOUT_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn parse_node(id: &str, raw: &Value, problems: &mut Vec<LayoutError>) -> Option<CommandNode> {
    let empty = Map::new();
    let map = match raw {
        Value::Null => &empty,
        Value::Object(map) => map,
        _ => return None,
    };

    let mut node = CommandNode::new(
        id,
        map.get("description").and_then(Value::as_str).unwrap_or_default(),
    );
    node.summary_fields = field_to_list(map.get("summaryFields"));
    node.bug_ids = field_to_list(map.get("bugIds"));
    node.extra = extras(map);

    let entries = match map.get("operations") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(_) => {
            problems.push(LayoutError::MalformedEntry {
                command: id.to_string(),
                index: 0,
                reason: "operations must be a list".to_string(),
            });
            &[][..]
        }
    };

    for (index, raw) in entries.iter().enumerate() {
        match parse_entry(raw) {
            Ok(entry) => node.entries.push(entry),
            Err(reason) => problems.push(LayoutError::MalformedEntry {
                command: id.to_string(),
                index,
                reason,
            }),
        }
    }
    Some(node)
}

fn parse_entry(raw: &Value) -> Result<LayoutEntry, String> {
    let map = raw.as_object().ok_or("entry is not a mapping")?;
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or("missing name")?;

    let operation_id = map.get("operationId").and_then(Value::as_str);
    let subcommand_id = map.get("subcommandId").and_then(Value::as_str);
    let target = match (operation_id, subcommand_id) {
        (Some(_), Some(_)) => {
            return Err(format!("{name} has both operationId and subcommandId"));
        }
        (Some(id), None) => EntryTarget::Operation(id.to_string()),
        (None, Some(id)) => EntryTarget::Subcommand(id.to_string()),
        (None, None) => return Err(format!("{name} missing operationId or subcommandId")),
    };

    let pagination = match map.get("pagination") {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let spec = PaginationSpec::deserialize(raw)
                .map_err(|err| format!("{name} pagination: {err}"))?;
            spec.is_active().then_some(spec)
        }
    };

    Ok(LayoutEntry {
        name: name.to_string(),
        target,
        summary_fields: field_to_list(map.get("summaryFields")),
        pagination,
        bug_ids: field_to_list(map.get("bugIds")),
        extra: extras(map),
    })
}
