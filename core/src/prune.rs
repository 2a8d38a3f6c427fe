//! Document rewrites.
//!
//! Every function takes a document and returns a new one; the input is
//! never modified. [`filter_operations`] keeps a subset of the operations
//! and then drops the components and tags nothing references any more, so
//! the result is still self-contained. [`DocumentUpdate`] bundles the
//! rewrites in the order they are applied.
//!
//! ```
//! use std::collections::BTreeSet;
//! use oas_toolkit_core::*;
//! use serde_json::json;
//!
//! let doc = Document::new(json!({
//!     "paths": {
//!         "/pets": {"get": {"operationId": "pet_list", "responses": {"200": {
//!             "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
//!         }}}},
//!         "/owners": {"get": {"operationId": "owner_list", "responses": {"200": {
//!             "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Owner"}}}
//!         }}}}
//!     },
//!     "components": {"schemas": {"Pet": {"type": "object"}, "Owner": {"type": "object"}}}
//! }));
//!
//! let keep = OperationFilter::Allow(BTreeSet::from(["pet_list".to_string()]));
//! let trimmed = filter_operations(&doc, &keep).unwrap();
//! assert!(trimmed.get("#/paths/~1owners").is_none());
//! assert_eq!(trimmed.schema_names(), vec!["Pet"]);
//! ```

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::document::Document;
use crate::operation::HTTP_METHODS;
use crate::references::{ReferenceGraph, find_references};

/// Component sections whose entries are only reachable through `$ref`.
///
/// Other sections (`securitySchemes`) are referenced by name and are never
/// pruned.
pub const PRUNABLE_SECTIONS: &[&str] = &[
    "schemas",
    "responses",
    "parameters",
    "examples",
    "requestBodies",
    "headers",
    "links",
    "callbacks",
    "pathItems",
];

/// Which operations [`filter_operations`] keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationFilter {
    /// Keep only these operation ids. Operations without an id are dropped.
    Allow(BTreeSet<String>),
    /// Drop these operation ids and keep everything else.
    Remove(BTreeSet<String>),
}

impl OperationFilter {
    fn named(&self) -> &BTreeSet<String> {
        match self {
            Self::Allow(ids) | Self::Remove(ids) => ids,
        }
    }

    fn keeps(&self, id: Option<&str>) -> bool {
        let named = id.is_some_and(|id| self.named().contains(id));
        match self {
            Self::Allow(_) => named,
            Self::Remove(_) => !named,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PruneError {
    /// The filter names operation ids the document does not have.
    #[error("document is missing operation(s): {}", .0.join(", "))]
    UnknownOperations(Vec<String>),
}

/// Rewrites applied by [`DocumentUpdate::apply`], in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentUpdate {
    /// Drop operation tags and the top-level tag list.
    pub remove_tags: bool,
    /// Mapping keys to delete everywhere in the document.
    pub remove_properties: Vec<String>,
    /// Drop nullable properties from the `required` lists of named schemas.
    pub nullable_not_required: bool,
    /// Operations to keep or remove.
    pub operations: Option<OperationFilter>,
}

impl DocumentUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, document: &Document) -> Result<Document, PruneError> {
        let mut updated = document.clone();
        if self.remove_tags {
            updated = remove_tags(&updated);
        }
        for name in &self.remove_properties {
            updated = remove_property(&updated, name);
        }
        if self.nullable_not_required {
            updated = nullable_not_required(&updated);
        }
        if let Some(filter) = &self.operations {
            updated = filter_operations(&updated, filter)?;
        }
        Ok(updated)
    }
}

/// Keeps the operations `filter` selects, then drops unused tags and
/// components.
///
/// Path items left without any operation are removed with their shared
/// parameters.
///
/// # Errors
///
/// [`PruneError::UnknownOperations`] when the filter names an id that is
/// not in the document.
pub fn filter_operations(document: &Document, filter: &OperationFilter) -> Result<Document, PruneError> {
    let present = operation_ids(document.root());
    let unknown: Vec<String> = filter.named().difference(&present).cloned().collect();
    if !unknown.is_empty() {
        return Err(PruneError::UnknownOperations(unknown));
    }

    let mut root = document.root().clone();
    if let Some(paths) = root.get_mut("paths").and_then(Value::as_object_mut) {
        paths.retain(|path, item| {
            let Some(item) = item.as_object_mut() else {
                return true;
            };
            let before = method_count(item);
            item.retain(|key, operation| {
                !HTTP_METHODS.contains(&key.as_str())
                    || filter.keeps(operation.get("operationId").and_then(Value::as_str))
            });
            let emptied = before > 0 && method_count(item) == 0;
            if emptied {
                debug!(path = %path, "dropping path without operations");
            }
            !emptied
        });
    }

    let used_tags = operation_tags(&root);
    if let Some(map) = root.as_object_mut() {
        if let Some(Value::Array(tags)) = map.get_mut("tags") {
            tags.retain(|tag| {
                tag.get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| used_tags.contains(name))
            });
        }
        map.retain(|key, value| !(key == "tags" && is_empty_container(value)));
    }

    Ok(prune_components(&Document::new(root)))
}

/// Drops components nothing outside [`PRUNABLE_SECTIONS`] reaches.
///
/// A section emptied by pruning is removed.
pub fn prune_components(document: &Document) -> Document {
    let mut outside = document.root().clone();
    if let Some(components) = outside.get_mut("components").and_then(Value::as_object_mut) {
        components.retain(|section, _| !PRUNABLE_SECTIONS.contains(&section.as_str()));
    }
    let graph = ReferenceGraph::build(document);
    let reached = graph.reach(find_references(&outside));

    let mut root = document.root().clone();
    if let Some(components) = root.get_mut("components").and_then(Value::as_object_mut) {
        components.retain(|section, entries| {
            if !PRUNABLE_SECTIONS.contains(&section.as_str()) {
                return true;
            }
            let Some(entries) = entries.as_object_mut() else {
                return true;
            };
            if entries.is_empty() {
                return true;
            }
            entries.retain(|name, _| {
                let keep = reached.contains(&format!("{section}/{name}"));
                if !keep {
                    debug!(section = %section, name = %name, "dropping unreferenced component");
                }
                keep
            });
            !entries.is_empty()
        });
    }
    Document::new(root)
}

/// Removes the `tags` of every operation and the top-level tag list.
pub fn remove_tags(document: &Document) -> Document {
    let mut root = document.root().clone();
    if let Some(paths) = root.get_mut("paths").and_then(Value::as_object_mut) {
        for item in paths.values_mut() {
            let Some(item) = item.as_object_mut() else {
                continue;
            };
            for (key, operation) in item.iter_mut() {
                if !HTTP_METHODS.contains(&key.as_str()) {
                    continue;
                }
                if let Some(operation) = operation.as_object_mut() {
                    operation.retain(|key, _| key != "tags");
                }
            }
        }
    }
    if let Some(map) = root.as_object_mut() {
        map.retain(|key, _| key != "tags");
    }
    Document::new(root)
}

/// Removes nullable properties from the `required` list of each named
/// schema. An emptied `required` list is removed.
///
/// A property is nullable when it has `nullable: true`, a `null` type (or a
/// type list containing `null`), or a `oneOf` / `anyOf` alternative typed
/// `null`.
pub fn nullable_not_required(document: &Document) -> Document {
    let mut root = document.root().clone();
    let Some(schemas) = root
        .pointer_mut("/components/schemas")
        .and_then(Value::as_object_mut)
    else {
        return Document::new(root);
    };
    for schema in schemas.values_mut() {
        let Some(schema) = schema.as_object_mut() else {
            continue;
        };
        let nullable: BTreeSet<String> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .filter(|(_, property)| is_nullable(property))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        if nullable.is_empty() {
            continue;
        }
        if let Some(Value::Array(required)) = schema.get_mut("required") {
            required.retain(|name| name.as_str().is_none_or(|name| !nullable.contains(name)));
        }
        schema.retain(|key, value| !(key == "required" && is_empty_container(value)));
    }
    Document::new(root)
}

fn is_nullable(property: &Value) -> bool {
    if property.get("nullable").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    if has_null_type(property) {
        return true;
    }
    ["oneOf", "anyOf"].iter().any(|keyword| {
        property
            .get(*keyword)
            .and_then(Value::as_array)
            .is_some_and(|alternatives| alternatives.iter().any(has_null_type))
    })
}

fn has_null_type(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(name)) => name == "null",
        Some(Value::Array(names)) => names.iter().any(|n| n.as_str() == Some("null")),
        _ => false,
    }
}

/// Deletes every mapping key called `name`, at any depth.
///
/// Mappings and sequences that become empty because of the removal are
/// removed from their parent mapping; ones that were already empty stay.
pub fn remove_property(document: &Document, name: &str) -> Document {
    let mut root = document.root().clone();
    strip(&mut root, name);
    Document::new(root)
}

fn strip(value: &mut Value, name: &str) {
    match value {
        Value::Object(map) => strip_map(map, name),
        Value::Array(items) => {
            for item in items {
                strip(item, name);
            }
        }
        _ => {}
    }
}

fn strip_map(map: &mut Map<String, Value>, name: &str) {
    map.retain(|key, _| key != name);
    map.retain(|_, child| {
        if is_empty_container(child) {
            return true;
        }
        strip(child, name);
        !is_empty_container(child)
    });
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn method_count(item: &Map<String, Value>) -> usize {
    item.keys()
        .filter(|key| HTTP_METHODS.contains(&key.as_str()))
        .count()
}

fn operations(root: &Value) -> impl Iterator<Item = &Value> {
    root.get("paths")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|paths| paths.values())
        .filter_map(Value::as_object)
        .flat_map(|item| {
            item.iter()
                .filter(|(key, _)| HTTP_METHODS.contains(&key.as_str()))
                .map(|(_, operation)| operation)
        })
}

fn operation_ids(root: &Value) -> BTreeSet<String> {
    operations(root)
        .filter_map(|op| op.get("operationId").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn operation_tags(root: &Value) -> BTreeSet<String> {
    operations(root)
        .filter_map(|op| op.get("tags").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
