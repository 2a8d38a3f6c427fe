//! Reference graph between reusable components and operations.
//!
//! Components are keyed by section and name (`schemas/Pet`,
//! `parameters/limit`, `responses/NotFound`). Every `$ref` below a component
//! or an operation that points into `#/components/` is an edge; references
//! into a component (`#/components/schemas/Pet/properties/id`) count as a
//! reference to the component itself.
//!
//! ```
//! use oas_toolkit_core::*;
//! use serde_json::json;
//!
//! let doc = Document::new(json!({
//!     "paths": {"/pets": {"get": {
//!         "operationId": "pet_list",
//!         "responses": {"200": {"content": {"application/json": {"schema": {
//!             "$ref": "#/components/schemas/PetPage"
//!         }}}}}
//!     }}},
//!     "components": {"schemas": {
//!         "Pet": {"type": "object", "properties": {"owner": {"$ref": "#/components/schemas/Owner"}}},
//!         "Owner": {"type": "object"},
//!         "PetPage": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
//!     }}
//! }));
//!
//! let graph = ReferenceGraph::build(&doc);
//! assert_eq!(graph.uses("schemas/Pet").into_iter().collect::<Vec<_>>(), vec!["schemas/Owner"]);
//! assert_eq!(graph.used_by("schemas/Owner").len(), 2);
//! assert_eq!(graph.operations_using("schemas/Owner"), vec!["pet_list"]);
//! assert_eq!(graph.full_name("Pet"), Some("schemas/Pet"));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::document::Document;
use crate::operation::HTTP_METHODS;

/// Prefix shared by every local component reference.
pub const COMPONENTS_PREFIX: &str = "#/components/";

/// Component key (`section/name`) of a local reference, if it points into
/// `#/components/`.
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::component_key;
///
/// assert_eq!(component_key("#/components/schemas/Pet").as_deref(), Some("schemas/Pet"));
/// assert_eq!(
///     component_key("#/components/schemas/Pet/properties/id").as_deref(),
///     Some("schemas/Pet")
/// );
/// assert_eq!(component_key("#/paths/~1pets"), None);
/// assert_eq!(component_key("other.yaml#/components/schemas/Pet"), None);
/// ```
pub fn component_key(reference: &str) -> Option<String> {
    let rest = reference.strip_prefix(COMPONENTS_PREFIX)?;
    let mut segments = rest.split('/');
    let section = segments.next().filter(|s| !s.is_empty())?;
    let name = segments.next().filter(|s| !s.is_empty())?;
    Some(format!("{section}/{}", unescape(name)))
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Component keys of every `$ref` found anywhere below `node`.
pub fn find_references(node: &Value) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect(node, &mut found);
    found
}

fn collect(node: &Value, found: &mut BTreeSet<String>) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("$ref", Value::String(reference)) => {
                        if let Some(key) = component_key(reference) {
                            found.insert(key);
                        }
                    }
                    _ => collect(value, found),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, found);
            }
        }
        _ => {}
    }
}

/// Expands `start` with everything reachable through `edges`.
///
/// The result contains the starting names themselves. Cycles are fine.
///
/// # Examples
///
/// ```
/// use std::collections::{BTreeMap, BTreeSet};
/// use oas_toolkit_core::unroll;
///
/// let edges: BTreeMap<String, BTreeSet<String>> = [
///     ("a", vec!["b"]),
///     ("b", vec!["c", "d"]),
///     ("d", vec!["e"]),
///     ("e", vec!["b"]),
/// ]
/// .into_iter()
/// .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
/// .collect();
///
/// let reached = unroll(&edges, ["b".to_string(), "c".to_string()]);
/// assert_eq!(reached.into_iter().collect::<Vec<_>>(), vec!["b", "c", "d", "e"]);
/// ```
pub fn unroll(
    edges: &BTreeMap<String, BTreeSet<String>>,
    start: impl IntoIterator<Item = String>,
) -> BTreeSet<String> {
    let mut reached = BTreeSet::new();
    let mut pending: Vec<String> = start.into_iter().collect();
    while let Some(name) = pending.pop() {
        if !reached.insert(name.clone()) {
            continue;
        }
        if let Some(next) = edges.get(&name) {
            pending.extend(next.iter().filter(|n| !reached.contains(*n)).cloned());
        }
    }
    reached
}

/// Direct references of one operation.
#[derive(Debug, Clone, PartialEq)]
struct OperationRefs {
    id: String,
    references: BTreeSet<String>,
}

/// Who references which component, built once per document.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    components: Vec<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
    reverse: BTreeMap<String, BTreeSet<String>>,
    operations: Vec<OperationRefs>,
}

impl ReferenceGraph {
    pub fn build(document: &Document) -> Self {
        let mut graph = Self::default();

        if let Some(components) = document.components() {
            for (section, entries) in components {
                let Some(entries) = entries.as_object() else {
                    continue;
                };
                for (name, body) in entries {
                    let key = format!("{section}/{name}");
                    let references = find_references(body);
                    for target in &references {
                        graph
                            .reverse
                            .entry(target.clone())
                            .or_default()
                            .insert(key.clone());
                    }
                    graph.edges.insert(key.clone(), references);
                    graph.components.push(key);
                }
            }
        }

        if let Some(paths) = document.paths() {
            for item in paths.values() {
                let shared = item
                    .get("parameters")
                    .map(find_references)
                    .unwrap_or_default();
                for method in HTTP_METHODS {
                    let Some(raw) = item.get(*method) else {
                        continue;
                    };
                    let Some(id) = raw.get("operationId").and_then(Value::as_str) else {
                        continue;
                    };
                    if graph.operations.iter().any(|op| op.id == id) {
                        continue;
                    }
                    let mut references = find_references(raw);
                    references.extend(shared.iter().cloned());
                    graph.operations.push(OperationRefs {
                        id: id.to_string(),
                        references,
                    });
                }
            }
        }

        debug!(
            components = graph.components.len(),
            operations = graph.operations.len(),
            "built reference graph"
        );
        graph
    }

    /// Component keys in declaration order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn contains(&self, key: &str) -> bool {
        self.edges.contains_key(key)
    }

    /// Finds a component by full key or by a unique trailing name.
    ///
    /// `Pet` matches `schemas/Pet` unless another section also has a `Pet`.
    pub fn full_name<'g>(&'g self, name: &str) -> Option<&'g str> {
        if let Some((key, _)) = self.edges.get_key_value(name) {
            return Some(key.as_str());
        }
        let mut matches = self
            .components
            .iter()
            .filter(|key| key.rsplit_once('/').is_some_and(|(_, short)| short == name));
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first.as_str()),
        }
    }

    /// Components referenced directly by `key`.
    pub fn references(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(key)
    }

    /// Every component `key` uses, directly or through other components.
    ///
    /// `key` itself is only included when it is part of a reference cycle.
    pub fn uses(&self, key: &str) -> BTreeSet<String> {
        match self.edges.get(key) {
            Some(direct) => unroll(&self.edges, direct.iter().cloned()),
            None => BTreeSet::new(),
        }
    }

    /// Every component that uses `key`, directly or through other components.
    pub fn used_by(&self, key: &str) -> BTreeSet<String> {
        match self.reverse.get(key) {
            Some(direct) => unroll(&self.reverse, direct.iter().cloned()),
            None => BTreeSet::new(),
        }
    }

    /// Operations that reference `key` or any component using it, in
    /// document order.
    pub fn operations_using(&self, key: &str) -> Vec<&str> {
        let mut targets = self.used_by(key);
        targets.insert(key.to_string());
        self.operations
            .iter()
            .filter(|op| !op.references.is_disjoint(&targets))
            .map(|op| op.id.as_str())
            .collect()
    }

    /// Components an operation uses, directly or indirectly; `None` for an
    /// unknown operation id.
    pub fn operation_models(&self, operation_id: &str) -> Option<BTreeSet<String>> {
        self.operations
            .iter()
            .find(|op| op.id == operation_id)
            .map(|op| unroll(&self.edges, op.references.iter().cloned()))
    }

    /// Everything reachable from `start` (which is included).
    pub fn reach(&self, start: impl IntoIterator<Item = String>) -> BTreeSet<String> {
        unroll(&self.edges, start)
    }

    /// Components no operation reaches.
    pub fn unreachable(&self) -> Vec<&str> {
        let reached = self.reach(
            self.operations
                .iter()
                .flat_map(|op| op.references.iter().cloned()),
        );
        self.components
            .iter()
            .filter(|key| !reached.contains(*key))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn petstore() -> Document {
        Document::new(json!({
            "paths": {
                "/pets": {
                    "parameters": [{"$ref": "#/components/parameters/Tenant"}],
                    "get": {
                        "operationId": "pet_list",
                        "responses": {"200": {"content": {"application/json": {"schema": {
                            "$ref": "#/components/schemas/PetPage"
                        }}}}}
                    },
                    "post": {
                        "operationId": "pet_create",
                        "requestBody": {"content": {"application/json": {"schema": {
                            "$ref": "#/components/schemas/Pet"
                        }}}},
                        "responses": {"201": {"description": "created"}}
                    }
                },
                "/owners": {"get": {
                    "operationId": "owner_list",
                    "responses": {"200": {"content": {"application/json": {"schema": {
                        "type": "array", "items": {"$ref": "#/components/schemas/Owner"}
                    }}}}}
                }}
            },
            "components": {
                "schemas": {
                    "Pet": {"type": "object", "properties": {
                        "owner": {"$ref": "#/components/schemas/Owner"},
                        "id": {"$ref": "#/components/schemas/Id"}
                    }},
                    "Owner": {"type": "object", "properties": {"id": {"$ref": "#/components/schemas/Id"}}},
                    "Id": {"type": "integer"},
                    "PetPage": {"type": "object", "properties": {
                        "items": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
                    }},
                    "Orphan": {"type": "string"}
                },
                "parameters": {
                    "Tenant": {"name": "tenant", "in": "header", "schema": {"$ref": "#/components/schemas/Id"}}
                }
            }
        }))
    }

    #[test]
    fn test_uses_is_transitive() {
        let graph = ReferenceGraph::build(&petstore());
        assert_eq!(graph.references("schemas/PetPage"), Some(&set(&["schemas/Pet"])));
        assert_eq!(
            graph.uses("schemas/PetPage"),
            set(&["schemas/Id", "schemas/Owner", "schemas/Pet"])
        );
        assert!(graph.uses("schemas/Id").is_empty());
        assert!(graph.uses("schemas/Nope").is_empty());
    }

    #[test]
    fn test_used_by_is_transitive() {
        let graph = ReferenceGraph::build(&petstore());
        assert_eq!(
            graph.used_by("schemas/Owner"),
            set(&["schemas/Pet", "schemas/PetPage"])
        );
        assert_eq!(
            graph.used_by("schemas/Id"),
            set(&["parameters/Tenant", "schemas/Owner", "schemas/Pet", "schemas/PetPage"])
        );
        assert!(graph.used_by("schemas/Orphan").is_empty());
    }

    #[test]
    fn test_operations_using_follows_users_and_path_parameters() {
        let graph = ReferenceGraph::build(&petstore());
        assert_eq!(
            graph.operations_using("schemas/Owner"),
            vec!["pet_list", "pet_create", "owner_list"]
        );
        assert_eq!(
            graph.operations_using("parameters/Tenant"),
            vec!["pet_list", "pet_create"]
        );
        assert!(graph.operations_using("schemas/Orphan").is_empty());
    }

    #[test]
    fn test_operation_models() {
        let graph = ReferenceGraph::build(&petstore());
        assert_eq!(
            graph.operation_models("owner_list"),
            Some(set(&["schemas/Id", "schemas/Owner"]))
        );
        assert_eq!(
            graph.operation_models("pet_create"),
            Some(set(&["parameters/Tenant", "schemas/Id", "schemas/Owner", "schemas/Pet"]))
        );
        assert_eq!(graph.operation_models("missing"), None);
    }

    #[test]
    fn test_unreachable_components() {
        let graph = ReferenceGraph::build(&petstore());
        assert_eq!(graph.unreachable(), vec!["schemas/Orphan"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let doc = Document::new(json!({"components": {"schemas": {
            "A": {"properties": {"b": {"$ref": "#/components/schemas/B"}}},
            "B": {"properties": {"a": {"$ref": "#/components/schemas/A"}}}
        }}}));
        let graph = ReferenceGraph::build(&doc);
        assert_eq!(graph.uses("schemas/A"), set(&["schemas/A", "schemas/B"]));
        assert_eq!(graph.used_by("schemas/A"), set(&["schemas/A", "schemas/B"]));
    }

    #[test]
    fn test_full_name_needs_unique_match() {
        let doc = Document::new(json!({"components": {
            "schemas": {"Pet": {}, "Error": {}},
            "responses": {"Error": {}}
        }}));
        let graph = ReferenceGraph::build(&doc);
        assert_eq!(graph.full_name("Pet"), Some("schemas/Pet"));
        assert_eq!(graph.full_name("responses/Error"), Some("responses/Error"));
        assert_eq!(graph.full_name("Error"), None);
        assert_eq!(graph.full_name("Ghost"), None);
    }

    #[test]
    fn test_external_and_non_component_refs_are_ignored() {
        let found = find_references(&json!({
            "a": {"$ref": "other.yaml#/components/schemas/Pet"},
            "b": [{"$ref": "#/paths/~1pets"}, {"$ref": "#/components/schemas/Pet/properties/id"}],
            "c": {"$ref": 7}
        }));
        assert_eq!(found, set(&["schemas/Pet"]));
    }
}
