//! Raw API description documents.
//!
//! A [`Document`] is the whole description as an order-preserving JSON
//! mapping. Nothing is dropped on load, so unknown and vendor keys survive
//! for diffing and for consumers that understand them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of local references to named reusable schemas.
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// An API description document.
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::Document;
/// use serde_json::json;
///
/// let doc = Document::new(json!({
///     "components": {"schemas": {"Pet": {"type": "object"}}}
/// }));
/// assert!(doc.get("#/components/schemas/Pet").is_some());
/// assert!(doc.get("#/components/schemas/Owner").is_none());
/// assert_eq!(doc.schema_names(), vec!["Pet"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Resolves a local reference (`#/a/b`) to its node.
    ///
    /// Segments use JSON-pointer escaping (`~1` for `/`, `~0` for `~`).
    /// References to other files are not followed and return `None`.
    pub fn get(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        if pointer.is_empty() {
            return Some(&self.root);
        }
        self.root.pointer(pointer)
    }

    /// The `paths` mapping, if present.
    pub fn paths(&self) -> Option<&Map<String, Value>> {
        self.root.get("paths").and_then(Value::as_object)
    }

    /// The `components` mapping, if present.
    pub fn components(&self) -> Option<&Map<String, Value>> {
        self.root.get("components").and_then(Value::as_object)
    }

    /// Names of the reusable schemas, in declaration order.
    pub fn schema_names(&self) -> Vec<&str> {
        self.components()
            .and_then(|c| c.get("schemas"))
            .and_then(Value::as_object)
            .map(|schemas| schemas.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Finds the reference for a schema by full or trailing name.
    ///
    /// `name` may be a schema name (`Pet`) or a reference
    /// (`#/components/schemas/Pet`).
    pub fn find_schema(&self, name: &str) -> Option<String> {
        if self.get(name).is_some() && name.starts_with('#') {
            return Some(name.to_string());
        }
        let wanted = short_ref(name);
        self.schema_names()
            .into_iter()
            .find(|candidate| *candidate == wanted)
            .map(schema_ref)
    }
}

impl From<Value> for Document {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

/// Builds the reference for a named reusable schema.
pub fn schema_ref(name: &str) -> String {
    format!("{SCHEMA_REF_PREFIX}{name}")
}

/// Drops everything up to the last `/` of a reference.
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::short_ref;
///
/// assert_eq!(short_ref("#/components/schemas/Pet"), "Pet");
/// assert_eq!(short_ref("Pet"), "Pet");
/// ```
pub fn short_ref(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}
