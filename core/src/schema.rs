//! Resolved schema type definitions.
//!
//! This module defines the normalized shape model produced by the
//! [`Resolver`](crate::Resolver): a [`ResolvedSchema`] is a tagged
//! [`SchemaKind`] plus the [`SchemaMeta`] shared by every kind. Unknown keys
//! from the source document are kept in [`SchemaMeta::extensions`] so nothing
//! is lost when a document uses fields this crate does not model.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type names treated as "null" inside an OAS 3.1 `type` list.
pub const NULL_TYPES: &[&str] = &["null", "\"null\"", "'null'"];

/// Basic value type of a schema or property.
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::ValueType;
///
/// assert_eq!(ValueType::from_type_name("integer"), ValueType::Integer);
/// assert_eq!(ValueType::from_type_name("numeric"), ValueType::Number);
/// assert_eq!(ValueType::from_type_name("mystery"), ValueType::Any);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    Null,
    /// One of several alternatives (`oneOf`/`anyOf`).
    Union,
    /// Untyped or unknown.
    #[default]
    Any,
    /// The schema behind this value could not be resolved.
    Unresolved,
}

impl ValueType {
    /// Maps a JSON-schema `type` name onto a [`ValueType`].
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "number" | "numeric" => Self::Number,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            name if NULL_TYPES.contains(&name) => Self::Null,
            _ => Self::Any,
        }
    }

    /// Infers a type from a literal value (used for untyped enums).
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_f64() => Self::Number,
            Value::Number(_) => Self::Integer,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
            Self::Union => "union",
            Self::Any => "any",
            Self::Unresolved => "unresolved",
        };
        f.write_str(name)
    }
}

/// Reduces a raw `type` field (string or OAS 3.1 list) to one type plus a
/// nullable flag.
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::{ValueType, simplify_type};
/// use serde_json::json;
///
/// assert_eq!(simplify_type(&json!("string")), (ValueType::String, false));
/// assert_eq!(simplify_type(&json!(["null", "integer"])), (ValueType::Integer, true));
/// ```
pub fn simplify_type(raw: &Value) -> (ValueType, bool) {
    match raw {
        Value::String(name) => {
            let value_type = ValueType::from_type_name(name);
            (value_type, value_type == ValueType::Null)
        }
        Value::Array(names) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.iter().any(|n| NULL_TYPES.contains(n));
            let value_type = names
                .iter()
                .find(|n| !NULL_TYPES.contains(n))
                .map(|n| ValueType::from_type_name(n))
                .unwrap_or(if nullable {
                    ValueType::Null
                } else {
                    ValueType::Any
                });
            (value_type, nullable)
        }
        _ => (ValueType::Any, false),
    }
}

/// When a deprecation took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeprecatedSince {
    Date(NaiveDate),
    Version(String),
}

impl DeprecatedSince {
    /// Parses a stamp: ISO dates become [`Date`](Self::Date), anything else
    /// is kept verbatim as a version.
    pub fn parse(stamp: &str) -> Self {
        match NaiveDate::parse_from_str(stamp.trim(), "%Y-%m-%d") {
            Ok(date) => Self::Date(date),
            Err(_) => Self::Version(stamp.trim().to_string()),
        }
    }
}

impl fmt::Display for DeprecatedSince {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{date}"),
            Self::Version(version) => f.write_str(version),
        }
    }
}

/// Normalized deprecation marker.
///
/// Documents mark deprecation either with a boolean (`deprecated: true`) or
/// with a stamp (`x-deprecated: 2024-06-01`, `x-deprecated: v2.3`). Both
/// normalize to "deprecated, optionally since version-or-date".
///
/// # Examples
///
/// ```
/// use oas_toolkit_core::Deprecation;
/// use serde_json::json;
///
/// let flag = Deprecation::from_fields(Some(&json!(true)), None);
/// assert!(flag.is_deprecated());
/// assert!(flag.since().is_none());
///
/// let stamped = Deprecation::from_fields(None, Some(&json!("2024-06-01")));
/// assert_eq!(stamped.since().unwrap().to_string(), "2024-06-01");
///
/// // the stamped marker is more specific than the bare flag
/// assert_eq!(flag.most_specific(stamped.clone()), stamped);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state", content = "since")]
pub enum Deprecation {
    #[default]
    Active,
    Deprecated,
    Since(DeprecatedSince),
}

impl Deprecation {
    /// Builds a marker from the `deprecated` and `x-deprecated` fields of a node.
    ///
    /// A stamped `x-deprecated` takes precedence over the boolean flag.
    pub fn from_fields(deprecated: Option<&Value>, x_deprecated: Option<&Value>) -> Self {
        let stamped = x_deprecated.map(Self::from_value).unwrap_or_default();
        let flagged = deprecated.map(Self::from_value).unwrap_or_default();
        flagged.most_specific(stamped)
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::Deprecated,
            Value::String(stamp) if !stamp.trim().is_empty() => {
                Self::Since(DeprecatedSince::parse(stamp))
            }
            Value::Number(number) => Self::Since(DeprecatedSince::Version(number.to_string())),
            _ => Self::Active,
        }
    }

    /// Returns `true` unless the marker is [`Active`](Self::Active).
    pub fn is_deprecated(&self) -> bool {
        !self.is_active()
    }

    /// Returns `true` when not deprecated.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns the version or date stamp, if any.
    pub fn since(&self) -> Option<&DeprecatedSince> {
        match self {
            Self::Since(since) => Some(since),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Deprecated => 1,
            Self::Since(_) => 2,
        }
    }

    /// Keeps the more specific of two markers. Ties go to `other`.
    pub fn most_specific(self, other: Deprecation) -> Deprecation {
        if other.rank() >= self.rank() { other } else { self }
    }
}

/// Composition construct combining several shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    AllOf,
    OneOf,
    AnyOf,
}

impl Composition {
    /// The document keyword for this composition (`allOf`, ...).
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::AllOf => "allOf",
            Self::OneOf => "oneOf",
            Self::AnyOf => "anyOf",
        }
    }
}

/// Metadata common to every schema kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Deprecation::is_active")]
    pub deprecation: Deprecation,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    /// Reference this schema was resolved from (`#/components/schemas/Pet`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Keys the resolver does not model, preserved verbatim.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl SchemaMeta {
    /// Layers `top` over `self`: fields set on `top` win, flags accumulate.
    pub fn overlay(self, top: SchemaMeta) -> SchemaMeta {
        let mut extensions = self.extensions;
        extensions.extend(top.extensions);
        SchemaMeta {
            title: top.title.or(self.title),
            description: top.description.or(self.description),
            default: top.default.or(self.default),
            deprecation: self.deprecation.most_specific(top.deprecation),
            nullable: self.nullable || top.nullable,
            read_only: self.read_only || top.read_only,
            reference: top.reference.or(self.reference),
            extensions,
        }
    }
}

/// Placeholder for a reference whose target does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingReference {
    pub reference: String,
}

/// Placeholder for a reference that points back into its own resolution chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CyclicReference {
    pub reference: String,
    /// Chain of references ending with the repeated one.
    pub chain: Vec<String>,
}

/// A nested schema position: either a lazy reference or an inline shape.
///
/// Property schemas, array items and union alternatives hold links so that
/// self-referential shapes do not have to be expanded while resolving.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaLink {
    Ref(String),
    Inline(Rc<ResolvedSchema>),
}

impl SchemaLink {
    /// Reference string identifying the linked shape, if it has one.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Ref(reference) => Some(reference),
            Self::Inline(schema) => schema.meta.reference.as_deref(),
        }
    }
}

/// Merged or declared object shape.
///
/// Properties keep declaration order and unique names. `required` is a set,
/// so merging is independent of branch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectShape {
    pub properties: Vec<PropertySpec>,
    pub required: BTreeSet<String>,
    /// All-of branches that could not be merged (missing or cyclic).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

impl ObjectShape {
    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Property names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// Re-derives every property's `required` flag from the required set.
    pub fn sync_required(&mut self) {
        for property in &mut self.properties {
            property.required = self.required.contains(&property.name);
        }
    }
}

/// Tagged shape of a resolved schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaKind {
    Primitive {
        value_type: ValueType,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Array {
        items: Option<SchemaLink>,
    },
    Object(ObjectShape),
    Enum {
        value_type: ValueType,
        values: Vec<Value>,
    },
    Union {
        composition: Composition,
        alternatives: Vec<SchemaLink>,
    },
    Missing(MissingReference),
    Cyclic(CyclicReference),
}

/// A fully normalized schema node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSchema {
    pub kind: SchemaKind,
    pub meta: SchemaMeta,
}

impl ResolvedSchema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            meta: SchemaMeta::default(),
        }
    }

    /// An untyped schema that accepts anything.
    pub fn any() -> Self {
        Self::new(SchemaKind::Primitive {
            value_type: ValueType::Any,
            format: None,
        })
    }

    pub fn missing(reference: &str) -> Self {
        Self::new(SchemaKind::Missing(MissingReference {
            reference: reference.to_string(),
        }))
    }

    pub fn cyclic(reference: &str, chain: Vec<String>) -> Self {
        Self::new(SchemaKind::Cyclic(CyclicReference {
            reference: reference.to_string(),
            chain,
        }))
    }

    pub fn with_meta(mut self, meta: SchemaMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Returns the object shape, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectShape> {
        match &self.kind {
            SchemaKind::Object(shape) => Some(shape),
            _ => None,
        }
    }

    /// `true` for missing and cyclic placeholders.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, SchemaKind::Missing(_) | SchemaKind::Cyclic(_))
    }

    /// `true` for an untyped primitive with no format.
    pub fn is_untyped(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Primitive {
                value_type: ValueType::Any,
                format: None
            }
        )
    }

    pub fn value_type(&self) -> ValueType {
        match &self.kind {
            SchemaKind::Primitive { value_type, .. } | SchemaKind::Enum { value_type, .. } => {
                *value_type
            }
            SchemaKind::Array { .. } => ValueType::Array,
            SchemaKind::Object(_) => ValueType::Object,
            SchemaKind::Union { .. } => ValueType::Union,
            SchemaKind::Missing(_) | SchemaKind::Cyclic(_) => ValueType::Unresolved,
        }
    }

    pub fn format(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Primitive { format, .. } => format.as_deref(),
            _ => None,
        }
    }

    pub fn enum_values(&self) -> &[Value] {
        match &self.kind {
            SchemaKind::Enum { values, .. } => values,
            _ => &[],
        }
    }
}

/// One property of an object, or one leaf of a flattened shape.
///
/// Inside an [`ObjectShape`] the `name` is the plain property name. In the
/// output of [`flatten`](crate::flatten) the `name` is dotted through its
/// parents (`owner.address.city`) while `field` stays the leaf name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySpec {
    pub name: String,
    pub field: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip)]
    pub schema: Option<SchemaLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Deprecation::is_active")]
    pub deprecation: Deprecation,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    /// Array of scalar items; item type and enum are lifted into this leaf.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub collection: bool,
    /// Descent stopped here because the shape refers back to an ancestor.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub recursive: bool,
    /// Short name of the schema that declared this property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl PropertySpec {
    /// Creates a property with only a name and type set.
    ///
    /// # Examples
    ///
    /// ```
    /// use oas_toolkit_core::{PropertySpec, ValueType};
    ///
    /// let prop = PropertySpec::new("name", ValueType::String);
    /// assert_eq!(prop.field, "name");
    /// assert!(!prop.required);
    /// ```
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            field: name.to_string(),
            parents: Vec::new(),
            value_type,
            format: None,
            schema: None,
            description: None,
            default: None,
            enum_values: Vec::new(),
            required: false,
            deprecation: Deprecation::Active,
            nullable: false,
            read_only: false,
            collection: false,
            recursive: false,
            origin: None,
        }
    }

    /// Full origin path: declaring schema, parents and field (`Pet.owner.name`).
    pub fn origin_path(&self) -> String {
        self.origin
            .iter()
            .chain(self.parents.iter())
            .chain(std::iter::once(&self.field))
            .cloned()
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_simplify_type_prefers_first_non_null() {
        assert_eq!(
            simplify_type(&json!(["string", "integer", "null"])),
            (ValueType::String, true)
        );
        assert_eq!(simplify_type(&json!(["null"])), (ValueType::Null, true));
        assert_eq!(simplify_type(&json!(42)), (ValueType::Any, false));
    }

    #[test]
    fn test_deprecation_stamp_parses_dates_and_versions() {
        let dated = Deprecation::from_fields(None, Some(&json!("2023-11-30")));
        assert_eq!(
            dated.since(),
            Some(&DeprecatedSince::Date(
                NaiveDate::from_ymd_opt(2023, 11, 30).unwrap()
            ))
        );

        let versioned = Deprecation::from_fields(Some(&json!(true)), Some(&json!("v2.1")));
        assert_eq!(
            versioned.since(),
            Some(&DeprecatedSince::Version("v2.1".to_string()))
        );

        assert!(Deprecation::from_fields(Some(&json!(false)), None).is_active());
    }

    #[test]
    fn test_most_specific_keeps_stamp_over_flag() {
        let stamped = Deprecation::Since(DeprecatedSince::Version("3".into()));
        assert_eq!(
            stamped.clone().most_specific(Deprecation::Deprecated),
            stamped
        );
        assert_eq!(
            Deprecation::Active.most_specific(Deprecation::Deprecated),
            Deprecation::Deprecated
        );
    }

    #[test]
    fn test_origin_path_joins_segments() {
        let mut prop = PropertySpec::new("owner.name", ValueType::String);
        prop.field = "name".into();
        prop.parents = vec!["owner".into()];
        prop.origin = Some("Pet".into());
        assert_eq!(prop.origin_path(), "Pet.owner.name");
    }
}
