//! Reference resolution.
//!
//! The [`Resolver`] turns raw schema nodes into [`ResolvedSchema`] values.
//! Results for a reference string are cached for the lifetime of the
//! resolver, so resolving the same reference twice returns the same
//! [`Rc`]. A result that depended on a reference still being resolved
//! further up the chain is not cached, so resolving a reference gives the
//! same shape whatever was resolved before it. A reference that revisits its own resolution chain yields a
//! [`CyclicReference`](crate::CyclicReference) placeholder and a dangling
//! reference yields a [`MissingReference`](crate::MissingReference)
//! placeholder; both are also recorded as [`SchemaProblem`]s so a whole
//! document can be checked in one pass.
//!
//! Property schemas, array items and union alternatives that are references
//! stay lazy ([`SchemaLink::Ref`]), including references carrying only
//! annotation siblings such as `description` or `default`; only `allOf`
//! branches and aliases are followed eagerly, because merging needs their
//! content.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use oas_toolkit_core::*;
//! use serde_json::json;
//!
//! let doc = Document::new(json!({
//!     "components": {"schemas": {
//!         "Pet": {"type": "object", "properties": {"name": {"type": "string"}}},
//!         "Animal": {"$ref": "#/components/schemas/Pet"}
//!     }}
//! }));
//!
//! let mut resolver = Resolver::new(&doc);
//! let pet = resolver.resolve("#/components/schemas/Pet");
//! let again = resolver.resolve("#/components/schemas/Pet");
//! assert!(Rc::ptr_eq(&pet, &again));
//!
//! // a bare reference is an alias for its target
//! let animal = resolver.resolve("#/components/schemas/Animal");
//! assert!(Rc::ptr_eq(&pet, &animal));
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::compose::{LastWriteWins, MergePolicy, compose};
use crate::document::{Document, short_ref};
use crate::schema::{
    Composition, Deprecation, ObjectShape, PropertySpec, ResolvedSchema, SchemaKind, SchemaLink,
    SchemaMeta, ValueType, simplify_type,
};

/// A problem found while resolving a document.
///
/// Problems never stop resolution; the affected node is replaced by a
/// placeholder and processing continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum SchemaProblem {
    /// A reference points at a node that does not exist.
    #[error("missing reference: {reference}")]
    MissingReference { reference: String },
    /// A reference chain revisits a reference already being resolved.
    #[error("cyclic reference: {}", .chain.join(" -> "))]
    CyclicReference { reference: String, chain: Vec<String> },
    /// A node could not be read as a schema.
    #[error("malformed schema at {location}: {reason}")]
    MalformedSchema { location: String, reason: String },
    /// An operation has no `operationId` and was skipped.
    #[error("operation {method} {path} has no operationId")]
    MissingOperationId { method: String, path: String },
    /// Two operations share an `operationId`; the first one is kept.
    #[error("duplicate operationId: {operation_id}")]
    DuplicateOperationId { operation_id: String },
    /// A `{variable}` in a path has no matching path parameter.
    #[error("path variable {{{variable}}} in {path} has no matching parameter")]
    UndeclaredPathVariable { path: String, variable: String },
}

/// Known schema keywords. Everything else lands in `extensions`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(rename = "$ref")]
    reference: Option<String>,
    #[serde(rename = "type")]
    schema_type: Option<Value>,
    format: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    default: Option<Value>,
    #[serde(rename = "enum")]
    enum_values: Option<Vec<Value>>,
    properties: Option<Map<String, Value>>,
    required: Option<Value>,
    items: Option<Value>,
    #[serde(default)]
    all_of: Vec<Value>,
    #[serde(default)]
    one_of: Vec<Value>,
    #[serde(default)]
    any_of: Vec<Value>,
    deprecated: Option<Value>,
    #[serde(rename = "x-deprecated")]
    x_deprecated: Option<Value>,
    nullable: Option<Value>,
    read_only: Option<Value>,
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

impl RawSchema {
    /// A `$ref` with no sibling keys.
    fn is_bare_ref(&self) -> bool {
        self.reference.is_some()
            && self.schema_type.is_none()
            && self.format.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.default.is_none()
            && self.enum_values.is_none()
            && self.properties.is_none()
            && self.required.is_none()
            && self.items.is_none()
            && self.all_of.is_empty()
            && self.one_of.is_empty()
            && self.any_of.is_empty()
            && self.deprecated.is_none()
            && self.x_deprecated.is_none()
            && self.nullable.is_none()
            && self.read_only.is_none()
            && self.extensions.is_empty()
    }

    fn required_names(&self) -> BTreeSet<String> {
        match &self.required {
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    fn has_own_object_shape(&self) -> bool {
        self.properties.is_some() || matches!(&self.required, Some(Value::Array(r)) if !r.is_empty())
    }

    fn meta(&self, reference: Option<&str>) -> SchemaMeta {
        let (_, nullable_type) = self
            .schema_type
            .as_ref()
            .map(simplify_type)
            .unwrap_or((ValueType::Any, false));
        SchemaMeta {
            title: self.title.clone(),
            description: self.description.clone(),
            default: self.default.clone(),
            deprecation: Deprecation::from_fields(
                self.deprecated.as_ref(),
                self.x_deprecated.as_ref(),
            ),
            nullable: nullable_type || flag(self.nullable.as_ref()),
            read_only: flag(self.read_only.as_ref()),
            reference: reference.map(str::to_string),
            extensions: self.extensions.clone(),
        }
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn bare_ref(raw: &Value) -> Option<&str> {
    let map = raw.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get("$ref").and_then(Value::as_str)
}

/// Sibling keys that annotate a `$ref` without changing its shape.
const ANNOTATION_KEYS: &[&str] = &[
    "description",
    "title",
    "default",
    "deprecated",
    "nullable",
    "readOnly",
    "example",
    "examples",
];

/// A `$ref` whose siblings are all annotations (or `x-` extensions).
fn annotated_ref(raw: &Value) -> Option<&str> {
    let map = raw.as_object()?;
    let target = map.get("$ref")?.as_str()?;
    map.keys()
        .filter(|key| key.as_str() != "$ref")
        .all(|key| ANNOTATION_KEYS.contains(&key.as_str()) || key.starts_with("x-"))
        .then_some(target)
}

/// A cached result and every reference consulted while building it.
#[derive(Clone)]
struct Cached {
    schema: Rc<ResolvedSchema>,
    reach: Rc<BTreeSet<String>>,
}

impl Cached {
    fn depends_on(&self, chain: &[String]) -> bool {
        chain.iter().any(|r| self.reach.contains(r))
    }
}

/// Resolves schema references within one document.
///
/// The resolver owns the per-run cache; drop it to discard the cache.
pub struct Resolver<'a> {
    document: &'a Document,
    cache: HashMap<String, Cached>,
    policy: Rc<dyn MergePolicy>,
    problems: Vec<SchemaProblem>,
    // references visited by the current top-level call
    touched: Vec<String>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver using the [`LastWriteWins`] merge policy.
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            cache: HashMap::new(),
            policy: Rc::new(LastWriteWins),
            problems: Vec::new(),
            touched: Vec::new(),
        }
    }

    /// Replaces the `allOf` merge policy.
    pub fn with_policy(mut self, policy: impl MergePolicy + 'static) -> Self {
        self.policy = Rc::new(policy);
        self
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Problems recorded so far, in discovery order, without duplicates.
    pub fn problems(&self) -> &[SchemaProblem] {
        &self.problems
    }

    pub fn into_problems(self) -> Vec<SchemaProblem> {
        self.problems
    }

    /// Number of cached references.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolves a reference string such as `#/components/schemas/Pet`.
    pub fn resolve(&mut self, reference: &str) -> Rc<ResolvedSchema> {
        self.touched.clear();
        let mut chain = Vec::new();
        self.resolve_in(reference, &mut chain)
    }

    /// Resolves an inline schema node (e.g. a request body schema).
    pub fn resolve_value(&mut self, raw: &Value) -> Rc<ResolvedSchema> {
        self.touched.clear();
        let mut chain = Vec::new();
        self.build(raw, &mut chain, None)
    }

    /// Follows a link to its resolved schema.
    pub fn resolve_link(&mut self, link: &SchemaLink) -> Rc<ResolvedSchema> {
        match link {
            SchemaLink::Ref(reference) => self.resolve(reference),
            SchemaLink::Inline(schema) => Rc::clone(schema),
        }
    }

    fn record(&mut self, problem: SchemaProblem) {
        if !self.problems.contains(&problem) {
            self.problems.push(problem);
        }
    }

    fn resolve_in(&mut self, reference: &str, chain: &mut Vec<String>) -> Rc<ResolvedSchema> {
        let start = self.touched.len();
        self.touched.push(reference.to_string());

        if chain.iter().any(|r| r == reference) {
            let mut cycle = chain.clone();
            cycle.push(reference.to_string());
            warn!(reference, chain = %cycle.join(" -> "), "cyclic schema reference");
            self.record(SchemaProblem::CyclicReference {
                reference: reference.to_string(),
                chain: cycle.clone(),
            });
            return Rc::new(ResolvedSchema::cyclic(reference, cycle));
        }

        if let Some(hit) = self.cache.get(reference).cloned() {
            if !hit.depends_on(chain) {
                self.touched.extend(hit.reach.iter().cloned());
                return hit.schema;
            }
            debug!(reference, "cached result depends on the current chain, rebuilding");
        }

        let document = self.document;
        let Some(raw) = document.get(reference) else {
            warn!(reference, "missing schema reference");
            self.record(SchemaProblem::MissingReference {
                reference: reference.to_string(),
            });
            let placeholder = Rc::new(ResolvedSchema::missing(reference));
            let reach = BTreeSet::from([reference.to_string()]);
            self.cache.insert(
                reference.to_string(),
                Cached {
                    schema: Rc::clone(&placeholder),
                    reach: Rc::new(reach),
                },
            );
            return placeholder;
        };

        chain.push(reference.to_string());
        let resolved = self.build(raw, chain, Some(reference));
        chain.pop();

        let entry = Cached {
            schema: Rc::clone(&resolved),
            reach: Rc::new(self.touched[start..].iter().cloned().collect()),
        };
        if entry.depends_on(chain) {
            debug!(reference, "not caching a result built inside a cycle");
        } else {
            self.cache.insert(reference.to_string(), entry);
        }
        resolved
    }

    fn build(
        &mut self,
        raw: &Value,
        chain: &mut Vec<String>,
        reference: Option<&str>,
    ) -> Rc<ResolvedSchema> {
        let untyped = SchemaMeta {
            reference: reference.map(str::to_string),
            ..Default::default()
        };
        if !raw.is_object() {
            // boolean schemas and other non-mapping nodes accept anything
            return Rc::new(ResolvedSchema::any().with_meta(untyped));
        }

        let parsed = match RawSchema::deserialize(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                let location = reference.unwrap_or("<inline>").to_string();
                warn!(%location, error = %err, "malformed schema node");
                self.record(SchemaProblem::MalformedSchema {
                    location,
                    reason: err.to_string(),
                });
                return Rc::new(ResolvedSchema::any().with_meta(untyped));
            }
        };

        if parsed.is_bare_ref() {
            if let Some(target) = &parsed.reference {
                return self.resolve_in(target, chain);
            }
        }

        let meta = parsed.meta(reference);
        let policy = Rc::clone(&self.policy);

        let resolved = if parsed.reference.is_some() || !parsed.all_of.is_empty() {
            let mut branches = Vec::new();
            if let Some(target) = &parsed.reference {
                branches.push(SchemaLink::Inline(self.resolve_in(target, chain)));
            }
            for branch in &parsed.all_of {
                branches.push(SchemaLink::Inline(self.resolve_branch(branch, chain)));
            }
            if parsed.has_own_object_shape() {
                let own = self.object_shape(&parsed, reference, chain);
                branches.push(SchemaLink::Inline(Rc::new(ResolvedSchema::new(
                    SchemaKind::Object(own),
                ))));
            }
            if !parsed.one_of.is_empty() || !parsed.any_of.is_empty() {
                debug!(
                    location = reference.unwrap_or("<inline>"),
                    "ignoring oneOf/anyOf next to allOf"
                );
            }
            let composed = compose(Composition::AllOf, branches, policy.as_ref());
            let composed_meta = composed.meta.clone();
            composed.with_meta(composed_meta.overlay(meta))
        } else if !parsed.one_of.is_empty() {
            let alternatives = self.links(&parsed.one_of, chain);
            compose(Composition::OneOf, alternatives, policy.as_ref()).with_meta(meta)
        } else if !parsed.any_of.is_empty() {
            let alternatives = self.links(&parsed.any_of, chain);
            compose(Composition::AnyOf, alternatives, policy.as_ref()).with_meta(meta)
        } else {
            let kind = self.plain_kind(&parsed, reference, chain);
            ResolvedSchema::new(kind).with_meta(meta)
        };

        Rc::new(resolved)
    }

    fn plain_kind(
        &mut self,
        parsed: &RawSchema,
        reference: Option<&str>,
        chain: &mut Vec<String>,
    ) -> SchemaKind {
        let declared = parsed
            .schema_type
            .as_ref()
            .map(|t| simplify_type(t).0)
            .unwrap_or(ValueType::Any);

        if let Some(values) = &parsed.enum_values {
            let value_type = if declared == ValueType::Any {
                values
                    .iter()
                    .find(|v| !v.is_null())
                    .map(ValueType::of_value)
                    .unwrap_or(ValueType::Any)
            } else {
                declared
            };
            return SchemaKind::Enum {
                value_type,
                values: values.clone(),
            };
        }

        if declared == ValueType::Array || parsed.items.is_some() {
            let items = parsed.items.as_ref().map(|raw| self.link(raw, chain));
            return SchemaKind::Array { items };
        }

        if declared == ValueType::Object || parsed.has_own_object_shape() {
            return SchemaKind::Object(self.object_shape(parsed, reference, chain));
        }

        SchemaKind::Primitive {
            value_type: declared,
            format: parsed.format.clone(),
        }
    }

    fn object_shape(
        &mut self,
        parsed: &RawSchema,
        reference: Option<&str>,
        chain: &mut Vec<String>,
    ) -> ObjectShape {
        let required = parsed.required_names();
        let origin = reference.map(|r| short_ref(r).to_string());
        let mut shape = ObjectShape {
            required,
            ..Default::default()
        };

        if let Some(properties) = &parsed.properties {
            for (name, raw) in properties {
                let mut property = self.property(name, raw, chain);
                property.required = shape.required.contains(name);
                property.origin = origin.clone();
                shape.properties.push(property);
            }
        }

        shape
    }

    fn property(&mut self, name: &str, raw: &Value, chain: &mut Vec<String>) -> PropertySpec {
        let annotated = annotated_ref(raw)
            .and_then(|target| RawSchema::deserialize(raw).ok().map(|parsed| (target, parsed)));
        if let Some((target, parsed)) = annotated {
            let meta = parsed.meta(None);
            let mut property = PropertySpec::new(name, self.peek_type(target));
            property.description = meta.description;
            property.default = meta.default;
            property.deprecation = meta.deprecation;
            property.nullable = meta.nullable;
            property.read_only = meta.read_only;
            property.schema = Some(SchemaLink::Ref(target.to_string()));
            return property;
        }

        let link = self.link(raw, chain);
        let mut property = match &link {
            SchemaLink::Inline(schema) => {
                let mut property = PropertySpec::new(name, schema.value_type());
                property.format = schema.format().map(str::to_string);
                property.enum_values = schema.enum_values().to_vec();
                property.description = schema.meta.description.clone();
                property.default = schema.meta.default.clone();
                property.deprecation = schema.meta.deprecation.clone();
                property.nullable = schema.meta.nullable;
                property.read_only = schema.meta.read_only;
                property
            }
            SchemaLink::Ref(target) => PropertySpec::new(name, self.peek_type(target)),
        };
        property.schema = Some(link);
        property
    }

    fn resolve_branch(&mut self, raw: &Value, chain: &mut Vec<String>) -> Rc<ResolvedSchema> {
        match bare_ref(raw) {
            Some(target) => self.resolve_in(target, chain),
            None => self.build(raw, chain, None),
        }
    }

    fn link(&mut self, raw: &Value, chain: &mut Vec<String>) -> SchemaLink {
        match annotated_ref(raw) {
            Some(target) => SchemaLink::Ref(target.to_string()),
            None => SchemaLink::Inline(self.build(raw, chain, None)),
        }
    }

    fn links(&mut self, raws: &[Value], chain: &mut Vec<String>) -> Vec<SchemaLink> {
        raws.iter().map(|raw| self.link(raw, chain)).collect()
    }

    /// Declared type of a referenced node, without resolving it.
    fn peek_type(&self, reference: &str) -> ValueType {
        let mut seen = HashSet::new();
        let mut current = reference;
        loop {
            if !seen.insert(current) {
                return ValueType::Unresolved;
            }
            let Some(raw) = self.document.get(current) else {
                return ValueType::Unresolved;
            };
            match annotated_ref(raw) {
                Some(next) => current = next,
                None => return declared_type(raw),
            }
        }
    }
}

fn declared_type(raw: &Value) -> ValueType {
    if let Some(schema_type) = raw.get("type") {
        return simplify_type(schema_type).0;
    }
    if raw.get("properties").is_some() || raw.get("allOf").is_some() {
        return ValueType::Object;
    }
    if raw.get("oneOf").is_some() || raw.get("anyOf").is_some() {
        return ValueType::Union;
    }
    if raw.get("items").is_some() {
        return ValueType::Array;
    }
    raw.get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.iter().find(|v| !v.is_null()))
        .map(ValueType::of_value)
        .unwrap_or(ValueType::Any)
}
