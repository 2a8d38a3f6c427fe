//! Flattening of resolved shapes into settable properties.
//!
//! [`Flattener::flatten`] walks an object shape depth-first and emits one
//! [`PropertySpec`] per reachable leaf, in document declaration order. Nested
//! objects are descended and their leaves get dotted names
//! (`owner.address.city`). A property whose shape is already on the current
//! descent path is emitted once with `recursive` set instead of being walked
//! again, so self-referential shapes terminate.

use std::rc::Rc;

use tracing::{debug, info};

use crate::document::short_ref;
use crate::resolve::Resolver;
use crate::schema::{ObjectShape, PropertySpec, ResolvedSchema, SchemaKind, SchemaLink, ValueType};

/// Picks which alternative of a root-level union to descend.
///
/// Receives the alternatives in declaration order and returns an index;
/// an out-of-range index is treated as the first alternative.
pub type AlternativeSelector = fn(&[SchemaLink]) -> usize;

/// Default [`AlternativeSelector`]: the first alternative.
pub fn first_alternative(_alternatives: &[SchemaLink]) -> usize {
    0
}

/// Walks resolved shapes into ordered leaf property lists.
///
/// # Example
///
/// ```
/// use oas_toolkit_core::*;
/// use serde_json::json;
///
/// let doc = Document::new(json!({"components": {"schemas": {
///     "Owner": {"type": "object", "required": ["name"],
///               "properties": {"name": {"type": "string"}}},
///     "Pet": {"type": "object", "required": ["owner"], "properties": {
///         "id": {"type": "integer", "readOnly": true},
///         "owner": {"$ref": "#/components/schemas/Owner"},
///         "tags": {"type": "array", "items": {"type": "string"}}
///     }}
/// }}}));
///
/// let mut resolver = Resolver::new(&doc);
/// let leaves = Flattener::default().flatten_ref(&mut resolver, "#/components/schemas/Pet");
/// let names: Vec<_> = leaves.iter().map(|p| p.name.as_str()).collect();
/// assert_eq!(names, vec!["owner.name", "tags"]);
/// assert!(leaves[0].required);
/// assert_eq!(leaves[0].origin.as_deref(), Some("Owner"));
/// assert!(leaves[1].collection);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Flattener {
    selector: AlternativeSelector,
}

impl Default for Flattener {
    fn default() -> Self {
        Self {
            selector: first_alternative,
        }
    }
}

/// Position of the walk: dotted parents, whether every ancestor was
/// required, and the nearest named schema.
struct Scope<'s> {
    parents: &'s [String],
    required: bool,
    origin: Option<&'s str>,
}

impl Flattener {
    pub fn with_selector(selector: AlternativeSelector) -> Self {
        Self { selector }
    }

    /// Flattens the schema behind a reference.
    pub fn flatten_ref(&self, resolver: &mut Resolver<'_>, reference: &str) -> Vec<PropertySpec> {
        let schema = resolver.resolve(reference);
        self.flatten(resolver, &schema)
    }

    /// Flattens a resolved schema into its settable leaf properties.
    ///
    /// Non-object schemas have no properties and yield an empty list.
    pub fn flatten(&self, resolver: &mut Resolver<'_>, schema: &Rc<ResolvedSchema>) -> Vec<PropertySpec> {
        let root = self.select_root(resolver, schema);
        let mut leaves = Vec::new();
        let Some(shape) = root.as_object() else {
            debug!(kind = %root.value_type(), "nothing to flatten");
            return leaves;
        };

        let mut ancestors: Vec<String> = root.meta.reference.iter().cloned().collect();
        let scope = Scope {
            parents: &[],
            required: true,
            origin: root.meta.reference.as_deref().map(short_ref),
        };
        self.walk(resolver, shape, &scope, &mut ancestors, &mut leaves);
        leaves
    }

    fn select_root(&self, resolver: &mut Resolver<'_>, schema: &Rc<ResolvedSchema>) -> Rc<ResolvedSchema> {
        let mut current = Rc::clone(schema);
        let mut seen: Vec<String> = Vec::new();
        while let SchemaKind::Union { alternatives, .. } = &current.kind {
            if alternatives.is_empty() {
                break;
            }
            let mut index = (self.selector)(alternatives);
            if index >= alternatives.len() {
                index = 0;
            }
            let chosen = alternatives[index].clone();
            if let Some(reference) = chosen.reference() {
                if seen.iter().any(|r| r == reference) {
                    break;
                }
                seen.push(reference.to_string());
            }
            info!(
                alternative = index,
                count = alternatives.len(),
                reference = chosen.reference().unwrap_or("<inline>"),
                "descending one alternative of a root union"
            );
            current = resolver.resolve_link(&chosen);
        }
        current
    }

    fn walk(
        &self,
        resolver: &mut Resolver<'_>,
        shape: &ObjectShape,
        scope: &Scope<'_>,
        ancestors: &mut Vec<String>,
        leaves: &mut Vec<PropertySpec>,
    ) {
        for property in &shape.properties {
            if property.read_only {
                debug!(property = %property.name, "skipping read-only property");
                continue;
            }

            let required = scope.required && property.required;
            let link = property.schema.clone();
            let target = match &link {
                Some(SchemaLink::Ref(reference)) if ancestors.iter().any(|a| a == reference) => {
                    let mut leaf = leaf(property, scope, required);
                    leaf.recursive = true;
                    leaves.push(leaf);
                    continue;
                }
                Some(link) => resolver.resolve_link(link),
                None => {
                    leaves.push(leaf(property, scope, required));
                    continue;
                }
            };

            match &target.kind {
                SchemaKind::Object(inner) if !inner.properties.is_empty() => {
                    let identity = target.meta.reference.clone();
                    if let Some(identity) = &identity {
                        if ancestors.iter().any(|a| a == identity) {
                            let mut leaf = leaf(property, scope, required);
                            leaf.recursive = true;
                            leaves.push(leaf);
                            continue;
                        }
                        ancestors.push(identity.clone());
                    }

                    let mut parents = scope.parents.to_vec();
                    parents.push(property.name.clone());
                    let nested = Scope {
                        parents: &parents,
                        required,
                        origin: identity
                            .as_deref()
                            .map(short_ref)
                            .or(property.origin.as_deref())
                            .or(scope.origin),
                    };
                    self.walk(resolver, inner, &nested, ancestors, leaves);

                    if identity.is_some() {
                        ancestors.pop();
                    }
                }
                SchemaKind::Array { items } => {
                    let mut leaf = refined(leaf(property, scope, required), &link, &target);
                    if let Some(items) = items {
                        let item = match items {
                            SchemaLink::Ref(reference) if ancestors.iter().any(|a| a == reference) => None,
                            other => Some(resolver.resolve_link(other)),
                        };
                        if let Some(item) = item {
                            lift_scalar_items(&mut leaf, &item);
                        }
                    }
                    leaves.push(leaf);
                }
                _ => leaves.push(refined(leaf(property, scope, required), &link, &target)),
            }
        }
    }
}

/// Flattens with the default [`Flattener`].
pub fn flatten(resolver: &mut Resolver<'_>, schema: &Rc<ResolvedSchema>) -> Vec<PropertySpec> {
    Flattener::default().flatten(resolver, schema)
}

fn leaf(property: &PropertySpec, scope: &Scope<'_>, required: bool) -> PropertySpec {
    let mut leaf = property.clone();
    leaf.field = property.name.clone();
    leaf.parents = scope.parents.to_vec();
    leaf.name = scope
        .parents
        .iter()
        .chain(std::iter::once(&property.name))
        .cloned()
        .collect::<Vec<_>>()
        .join(".");
    leaf.required = required;
    if leaf.origin.is_none() {
        leaf.origin = scope.origin.map(str::to_string);
    }
    leaf
}

/// Fills a leaf whose schema was a lazy reference from the resolved target.
fn refined(mut leaf: PropertySpec, link: &Option<SchemaLink>, target: &ResolvedSchema) -> PropertySpec {
    if !matches!(link, Some(SchemaLink::Ref(_))) {
        return leaf;
    }
    leaf.value_type = target.value_type();
    leaf.format = target.format().map(str::to_string);
    leaf.enum_values = target.enum_values().to_vec();
    if leaf.description.is_none() {
        leaf.description = target.meta.description.clone();
    }
    if leaf.default.is_none() {
        leaf.default = target.meta.default.clone();
    }
    leaf.deprecation = leaf
        .deprecation
        .clone()
        .most_specific(target.meta.deprecation.clone());
    leaf.nullable |= target.meta.nullable;
    leaf
}

fn lift_scalar_items(leaf: &mut PropertySpec, item: &ResolvedSchema) {
    let scalar = matches!(
        item.kind,
        SchemaKind::Primitive { .. } | SchemaKind::Enum { .. }
    ) && !matches!(item.value_type(), ValueType::Array | ValueType::Object);
    if !scalar {
        return;
    }
    leaf.collection = true;
    leaf.value_type = item.value_type();
    leaf.format = item.format().map(str::to_string);
    leaf.enum_values = item.enum_values().to_vec();
}
