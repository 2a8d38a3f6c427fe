//! Composition of `allOf` / `oneOf` / `anyOf` shapes.
//!
//! [`compose`] turns an ordered list of shapes into one [`ResolvedSchema`]:
//! `allOf` branches merge into a single object, `oneOf`/`anyOf` become a
//! [`SchemaKind::Union`] whose alternatives are never merged. How a repeated
//! property or deprecation marker is merged is decided by a [`MergePolicy`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use oas_toolkit_core::*;
//!
//! let mut base = ObjectShape::default();
//! base.properties.push(PropertySpec::new("id", ValueType::Integer));
//! base.required.insert("id".into());
//!
//! let mut extra = ObjectShape::default();
//! extra.properties.push(PropertySpec::new("name", ValueType::String));
//!
//! let merged = compose(
//!     Composition::AllOf,
//!     vec![
//!         SchemaLink::Inline(Rc::new(ResolvedSchema::new(SchemaKind::Object(base)))),
//!         SchemaLink::Inline(Rc::new(ResolvedSchema::new(SchemaKind::Object(extra)))),
//!     ],
//!     &LastWriteWins,
//! );
//! let shape = merged.as_object().unwrap();
//! assert_eq!(shape.names(), vec!["id", "name"]);
//! assert!(shape.property("id").unwrap().required);
//! ```

use tracing::debug;

use crate::document::short_ref;
use crate::schema::{
    Composition, Deprecation, ObjectShape, PropertySpec, ResolvedSchema, SchemaKind, SchemaLink,
    SchemaMeta,
};

/// Strategy deciding how `allOf` branches combine.
///
/// The resolver takes any policy; [`LastWriteWins`] is the default.
pub trait MergePolicy {
    /// Combines a property already in the accumulator with a later
    /// definition of the same name.
    fn merge_property(&self, existing: &PropertySpec, incoming: PropertySpec) -> PropertySpec;

    /// Combines deprecation markers found on different branches.
    fn merge_deprecation(&self, current: Deprecation, incoming: Deprecation) -> Deprecation {
        current.most_specific(incoming)
    }
}

/// A later branch's property definition replaces an earlier one.
///
/// The replaced property keeps the position of its first declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastWriteWins;

impl MergePolicy for LastWriteWins {
    fn merge_property(&self, _existing: &PropertySpec, incoming: PropertySpec) -> PropertySpec {
        incoming
    }
}

/// Composes an ordered list of shapes.
///
/// For [`Composition::AllOf`] every shape should already be resolved
/// ([`SchemaLink::Inline`]); a remaining [`SchemaLink::Ref`] cannot be merged
/// and is listed in [`ObjectShape::unresolved`].
pub fn compose(
    composition: Composition,
    shapes: Vec<SchemaLink>,
    policy: &dyn MergePolicy,
) -> ResolvedSchema {
    match composition {
        Composition::AllOf => merge_all_of(shapes, policy),
        Composition::OneOf | Composition::AnyOf => ResolvedSchema::new(SchemaKind::Union {
            composition,
            alternatives: shapes,
        }),
    }
}

fn merge_all_of(shapes: Vec<SchemaLink>, policy: &dyn MergePolicy) -> ResolvedSchema {
    if let [SchemaLink::Inline(single)] = shapes.as_slice() {
        return ResolvedSchema::clone(single);
    }

    let mut merged = ObjectShape::default();
    let mut meta = SchemaMeta::default();
    let mut objects = 0usize;
    let mut fallback: Option<ResolvedSchema> = None;

    for shape in shapes {
        let branch = match shape {
            SchemaLink::Inline(branch) => branch,
            SchemaLink::Ref(reference) => {
                merged.unresolved.push(reference);
                continue;
            }
        };

        meta.deprecation = policy.merge_deprecation(
            std::mem::take(&mut meta.deprecation),
            branch.meta.deprecation.clone(),
        );
        if branch.meta.description.is_some() {
            meta.description = branch.meta.description.clone();
        }
        meta.extensions.extend(branch.meta.extensions.clone());

        match &branch.kind {
            SchemaKind::Object(shape) => {
                objects += 1;
                let origin = branch.meta.reference.as_deref().map(short_ref);
                for property in &shape.properties {
                    let mut property = property.clone();
                    if property.origin.is_none() {
                        property.origin = origin.map(str::to_string);
                    }
                    insert_property(&mut merged, property, policy);
                }
                merged.required.extend(shape.required.iter().cloned());
                merged.unresolved.extend(shape.unresolved.iter().cloned());
            }
            SchemaKind::Missing(missing) => {
                merged.unresolved.push(missing.reference.clone());
                fallback = Some(ResolvedSchema::clone(&branch));
            }
            SchemaKind::Cyclic(cyclic) => {
                merged.unresolved.push(cyclic.reference.clone());
                fallback = Some(ResolvedSchema::clone(&branch));
            }
            _ if branch.is_untyped() => {}
            _ => fallback = Some(ResolvedSchema::clone(&branch)),
        }
    }

    if objects == 0 {
        return match fallback {
            Some(schema) => {
                let own = schema.meta.clone();
                schema.with_meta(meta.overlay(own))
            }
            None => ResolvedSchema::any().with_meta(meta),
        };
    }
    if fallback.is_some() {
        debug!("allOf mixes object and non-object branches; keeping the object merge");
    }

    merged.sync_required();
    ResolvedSchema::new(SchemaKind::Object(merged)).with_meta(meta)
}

fn insert_property(shape: &mut ObjectShape, incoming: PropertySpec, policy: &dyn MergePolicy) {
    match shape.properties.iter().position(|p| p.name == incoming.name) {
        Some(index) => {
            let merged = policy.merge_property(&shape.properties[index], incoming);
            shape.properties[index] = merged;
        }
        None => shape.properties.push(incoming),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::schema::ValueType;

    use super::*;

    fn object(reference: Option<&str>, props: &[(&str, ValueType)], required: &[&str]) -> SchemaLink {
        let mut shape = ObjectShape::default();
        for (name, value_type) in props {
            shape.properties.push(PropertySpec::new(name, *value_type));
        }
        shape.required = required.iter().map(|r| r.to_string()).collect();
        shape.sync_required();
        let mut schema = ResolvedSchema::new(SchemaKind::Object(shape));
        schema.meta.reference = reference.map(String::from);
        SchemaLink::Inline(Rc::new(schema))
    }

    #[test]
    fn test_all_of_disjoint_branches_sum_property_counts() {
        let merged = compose(
            Composition::AllOf,
            vec![
                object(None, &[("a", ValueType::String), ("b", ValueType::String)], &[]),
                object(None, &[("c", ValueType::Integer)], &[]),
                object(None, &[("d", ValueType::Boolean), ("e", ValueType::Number)], &[]),
            ],
            &LastWriteWins,
        );
        assert_eq!(merged.as_object().unwrap().properties.len(), 5);
    }

    #[test]
    fn test_all_of_later_branch_wins_in_first_position() {
        let merged = compose(
            Composition::AllOf,
            vec![
                object(None, &[("id", ValueType::String), ("name", ValueType::String)], &[]),
                object(None, &[("id", ValueType::Integer)], &[]),
            ],
            &LastWriteWins,
        );
        let shape = merged.as_object().unwrap();
        assert_eq!(shape.names(), vec!["id", "name"]);
        assert_eq!(shape.property("id").unwrap().value_type, ValueType::Integer);
    }

    #[test]
    fn test_all_of_required_union_is_order_independent() {
        let a = object(None, &[("x", ValueType::String)], &["x"]);
        let b = object(None, &[("y", ValueType::String)], &["y"]);
        let forward = compose(Composition::AllOf, vec![a.clone(), b.clone()], &LastWriteWins);
        let backward = compose(Composition::AllOf, vec![b, a], &LastWriteWins);
        assert_eq!(
            forward.as_object().unwrap().required,
            backward.as_object().unwrap().required
        );
        assert!(forward.as_object().unwrap().property("y").unwrap().required);
    }

    #[test]
    fn test_all_of_records_origin_of_referenced_branch() {
        let merged = compose(
            Composition::AllOf,
            vec![
                object(Some("#/components/schemas/Base"), &[("id", ValueType::Integer)], &[]),
                object(None, &[("extra", ValueType::String)], &[]),
            ],
            &LastWriteWins,
        );
        let shape = merged.as_object().unwrap();
        assert_eq!(shape.property("id").unwrap().origin.as_deref(), Some("Base"));
        assert_eq!(shape.property("extra").unwrap().origin, None);
    }

    #[test]
    fn test_all_of_propagates_most_specific_deprecation() {
        let mut stamped = ResolvedSchema::new(SchemaKind::Object(ObjectShape::default()));
        stamped.meta.deprecation = Deprecation::Since(crate::DeprecatedSince::Version("2".into()));
        let mut flagged = ResolvedSchema::new(SchemaKind::Object(ObjectShape::default()));
        flagged.meta.deprecation = Deprecation::Deprecated;

        let merged = compose(
            Composition::AllOf,
            vec![
                SchemaLink::Inline(Rc::new(stamped)),
                SchemaLink::Inline(Rc::new(flagged)),
            ],
            &LastWriteWins,
        );
        assert_eq!(merged.meta.deprecation.since().unwrap().to_string(), "2");
    }

    #[test]
    fn test_all_of_of_placeholder_only_stays_placeholder() {
        let missing = SchemaLink::Inline(Rc::new(ResolvedSchema::missing("#/nope")));
        let mut note = ResolvedSchema::any();
        note.meta.description = Some("described".into());
        let merged = compose(
            Composition::AllOf,
            vec![missing, SchemaLink::Inline(Rc::new(note))],
            &LastWriteWins,
        );
        assert!(merged.is_placeholder());
        assert_eq!(merged.meta.description.as_deref(), Some("described"));
    }

    #[test]
    fn test_one_of_keeps_alternatives_unmerged() {
        let a = object(None, &[("x", ValueType::String)], &[]);
        let b = SchemaLink::Ref("#/components/schemas/B".into());
        let union = compose(Composition::OneOf, vec![a, b], &LastWriteWins);
        match union.kind {
            SchemaKind::Union {
                composition,
                alternatives,
            } => {
                assert_eq!(composition, Composition::OneOf);
                assert_eq!(alternatives.len(), 2);
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    struct FirstWriteWins;

    impl MergePolicy for FirstWriteWins {
        fn merge_property(&self, existing: &PropertySpec, _incoming: PropertySpec) -> PropertySpec {
            existing.clone()
        }
    }

    #[test]
    fn test_injected_policy_controls_override() {
        let merged = compose(
            Composition::AllOf,
            vec![
                object(None, &[("id", ValueType::String)], &[]),
                object(None, &[("id", ValueType::Integer)], &[]),
            ],
            &FirstWriteWins,
        );
        assert_eq!(
            merged.as_object().unwrap().property("id").unwrap().value_type,
            ValueType::String
        );
    }
}
