//! The resolved model: operation index plus settable properties.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::compose::{LastWriteWins, MergePolicy};
use crate::document::Document;
use crate::flatten::Flattener;
use crate::operation::{Operation, OperationCatalog, OperationIndex, Parameter};
use crate::resolve::{Resolver, SchemaProblem};
use crate::schema::{PropertySpec, ResolvedSchema, SchemaLink};

/// Settable inputs of one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettableProperties {
    /// One entry per parameter; object-typed parameters expand into
    /// `param.prop` leaves.
    pub parameters: Vec<PropertySpec>,
    /// Flattened request body leaves.
    pub body: Vec<PropertySpec>,
    /// Top-level property names of the success response, when it is an object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_fields: Option<Vec<String>>,
}

impl SettableProperties {
    /// Every settable name: dotted names plus leaf field names.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.parameters
            .iter()
            .chain(self.body.iter())
            .flat_map(|p| [p.name.clone(), p.field.clone()])
            .collect()
    }
}

/// A document resolved once into operations and their settable properties.
///
/// # Example
///
/// ```
/// use oas_toolkit_core::*;
/// use serde_json::json;
///
/// let doc = Document::new(json!({
///     "paths": {"/widgets": {"post": {
///         "operationId": "widget_create",
///         "parameters": [{"name": "dryRun", "in": "query", "schema": {"type": "boolean"}}],
///         "requestBody": {"content": {"application/json": {"schema": {
///             "type": "object",
///             "properties": {"name": {"type": "string"}, "size": {"type": "integer"}}
///         }}}},
///         "responses": {}
///     }}}
/// }));
///
/// let model = ResolvedModel::build(&doc);
/// let names = model.field_names("widget_create").unwrap();
/// assert!(names.contains("dryRun"));
/// assert!(names.contains("size"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResolvedModel {
    index: OperationIndex,
    settable: HashMap<String, SettableProperties>,
    problems: Vec<SchemaProblem>,
}

impl ResolvedModel {
    pub fn build(document: &Document) -> Self {
        Self::build_with(document, LastWriteWins, Flattener::default())
    }

    /// Builds with an injected merge policy and flattener.
    pub fn build_with(
        document: &Document,
        policy: impl MergePolicy + 'static,
        flattener: Flattener,
    ) -> Self {
        let index = OperationIndex::build(document);
        let mut resolver = Resolver::new(document).with_policy(policy);
        let mut settable = HashMap::new();

        for operation in index.iter() {
            let properties = settable_properties(&mut resolver, &flattener, operation);
            settable.insert(operation.id.clone(), properties);
        }
        debug!(
            operations = index.len(),
            schemas = resolver.cached(),
            "resolved model"
        );

        let mut problems = index.problems().to_vec();
        for problem in resolver.into_problems() {
            if !problems.contains(&problem) {
                problems.push(problem);
            }
        }

        Self {
            index,
            settable,
            problems,
        }
    }

    pub fn index(&self) -> &OperationIndex {
        &self.index
    }

    pub fn settable(&self, operation_id: &str) -> Option<&SettableProperties> {
        self.settable.get(operation_id)
    }

    /// Operation-index and resolution problems, without duplicates.
    pub fn problems(&self) -> &[SchemaProblem] {
        &self.problems
    }
}

impl OperationCatalog for ResolvedModel {
    fn operation(&self, id: &str) -> Option<&Operation> {
        self.index.get(id)
    }

    fn field_names(&self, id: &str) -> Option<BTreeSet<String>> {
        self.settable(id).map(SettableProperties::field_names)
    }

    fn response_fields(&self, id: &str) -> Option<Vec<String>> {
        self.settable(id).and_then(|s| s.response_fields.clone())
    }
}

fn settable_properties(
    resolver: &mut Resolver<'_>,
    flattener: &Flattener,
    operation: &Operation,
) -> SettableProperties {
    let mut parameters = Vec::new();
    for parameter in &operation.parameters {
        parameters.extend(parameter_properties(resolver, flattener, parameter));
    }

    let body = match operation.request_body.as_ref().and_then(|b| b.schema.as_ref()) {
        Some(schema) => {
            let resolved = resolver.resolve_value(schema);
            flattener.flatten(resolver, &resolved)
        }
        None => Vec::new(),
    };

    let response_fields = operation
        .success_response()
        .and_then(|r| r.schema.as_ref())
        .and_then(|schema| {
            let resolved = resolver.resolve_value(schema);
            resolved
                .as_object()
                .map(|shape| shape.names().into_iter().map(str::to_string).collect())
        });

    SettableProperties {
        parameters,
        body,
        response_fields,
    }
}

fn parameter_properties(
    resolver: &mut Resolver<'_>,
    flattener: &Flattener,
    parameter: &Parameter,
) -> Vec<PropertySpec> {
    let resolved = match &parameter.schema {
        Some(schema) => resolver.resolve_value(schema),
        None => Rc::new(ResolvedSchema::any()),
    };

    if resolved.as_object().is_some_and(|shape| !shape.properties.is_empty()) {
        return flattener
            .flatten(resolver, &resolved)
            .into_iter()
            .map(|mut leaf| {
                leaf.parents.insert(0, parameter.name.clone());
                leaf.name = format!("{}.{}", parameter.name, leaf.name);
                leaf.required &= parameter.required;
                leaf
            })
            .collect();
    }

    let mut property = PropertySpec::new(&parameter.name, resolved.value_type());
    property.format = resolved.format().map(str::to_string);
    property.enum_values = resolved.enum_values().to_vec();
    property.description = parameter
        .description
        .clone()
        .or_else(|| resolved.meta.description.clone());
    property.default = resolved.meta.default.clone();
    property.deprecation = parameter
        .deprecation
        .clone()
        .most_specific(resolved.meta.deprecation.clone());
    property.nullable = resolved.meta.nullable;
    property.required = parameter.required;
    property.schema = Some(SchemaLink::Inline(resolved));
    vec![property]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::ValueType;

    fn document() -> Document {
        Document::new(json!({
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "pet_list",
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 20}},
                            {"name": "filter", "in": "query", "required": true,
                             "schema": {"$ref": "#/components/schemas/Filter"}}
                        ],
                        "responses": {"200": {"content": {"application/json": {"schema": {
                            "type": "object",
                            "properties": {"items": {"type": "array"}, "next": {"type": "string"}}
                        }}}}}
                    },
                    "post": {
                        "operationId": "pet_create",
                        "requestBody": {"content": {"application/json": {"schema": {
                            "$ref": "#/components/schemas/Pet"
                        }}}},
                        "responses": {"201": {"content": {"application/json": {"schema": {
                            "$ref": "#/components/schemas/Missing"
                        }}}}}
                    }
                }
            },
            "components": {"schemas": {
                "Filter": {"type": "object", "required": ["kind"], "properties": {
                    "kind": {"type": "string"}, "color": {"type": "string"}
                }},
                "Pet": {"type": "object", "properties": {
                    "id": {"type": "integer", "readOnly": true},
                    "name": {"type": "string"}
                }}
            }}
        }))
    }

    #[test]
    fn test_parameters_expand_object_schemas() {
        let model = ResolvedModel::build(&document());
        let settable = model.settable("pet_list").unwrap();
        let names: Vec<_> = settable.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["limit", "filter.kind", "filter.color"]);
        assert_eq!(settable.parameters[0].value_type, ValueType::Integer);
        assert_eq!(settable.parameters[0].default, Some(json!(20)));
        assert!(settable.parameters[1].required);
        assert!(!settable.parameters[2].required);
        assert_eq!(settable.parameters[1].parents, vec!["filter".to_string()]);
    }

    #[test]
    fn test_body_skips_read_only_and_response_fields() {
        let model = ResolvedModel::build(&document());
        let create = model.settable("pet_create").unwrap();
        let names: Vec<_> = create.body.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name"]);
        assert_eq!(create.response_fields, None);

        assert_eq!(
            model.response_fields("pet_list"),
            Some(vec!["items".to_string(), "next".to_string()])
        );
    }

    #[test]
    fn test_problems_include_resolution_problems() {
        let model = ResolvedModel::build(&document());
        assert_eq!(
            model.problems(),
            &[SchemaProblem::MissingReference {
                reference: "#/components/schemas/Missing".into()
            }]
        );
    }

    #[test]
    fn test_field_names_include_dotted_and_leaf_names() {
        let model = ResolvedModel::build(&document());
        let names = model.field_names("pet_list").unwrap();
        assert!(names.contains("filter.kind"));
        assert!(names.contains("kind"));
        assert!(names.contains("limit"));
        assert!(model.field_names("nope").is_none());
    }
}
