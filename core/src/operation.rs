//! Operation index.
//!
//! [`OperationIndex::build`] walks the `paths` mapping once and indexes every
//! operation by its `operationId`. Parameters, request bodies and responses
//! given as `$ref` are followed to their targets; schemas are kept raw and
//! resolved later by the [`ResolvedModel`](crate::ResolvedModel).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::Document;
use crate::resolve::SchemaProblem;
use crate::schema::Deprecation;

/// HTTP methods that may appear as keys of a path item.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const JSON_CONTENT: &str = "application/json";

static PATH_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("static regex must compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        };
        f.write_str(name)
    }
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Deprecation::is_active")]
    pub deprecation: Deprecation,
    /// Raw parameter schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    pub content_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl Response {
    /// Numeric status when the key is a plain code (`200`, not `2XX`).
    pub fn code(&self) -> Option<u16> {
        self.status.parse().ok()
    }

    pub fn is_success(&self) -> bool {
        self.code().is_some_and(|code| (200..300).contains(&code))
    }
}

/// One HTTP operation of the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub id: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Deprecation::is_active")]
    pub deprecation: Deprecation,
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: Vec<Response>,
}

impl Operation {
    /// Template variables of the path, in order (`/pets/{petId}` → `petId`).
    ///
    /// # Examples
    ///
    /// ```
    /// use oas_toolkit_core::path_variables;
    ///
    /// assert_eq!(path_variables("/owners/{ownerId}/pets/{petId}"), vec!["ownerId", "petId"]);
    /// ```
    pub fn path_variables(&self) -> Vec<&str> {
        path_variables(&self.path)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The success response with the lowest status code.
    pub fn success_response(&self) -> Option<&Response> {
        self.responses
            .iter()
            .filter(|r| r.is_success())
            .min_by_key(|r| r.code())
    }
}

/// Template variables of a path template, in order.
pub fn path_variables(path: &str) -> Vec<&str> {
    PATH_VARIABLE
        .captures_iter(path)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Removes template segments from a path (`/pets/{id}/toys` → `pets/toys`).
pub fn strip_path_variables(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && !part.contains('{'))
        .collect::<Vec<_>>()
        .join("/")
}

/// Lookup of operations by identifier.
///
/// Implemented by [`OperationIndex`], which knows declared parameter names
/// and the properties of uncomposed bodies, and by
/// [`ResolvedModel`](crate::ResolvedModel), which also flattens composed and
/// nested bodies.
pub trait OperationCatalog {
    fn operation(&self, id: &str) -> Option<&Operation>;

    /// Settable request field names, or `None` when unknown.
    fn field_names(&self, _id: &str) -> Option<BTreeSet<String>> {
        None
    }

    /// Top-level property names of the success response, or `None` when
    /// unknown.
    fn response_fields(&self, _id: &str) -> Option<Vec<String>> {
        None
    }
}

/// Operations of a document indexed by `operationId`.
///
/// # Example
///
/// ```
/// use oas_toolkit_core::*;
/// use serde_json::json;
///
/// let doc = Document::new(json!({"paths": {
///     "/widgets": {"get": {"operationId": "widget_list", "responses": {}}}
/// }}));
/// let index = OperationIndex::build(&doc);
/// assert!(index.contains("widget_list"));
/// assert_eq!(index.get("widget_list").unwrap().method, "get");
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationIndex {
    operations: Vec<Operation>,
    declared: Vec<DeclaredFields>,
    by_id: HashMap<String, usize>,
    problems: Vec<SchemaProblem>,
}

/// Field names an operation declares without composing any schema.
#[derive(Debug, Clone, Default)]
struct DeclaredFields {
    /// Parameter names plus top-level body properties; `None` when the body
    /// shape needs composition to be known.
    request: Option<BTreeSet<String>>,
    /// Top-level properties of the success response, when plain.
    response: Option<Vec<String>>,
}

impl DeclaredFields {
    fn of(document: &Document, operation: &Operation) -> Self {
        let body = operation.request_body.as_ref().and_then(|b| b.schema.as_ref());
        let request = match body {
            Some(schema) => plain_properties(document, schema),
            None => Some(Vec::new()),
        }
        .map(|properties| {
            operation
                .parameters
                .iter()
                .map(|p| p.name.clone())
                .chain(properties)
                .collect()
        });
        let response = operation
            .success_response()
            .and_then(|r| r.schema.as_ref())
            .and_then(|schema| plain_properties(document, schema))
            .filter(|names| !names.is_empty());
        Self { request, response }
    }
}

impl OperationIndex {
    pub fn build(document: &Document) -> Self {
        let mut index = Self::default();
        let Some(paths) = document.paths() else {
            debug!("document has no paths");
            return index;
        };

        for (path, item) in paths {
            let Some(item) = deref(document, item).and_then(Value::as_object) else {
                continue;
            };
            let shared = parameters(document, item.get("parameters"));

            for method in HTTP_METHODS {
                let Some(raw) = item.get(*method).and_then(Value::as_object) else {
                    continue;
                };
                let Some(id) = raw.get("operationId").and_then(Value::as_str) else {
                    warn!(method, path = %path, "skipping operation without operationId");
                    index.record(SchemaProblem::MissingOperationId {
                        method: method.to_uppercase(),
                        path: path.clone(),
                    });
                    continue;
                };
                if index.by_id.contains_key(id) {
                    warn!(operation_id = id, "duplicate operationId, keeping the first");
                    index.record(SchemaProblem::DuplicateOperationId {
                        operation_id: id.to_string(),
                    });
                    continue;
                }

                let operation = operation(document, id, method, path, raw, &shared);
                let declared: HashSet<&str> = operation
                    .parameters
                    .iter()
                    .filter(|p| p.location == ParameterLocation::Path)
                    .map(|p| p.name.as_str())
                    .collect();
                let undeclared: Vec<String> = operation
                    .path_variables()
                    .into_iter()
                    .filter(|v| !declared.contains(v))
                    .map(str::to_string)
                    .collect();
                for variable in undeclared {
                    index.record(SchemaProblem::UndeclaredPathVariable {
                        path: path.clone(),
                        variable,
                    });
                }

                index.by_id.insert(id.to_string(), index.operations.len());
                index.declared.push(DeclaredFields::of(document, &operation));
                index.operations.push(operation);
            }
        }

        debug!(operations = index.operations.len(), "indexed operations");
        index
    }

    fn record(&mut self, problem: SchemaProblem) {
        if !self.problems.contains(&problem) {
            self.problems.push(problem);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.by_id.get(id).map(|&i| &self.operations[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Operations in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn problems(&self) -> &[SchemaProblem] {
        &self.problems
    }
}

impl OperationCatalog for OperationIndex {
    fn operation(&self, id: &str) -> Option<&Operation> {
        self.get(id)
    }

    /// Parameter names plus the top-level properties of a plain (uncomposed)
    /// request body. `None` when the body uses `allOf`/`oneOf`/`anyOf`.
    fn field_names(&self, id: &str) -> Option<BTreeSet<String>> {
        self.by_id
            .get(id)
            .and_then(|&i| self.declared[i].request.clone())
    }

    fn response_fields(&self, id: &str) -> Option<Vec<String>> {
        self.by_id
            .get(id)
            .and_then(|&i| self.declared[i].response.clone())
    }
}

/// Top-level property names of a schema that needs no composition.
fn plain_properties(document: &Document, schema: &Value) -> Option<Vec<String>> {
    let schema = deref(document, schema)?;
    if ["allOf", "oneOf", "anyOf"]
        .iter()
        .any(|key| schema.get(*key).is_some())
    {
        return None;
    }
    Some(
        schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| properties.keys().cloned().collect())
            .unwrap_or_default(),
    )
}

/// Follows `$ref` chains to the referenced node.
fn deref<'d>(document: &'d Document, node: &'d Value) -> Option<&'d Value> {
    let mut seen = HashSet::new();
    let mut current = node;
    while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
        if !seen.insert(reference) {
            warn!(reference, "cyclic reference while dereferencing");
            return None;
        }
        current = document.get(reference)?;
    }
    Some(current)
}

fn parameters(document: &Document, raw: Option<&Value>) -> Vec<Parameter> {
    let Some(list) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|node| deref(document, node))
        .filter_map(|node| parameter(document, node))
        .collect()
}

fn parameter(document: &Document, node: &Value) -> Option<Parameter> {
    let name = node.get("name")?.as_str()?;
    let location = ParameterLocation::parse(node.get("in")?.as_str()?)?;
    let schema = node
        .get("schema")
        .cloned()
        .or_else(|| first_content(document, node.get("content")).1);
    Some(Parameter {
        name: name.to_string(),
        location,
        required: location == ParameterLocation::Path
            || node.get("required").and_then(Value::as_bool).unwrap_or(false),
        description: string_field(node, "description"),
        deprecation: Deprecation::from_fields(node.get("deprecated"), node.get("x-deprecated")),
        schema,
    })
}

/// Picks `application/json` or else the first declared content entry.
fn first_content(document: &Document, content: Option<&Value>) -> (Option<String>, Option<Value>) {
    let Some(content) = content.and_then(Value::as_object) else {
        return (None, None);
    };
    let chosen = content
        .get_key_value(JSON_CONTENT)
        .or_else(|| content.iter().next());
    match chosen {
        Some((content_type, media)) => {
            let schema = deref(document, media)
                .and_then(|m| m.get("schema"))
                .cloned();
            (Some(content_type.clone()), schema)
        }
        None => (None, None),
    }
}

fn operation(
    document: &Document,
    id: &str,
    method: &str,
    path: &str,
    raw: &Map<String, Value>,
    shared: &[Parameter],
) -> Operation {
    let mut parameters: Vec<Parameter> = shared.to_vec();
    for own in self::parameters(document, raw.get("parameters")) {
        match parameters
            .iter()
            .position(|p| p.name == own.name && p.location == own.location)
        {
            Some(i) => parameters[i] = own,
            None => parameters.push(own),
        }
    }

    let request_body = raw
        .get("requestBody")
        .and_then(|body| deref(document, body))
        .map(|body| {
            let (content_type, schema) = first_content(document, body.get("content"));
            RequestBody {
                content_type: content_type.unwrap_or_else(|| JSON_CONTENT.to_string()),
                required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
                description: string_field(body, "description"),
                schema,
            }
        });

    let responses = raw
        .get("responses")
        .and_then(Value::as_object)
        .map(|responses| {
            responses
                .iter()
                .filter_map(|(status, node)| {
                    let node = deref(document, node)?;
                    let (content_type, schema) = first_content(document, node.get("content"));
                    Some(Response {
                        status: status.clone(),
                        description: string_field(node, "description"),
                        content_type,
                        schema,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let tags = raw
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Operation {
        id: id.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        summary: string_field(raw, "summary"),
        description: string_field(raw, "description"),
        tags,
        deprecation: Deprecation::from_fields(raw.get("deprecated"), raw.get("x-deprecated")),
        parameters,
        request_body,
        responses,
    }
}

fn string_field<T: FieldSource + ?Sized>(node: &T, key: &str) -> Option<String> {
    node.field(key).and_then(Value::as_str).map(str::to_string)
}

trait FieldSource {
    fn field(&self, key: &str) -> Option<&Value>;
}

impl FieldSource for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl FieldSource for Map<String, Value> {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn petstore() -> Document {
        Document::new(json!({
            "paths": {
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "schema": {"type": "string"}},
                        {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                    ],
                    "get": {
                        "operationId": "getPet",
                        "parameters": [
                            {"name": "verbose", "in": "query", "required": true, "schema": {"type": "boolean"}},
                            {"$ref": "#/components/parameters/Fields"}
                        ],
                        "responses": {
                            "404": {"description": "nope"},
                            "201": {"description": "odd"},
                            "200": {"$ref": "#/components/responses/PetResponse"}
                        }
                    },
                    "delete": {"responses": {}}
                },
                "/pets": {
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/xml": {"schema": {"type": "string"}},
                                "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                            }
                        },
                        "responses": {}
                    },
                    "put": {"operationId": "getPet", "responses": {}}
                },
                "/owners/{ownerId}": {
                    "get": {"operationId": "getOwner", "responses": {}}
                }
            },
            "components": {
                "parameters": {"Fields": {"name": "fields", "in": "query"}},
                "responses": {"PetResponse": {
                    "description": "a pet",
                    "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                }},
                "schemas": {"Pet": {"type": "object"}}
            }
        }))
    }

    #[test]
    fn test_path_parameters_are_inherited_and_overridden() {
        let index = OperationIndex::build(&petstore());
        let op = index.get("getPet").unwrap();
        let names: Vec<_> = op.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["petId", "verbose", "fields"]);
        assert!(op.parameter("verbose").unwrap().required);
        assert!(op.parameter("petId").unwrap().required);
    }

    #[test]
    fn test_success_response_is_lowest_2xx() {
        let index = OperationIndex::build(&petstore());
        let response = index.get("getPet").unwrap().success_response().unwrap();
        assert_eq!(response.status, "200");
        assert_eq!(response.description.as_deref(), Some("a pet"));
        assert_eq!(
            response.schema,
            Some(json!({"$ref": "#/components/schemas/Pet"}))
        );
    }

    #[test]
    fn test_request_body_prefers_json() {
        let index = OperationIndex::build(&petstore());
        let body = index.get("createPet").unwrap().request_body.clone().unwrap();
        assert_eq!(body.content_type, "application/json");
        assert!(body.required);
    }

    #[test]
    fn test_problems_are_recorded_not_fatal() {
        let index = OperationIndex::build(&petstore());
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("getPet").unwrap().method, "get");
        assert_eq!(
            index.problems(),
            &[
                SchemaProblem::MissingOperationId {
                    method: "DELETE".into(),
                    path: "/pets/{petId}".into()
                },
                SchemaProblem::DuplicateOperationId {
                    operation_id: "getPet".into()
                },
                SchemaProblem::UndeclaredPathVariable {
                    path: "/owners/{ownerId}".into(),
                    variable: "ownerId".into()
                },
            ]
        );
    }

    #[test]
    fn test_strip_path_variables() {
        assert_eq!(strip_path_variables("/pets/{petId}/toys"), "pets/toys");
        assert_eq!(strip_path_variables("/"), "");
    }
}
