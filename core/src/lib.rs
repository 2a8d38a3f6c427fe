//! Schema resolution, structural diffing and layout compilation for API
//! description documents.
//!
//! This crate is the I/O-free engine behind `oas-toolkit`:
//!
//! - [`Document`]: the raw description, kept as an order-preserving mapping.
//! - [`Resolver`]: follows `$ref` pointers with caching, cycle detection and
//!   [`MissingReference`] / [`CyclicReference`] placeholders.
//! - [`compose`]: merges `allOf` branches under an injected [`MergePolicy`]
//!   and keeps `oneOf` / `anyOf` as unions.
//! - [`Flattener`]: walks a resolved shape into ordered leaf
//!   [`PropertySpec`]s (the settable properties).
//! - [`OperationIndex`] and [`ResolvedModel`]: operations by id with their
//!   settable parameters and body fields.
//! - [`diff`]: a purely structural [`DiffReport`] between two documents.
//! - [`ReferenceGraph`]: which components and operations use which
//!   components; [`filter_operations`] and [`DocumentUpdate`] rewrite a
//!   document and drop what it no longer references.
//! - [`Layout`], [`compile_layout`] and [`lint_layout`]: the user-authored
//!   command hierarchy, bound to operations and checked.
//!
//! # Example
//!
//! ```
//! use oas_toolkit_core::*;
//! use serde_json::json;
//!
//! let doc = Document::new(json!({
//!     "paths": {"/pets": {"get": {
//!         "operationId": "pet_list",
//!         "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer"}}],
//!         "responses": {"200": {"content": {"application/json": {"schema": {
//!             "type": "object",
//!             "properties": {"items": {"type": "array"}, "next": {"type": "string"}}
//!         }}}}}
//!     }}}
//! }));
//! let model = ResolvedModel::build(&doc);
//!
//! let layout = Layout::from_value(&json!({
//!     "main": {"description": "Pet store", "operations": [
//!         {"name": "list", "operationId": "pet_list",
//!          "pagination": {"pageSize": "limit", "nextProperty": "next", "itemProperty": "items"}}
//!     ]}
//! })).unwrap();
//!
//! let compiled = compile_layout(&layout, &model, &CompileOptions::default()).unwrap();
//! assert!(compiled.warnings.is_empty());
//! assert_eq!(compiled.tree.operation_ids(), vec!["pet_list"]);
//! ```

mod compose;
mod diff;
mod document;
mod flatten;
mod layout;
mod lint;
mod model;
mod operation;
mod prune;
mod references;
mod resolve;
mod schema;
mod validate;

pub use compose::{LastWriteWins, MergePolicy, compose};
pub use diff::{
    Change, DiffNode, DiffOptions, DiffReport, PathSegment, SET_KEYWORDS, diff, diff_values,
    diff_with, format_path,
};
pub use document::{Document, SCHEMA_REF_PREFIX, schema_ref, short_ref};
pub use flatten::{AlternativeSelector, Flattener, first_alternative, flatten};
pub use layout::{
    CommandNode, DEFAULT_START, EntryTarget, LAYOUT_KEYS, Layout, LayoutEntry, PAGINATION_KEYS,
    PaginationSpec, PaginationStrategy, field_to_list,
};
pub use lint::{LayoutCheck, LayoutChecks, LayoutIssue, lint_layout};
pub use model::{ResolvedModel, SettableProperties};
pub use operation::{
    HTTP_METHODS, Operation, OperationCatalog, OperationIndex, Parameter, ParameterLocation,
    RequestBody, Response, path_variables, strip_path_variables,
};
pub use prune::{
    DocumentUpdate, OperationFilter, PRUNABLE_SECTIONS, PruneError, filter_operations,
    nullable_not_required, prune_components, remove_property, remove_tags,
};
pub use references::{
    COMPONENTS_PREFIX, ReferenceGraph, component_key, find_references, unroll,
};
pub use resolve::{Resolver, SchemaProblem};
pub use schema::*;
pub use validate::{
    BoundOperation, CommandTree, CompileOptions, CompiledLayout, LayoutError, LayoutErrors,
    LayoutWarning, TreeChild, compile_layout,
};
