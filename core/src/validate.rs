//! Layout compilation and validation.
//!
//! [`compile_layout`] walks a [`Layout`] from its start node, binds every
//! operation entry against an [`OperationCatalog`] and follows child command
//! references. Every fatal problem found anywhere in the tree is collected
//! and returned together as [`LayoutErrors`]; pagination fields that do not
//! match the bound operation are reported as non-fatal [`LayoutWarning`]s.
//!
//! # Examples
//!
//! ```
//! use oas_toolkit_core::*;
//! use serde_json::json;
//!
//! let doc = Document::new(json!({"paths": {
//!     "/widgets": {"get": {"operationId": "widget_list", "responses": {}}}
//! }}));
//! let index = OperationIndex::build(&doc);
//!
//! let layout = Layout::from_value(&json!({
//!     "main": {"description": "root", "operations": [
//!         {"name": "list", "operationId": "widget_lst"}
//!     ]}
//! })).unwrap();
//!
//! let errors = compile_layout(&layout, &index, &CompileOptions::default()).unwrap_err();
//! assert_eq!(errors.0, vec![LayoutError::UnknownOperationId("widget_lst".into())]);
//! ```

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::layout::{CommandNode, DEFAULT_START, EntryTarget, Layout, LayoutEntry, PaginationSpec};
use crate::operation::{Operation, OperationCatalog, OperationIndex};

/// Fatal layout problems.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum LayoutError {
    /// An entry binds an operation the document does not define.
    #[error("unknown operationId: {0}")]
    UnknownOperationId(String),
    /// An entry (or the start) names a command with no top-level definition.
    #[error("unknown command id: {0}")]
    UnknownCommandId(String),
    /// A command appears in its own ancestor chain (e.g. `main -> a -> main`).
    #[error("cyclic command reference: {0}")]
    CyclicCommandReference(String),
    /// Two nodes share an identifier.
    #[error("duplicate command id: {0}")]
    DuplicateCommandId(String),
    /// A layout node is not a mapping.
    #[error("layout node {0} is not a mapping")]
    NotAMapping(String),
    /// An entry could not be read.
    #[error("{command} operations[{index}]: {reason}")]
    MalformedEntry {
        command: String,
        index: usize,
        reason: String,
    },
}

/// Every fatal problem of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutErrors(pub Vec<LayoutError>);

impl std::error::Error for LayoutErrors {}

impl fmt::Display for LayoutErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&lines.join("\n"))
    }
}

impl LayoutErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutError> {
        self.0.iter()
    }
}

/// Non-fatal layout findings.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum LayoutWarning {
    /// A pagination option names a field the bound operation does not have.
    #[error("{command} {operation}: pagination {option} field {field} not found in {operation_id}")]
    InvalidPaginationField {
        command: String,
        operation: String,
        operation_id: String,
        option: String,
        field: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Identifier of the root command node.
    pub start: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            start: DEFAULT_START.to_string(),
        }
    }
}

impl CompileOptions {
    pub fn with_start(start: &str) -> Self {
        Self {
            start: start.to_string(),
        }
    }
}

/// An operation bound to a leaf of the command tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundOperation {
    pub name: String,
    pub operation_id: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summary_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bug_ids: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// A child of a command: a bound operation or a nested command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeChild {
    Operation(BoundOperation),
    Command(CommandTree),
}

impl TreeChild {
    pub fn name(&self) -> &str {
        match self {
            Self::Operation(op) => &op.name,
            Self::Command(command) => &command.name,
        }
    }
}

/// A validated command hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandTree {
    /// Command name as typed by a user (the entry name; the start id at the root).
    pub name: String,
    /// Layout node identifier.
    pub identifier: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summary_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bug_ids: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    pub children: Vec<TreeChild>,
}

impl CommandTree {
    /// Bound operation ids in tree order, each listed once.
    pub fn operation_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        self.collect_ids(&mut seen, &mut ids);
        ids
    }

    fn collect_ids<'t>(&'t self, seen: &mut HashSet<&'t str>, ids: &mut Vec<&'t str>) {
        for child in &self.children {
            match child {
                TreeChild::Operation(op) => {
                    if seen.insert(&op.operation_id) {
                        ids.push(&op.operation_id);
                    }
                }
                TreeChild::Command(command) => command.collect_ids(seen, ids),
            }
        }
    }

    /// Follows command names down the tree (`["pets", "list"]`).
    pub fn find(&self, names: &[&str]) -> Option<&TreeChild> {
        let (first, rest) = names.split_first()?;
        let child = self.children.iter().find(|c| c.name() == *first)?;
        match (child, rest.is_empty()) {
            (_, true) => Some(child),
            (TreeChild::Command(command), false) => command.find(rest),
            (TreeChild::Operation(_), false) => None,
        }
    }

    /// Nested commands, in layout order.
    pub fn subcommands(&self) -> impl Iterator<Item = &CommandTree> {
        self.children.iter().filter_map(|c| match c {
            TreeChild::Command(command) => Some(command),
            TreeChild::Operation(_) => None,
        })
    }

    /// Operations bound directly to this command, in layout order.
    pub fn operations(&self) -> impl Iterator<Item = &BoundOperation> {
        self.children.iter().filter_map(|c| match c {
            TreeChild::Operation(op) => Some(op),
            TreeChild::Command(_) => None,
        })
    }

    /// Operations of the index that no command binds, in document order.
    pub fn unreferenced<'i>(&self, index: &'i OperationIndex) -> Vec<&'i Operation> {
        let bound: HashSet<&str> = self.operation_ids().into_iter().collect();
        index
            .iter()
            .filter(|op| !bound.contains(op.id.as_str()))
            .collect()
    }
}

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledLayout {
    pub tree: CommandTree,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LayoutWarning>,
}

struct Compiler<'c> {
    layout: &'c Layout,
    catalog: &'c dyn OperationCatalog,
    errors: Vec<LayoutError>,
    warnings: Vec<LayoutWarning>,
}

impl Compiler<'_> {
    fn error(&mut self, error: LayoutError) {
        if !self.errors.contains(&error) {
            debug!(%error, "layout error");
            self.errors.push(error);
        }
    }

    fn warning(&mut self, warning: LayoutWarning) {
        if !self.warnings.contains(&warning) {
            warn!(%warning, "layout warning");
            self.warnings.push(warning);
        }
    }

    fn command(&mut self, name: &str, node: &CommandNode, stack: &mut Vec<String>) -> CommandTree {
        let mut tree = CommandTree {
            name: name.to_string(),
            identifier: node.id.clone(),
            description: node.description.clone(),
            summary_fields: node.summary_fields.clone(),
            bug_ids: node.bug_ids.clone(),
            extra: node.extra.clone(),
            children: Vec::new(),
        };

        for entry in &node.entries {
            match &entry.target {
                EntryTarget::Operation(id) => {
                    if let Some(bound) = self.operation(node, entry, id) {
                        tree.children.push(TreeChild::Operation(bound));
                    }
                }
                EntryTarget::Subcommand(id) => {
                    if stack.iter().any(|ancestor| ancestor == id) {
                        let cycle = stack
                            .iter()
                            .cloned()
                            .chain(std::iter::once(id.clone()))
                            .collect::<Vec<_>>()
                            .join(" -> ");
                        self.error(LayoutError::CyclicCommandReference(cycle));
                        continue;
                    }
                    let layout = self.layout;
                    let Some(child) = layout.node(id) else {
                        self.error(LayoutError::UnknownCommandId(id.clone()));
                        continue;
                    };

                    stack.push(id.clone());
                    let mut subtree = self.command(&entry.name, child, stack);
                    stack.pop();

                    subtree.bug_ids.extend(entry.bug_ids.iter().cloned());
                    tree.children.push(TreeChild::Command(subtree));
                }
            }
        }

        tree
    }

    fn operation(&mut self, node: &CommandNode, entry: &LayoutEntry, id: &str) -> Option<BoundOperation> {
        let catalog = self.catalog;
        let Some(operation) = catalog.operation(id) else {
            self.error(LayoutError::UnknownOperationId(id.to_string()));
            return None;
        };

        if let Some(pagination) = &entry.pagination {
            self.check_pagination(node, entry, id, pagination);
        }

        Some(BoundOperation {
            name: entry.name.clone(),
            operation_id: operation.id.clone(),
            method: operation.method.clone(),
            path: operation.path.clone(),
            summary_fields: entry.summary_fields.clone(),
            pagination: entry.pagination.clone(),
            bug_ids: entry.bug_ids.clone(),
            extra: entry.extra.clone(),
        })
    }

    fn check_pagination(&mut self, node: &CommandNode, entry: &LayoutEntry, id: &str, pagination: &PaginationSpec) {
        let mut missing = Vec::new();
        if let Some(fields) = self.catalog.field_names(id) {
            missing.extend(
                pagination
                    .request_fields()
                    .into_iter()
                    .filter(|(_, field)| !fields.contains(*field)),
            );
        }
        if let Some(fields) = self.catalog.response_fields(id) {
            missing.extend(
                pagination
                    .response_fields()
                    .into_iter()
                    .filter(|(_, field)| !fields.iter().any(|f| f.as_str() == *field)),
            );
        }

        for (option, field) in missing {
            self.warning(LayoutWarning::InvalidPaginationField {
                command: node.id.clone(),
                operation: entry.name.clone(),
                operation_id: id.to_string(),
                option: option.to_string(),
                field: field.to_string(),
            });
        }
    }
}

/// Compiles a layout into a validated [`CommandTree`].
///
/// Parse problems already recorded on the layout are reported first, then
/// every problem found while walking from `options.start`. Shared subtrees
/// are allowed; only a command inside its own ancestor chain is a cycle.
pub fn compile_layout(
    layout: &Layout,
    catalog: &dyn OperationCatalog,
    options: &CompileOptions,
) -> Result<CompiledLayout, LayoutErrors> {
    let mut compiler = Compiler {
        layout,
        catalog,
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    for problem in layout.problems() {
        compiler.error(problem.clone());
    }

    let start = options.start.as_str();
    let tree = match layout.node(start) {
        Some(root) => {
            let mut stack = vec![start.to_string()];
            Some(compiler.command(start, root, &mut stack))
        }
        None => {
            compiler.error(LayoutError::UnknownCommandId(start.to_string()));
            None
        }
    };

    match tree {
        Some(tree) if compiler.errors.is_empty() => Ok(CompiledLayout {
            tree,
            warnings: compiler.warnings,
        }),
        _ => Err(LayoutErrors(compiler.errors)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;
    use crate::document::Document;

    fn index() -> OperationIndex {
        OperationIndex::build(&Document::new(json!({"paths": {
            "/widgets": {
                "get": {"operationId": "widget_list", "responses": {}},
                "post": {"operationId": "widget_create", "responses": {}}
            },
            "/widgets/{id}": {
                "parameters": [{"name": "id", "in": "path"}],
                "delete": {"operationId": "widget_delete", "responses": {}}
            }
        }})))
    }

    fn layout(raw: Value) -> Layout {
        Layout::from_value(&raw).unwrap()
    }

    #[test]
    fn test_compile_binds_operations_and_subcommands() {
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "widgets", "subcommandId": "widgets", "bugIds": ["B-7"]}
            ]},
            "widgets": {"description": "Manage widgets", "operations": [
                {"name": "list", "operationId": "widget_list"},
                {"name": "create", "operationId": "widget_create"}
            ]}
        }));
        let compiled = compile_layout(&layout, &index(), &CompileOptions::default()).unwrap();
        let tree = compiled.tree;

        assert_eq!(tree.operation_ids(), vec!["widget_list", "widget_create"]);
        match tree.find(&["widgets", "list"]) {
            Some(TreeChild::Operation(op)) => {
                assert_eq!(op.method, "get");
                assert_eq!(op.path, "/widgets");
            }
            other => panic!("expected bound operation, got {other:?}"),
        }
        let widgets = tree.subcommands().next().unwrap();
        assert_eq!(widgets.description, "Manage widgets");
        assert_eq!(widgets.bug_ids, vec!["B-7"]);

        let unreferenced: Vec<_> = tree.unreferenced(&index()).iter().map(|op| op.id.clone()).collect();
        assert_eq!(unreferenced, vec!["widget_delete"]);
    }

    #[test]
    fn test_typo_in_operation_id() {
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "list", "operationId": "widget_lst"}
            ]}
        }));
        let errors = compile_layout(&layout, &index(), &CompileOptions::default()).unwrap_err();
        assert_eq!(
            errors.0,
            vec![LayoutError::UnknownOperationId("widget_lst".into())]
        );
    }

    #[test]
    fn test_unknown_command_id_reported_with_other_errors() {
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "gadgets", "subcommandId": "gadgets"},
                {"name": "widgets", "subcommandId": "widgets"}
            ]},
            "widgets": {"description": "w", "operations": [
                {"name": "list", "operationId": "widget_list"},
                {"name": "remove", "operationId": "widget_remove"}
            ]}
        }));
        let errors = compile_layout(&layout, &index(), &CompileOptions::default()).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                LayoutError::UnknownCommandId("gadgets".into()),
                LayoutError::UnknownOperationId("widget_remove".into()),
            ]
        );
        assert_eq!(
            errors.to_string(),
            "unknown command id: gadgets\nunknown operationId: widget_remove"
        );
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "a", "subcommandId": "a"}
            ]},
            "a": {"description": "a", "operations": [
                {"name": "b", "subcommandId": "b"}
            ]},
            "b": {"description": "b", "operations": [
                {"name": "back", "subcommandId": "a"}
            ]}
        }));
        let errors = compile_layout(&layout, &index(), &CompileOptions::default()).unwrap_err();
        assert_eq!(
            errors.0,
            vec![LayoutError::CyclicCommandReference("main -> a -> b -> a".into())]
        );
    }

    #[test]
    fn test_shared_subtree_is_not_a_cycle() {
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "one", "subcommandId": "shared"},
                {"name": "two", "subcommandId": "shared"}
            ]},
            "shared": {"description": "s", "operations": [
                {"name": "list", "operationId": "widget_list"}
            ]}
        }));
        let compiled = compile_layout(&layout, &index(), &CompileOptions::default()).unwrap();
        assert_eq!(compiled.tree.subcommands().count(), 2);
        assert_eq!(compiled.tree.operation_ids(), vec!["widget_list"]);
    }

    #[test]
    fn test_missing_start_and_parse_problems() {
        let layout = layout(json!({
            "root": {"description": "r", "operations": [{"operationId": "widget_list"}]}
        }));
        let errors = compile_layout(&layout, &index(), &CompileOptions::default()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors.0[0], LayoutError::MalformedEntry { index: 0, .. }));
        assert_eq!(errors.0[1], LayoutError::UnknownCommandId("main".into()));

        let errors = compile_layout(&layout, &index(), &CompileOptions::with_start("root")).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    struct FieldCatalog(OperationIndex);

    impl OperationCatalog for FieldCatalog {
        fn operation(&self, id: &str) -> Option<&Operation> {
            self.0.get(id)
        }

        fn field_names(&self, _id: &str) -> Option<BTreeSet<String>> {
            Some(["limit".to_string()].into_iter().collect())
        }

        fn response_fields(&self, _id: &str) -> Option<Vec<String>> {
            Some(vec!["data".to_string()])
        }
    }

    #[test]
    fn test_invalid_pagination_field_is_warning() {
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "list", "operationId": "widget_list", "pagination": {
                    "pageSize": "limit",
                    "pageStart": "page",
                    "itemProperty": "items",
                    "nextHeader": "Link"
                }}
            ]}
        }));
        let compiled =
            compile_layout(&layout, &FieldCatalog(index()), &CompileOptions::default()).unwrap();
        let fields: Vec<_> = compiled
            .warnings
            .iter()
            .map(|w| match w {
                LayoutWarning::InvalidPaginationField { option, field, .. } => {
                    format!("{option}={field}")
                }
            })
            .collect();
        assert_eq!(fields, vec!["pageStart=page", "itemProperty=items"]);
    }

    #[test]
    fn test_pagination_checked_against_bare_index() {
        let index = OperationIndex::build(&Document::new(json!({"paths": {
            "/widgets": {"get": {
                "operationId": "widget_list",
                "parameters": [{"name": "limit", "in": "query"}],
                "responses": {"200": {"content": {"application/json": {"schema": {
                    "type": "object",
                    "properties": {"data": {"type": "array"}, "next": {"type": "string"}}
                }}}}}
            }}
        }})));
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "list", "operationId": "widget_list", "pagination": {
                    "pageSize": "bogus",
                    "itemProperty": "data",
                    "nextProperty": "cursor"
                }}
            ]}
        }));
        let compiled = compile_layout(&layout, &index, &CompileOptions::default()).unwrap();
        assert_eq!(
            compiled.warnings,
            vec![
                LayoutWarning::InvalidPaginationField {
                    command: "main".into(),
                    operation: "list".into(),
                    operation_id: "widget_list".into(),
                    option: "pageSize".into(),
                    field: "bogus".into(),
                },
                LayoutWarning::InvalidPaginationField {
                    command: "main".into(),
                    operation: "list".into(),
                    operation_id: "widget_list".into(),
                    option: "nextProperty".into(),
                    field: "cursor".into(),
                },
            ]
        );

        let valid = self::layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "list", "operationId": "widget_list", "pagination": {"pageSize": "limit"}}
            ]}
        }));
        let compiled = compile_layout(&valid, &index, &CompileOptions::default()).unwrap();
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn test_composed_body_skips_request_check_on_bare_index() {
        let index = OperationIndex::build(&Document::new(json!({"paths": {
            "/widgets": {"post": {
                "operationId": "widget_search",
                "requestBody": {"content": {"application/json": {"schema": {
                    "allOf": [{"type": "object", "properties": {"cursor": {"type": "string"}}}]
                }}}},
                "responses": {}
            }}
        }})));
        let layout = layout(json!({
            "main": {"description": "root", "operations": [
                {"name": "search", "operationId": "widget_search", "pagination": {"pageStart": "cursor"}}
            ]}
        }));
        let compiled = compile_layout(&layout, &index, &CompileOptions::default()).unwrap();
        assert!(compiled.warnings.is_empty());
    }
}
