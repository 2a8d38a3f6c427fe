use std::path::{Path, PathBuf};

use oas_toolkit_core::{CompileOptions, EntryTarget, LayoutError, ResolvedModel, compile_layout};
use oas_toolkit_loader::{
    LoadError, ToolConfig, load_document, load_layout, load_layout_value, read_value,
    save_document,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PETSTORE_YAML: &str = r#"
openapi: 3.0.0
info:
  title: Pets
  version: "1.0"
paths:
  /pets:
    get:
      operationId: pet_list
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
      responses:
        200:
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/PetPage'
components:
  schemas:
    Pet:
      type: object
      properties:
        name:
          type: string
    PetPage:
      type: object
      properties:
        items:
          type: array
          items:
            $ref: '#/components/schemas/Pet'
        next:
          type: string
"#;

const LAYOUT_YAML: &str = r#"
main:
  description: Pet store
  operations:
    - name: pets
      subcommandId: pets
pets:
  description: Manage pets
  operations:
    - name: list
      operationId: pet_list
      pagination:
        pageSize: limit
        itemProperty: items
        nextProperty: next
"#;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[test]
fn test_yaml_document_loads_with_string_status_codes() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "pets.yaml", PETSTORE_YAML);

    let doc = load_document(&path).unwrap();
    assert_eq!(doc.schema_names(), vec!["Pet", "PetPage"]);

    let model = ResolvedModel::build(&doc);
    let op = model.index().get("pet_list").unwrap();
    assert_eq!(op.success_response().unwrap().status, "200");
    assert!(model.problems().is_empty());
}

#[test]
fn test_json_document_loads_by_extension() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "api.json",
        r#"{"paths": {"/a": {"get": {"operationId": "a_get", "responses": {}}}}}"#,
    );
    let doc = load_document(&path).unwrap();
    assert!(doc.get("#/paths/~1a/get").is_some());
}

#[test]
fn test_saved_document_reloads_in_either_format() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(write(dir.path(), "pets.yaml", PETSTORE_YAML)).unwrap();

    for name in ["copy.json", "copy.yaml"] {
        let path = dir.path().join(name);
        save_document(&path, &doc).unwrap();
        let reloaded = load_document(&path).unwrap();
        assert_eq!(reloaded, doc, "{name}");
        assert_eq!(reloaded.schema_names(), vec!["Pet", "PetPage"]);
    }
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = read_value(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, LoadError::NotFound(_)));
}

#[test]
fn test_scalar_document_is_invalid() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "scalar.yaml", "just text\n");
    assert!(matches!(
        load_document(&path),
        Err(LoadError::InvalidDocument(_))
    ));
    assert!(matches!(
        load_layout_value(&path),
        Err(LoadError::InvalidLayout(_))
    ));
}

#[test]
fn test_broken_json_is_json_error() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "broken.json", "{\"paths\": ");
    assert!(matches!(load_document(&path), Err(LoadError::JsonError(_))));
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

#[test]
fn test_layout_compiles_against_loaded_document() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(write(dir.path(), "pets.yaml", PETSTORE_YAML)).unwrap();
    let layout = load_layout(write(dir.path(), "layout.yaml", LAYOUT_YAML)).unwrap();

    assert_eq!(
        layout.node("main").unwrap().entries[0].target,
        EntryTarget::Subcommand("pets".into())
    );

    let model = ResolvedModel::build(&doc);
    let compiled = compile_layout(&layout, &model, &CompileOptions::default()).unwrap();
    assert!(compiled.warnings.is_empty());
    assert_eq!(compiled.tree.operation_ids(), vec!["pet_list"]);
}

#[test]
fn test_layout_errors_are_collected() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(write(dir.path(), "pets.yaml", PETSTORE_YAML)).unwrap();
    let layout = load_layout(write(
        dir.path(),
        "layout.yaml",
        "main:\n  description: x\n  operations:\n    - name: a\n      subcommandId: nope\n    - name: b\n      operationId: pet_lst\n",
    ))
    .unwrap();

    let model = ResolvedModel::build(&doc);
    let errors = compile_layout(&layout, &model, &CompileOptions::default()).unwrap_err();
    assert_eq!(
        errors.0,
        vec![
            LayoutError::UnknownCommandId("nope".into()),
            LayoutError::UnknownOperationId("pet_lst".into()),
        ]
    );
}

#[test]
fn test_json_layout_duplicate_command_id_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "layout.json",
        r#"{"main": {"description": "first"}, "other": {}, "main": {"description": "second"}}"#,
    );

    let layout = load_layout(&path).unwrap();
    let ids: Vec<&str> = layout.nodes().iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["main", "other"]);
    assert_eq!(layout.node("main").unwrap().description, "first");
    assert_eq!(
        layout.problems(),
        &[LayoutError::DuplicateCommandId("main".into())]
    );
}

#[test]
fn test_yaml_layout_duplicate_command_id_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "layout.yaml",
        "main:\n  description: first\nmain:\n  description: second\n",
    );

    let layout = load_layout(&path).unwrap();
    assert_eq!(layout.nodes().len(), 1);
    assert_eq!(
        layout.problems(),
        &[LayoutError::DuplicateCommandId("main".into())]
    );
}

#[test]
fn test_scalar_layout_is_invalid() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "layout.json", "[1, 2]");
    assert!(matches!(load_layout(&path), Err(LoadError::InvalidLayout(_))));
}

#[test]
fn test_yaml_nan_is_invalid_document() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "api.yaml", "info:\n  version: .nan\n");
    assert!(matches!(
        load_document(&path),
        Err(LoadError::InvalidDocument(_))
    ));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yml");

    let mut config = ToolConfig::default();
    config.log_level = Some("info".into());
    config.layout.start = "root".into();
    config.layout.checks.sub_order = false;
    config.diff.scalar_sets = true;
    config.save(&path).unwrap();

    let loaded = ToolConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_config_empty_file_is_default() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "empty.yml", "");
    assert_eq!(ToolConfig::load(&path).unwrap(), ToolConfig::default());
}

#[test]
fn test_config_explicit_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.yml");
    assert!(matches!(
        ToolConfig::load_or_default(Some(&missing)),
        Err(LoadError::NotFound(_))
    ));
}
