//! Reading API descriptions and layouts from disk.
//!
//! Files ending in `.json` are parsed as JSON; everything else is parsed as
//! YAML. YAML mapping keys that are not strings (such as unquoted `200:`
//! response codes) are converted to their string form, so every loaded
//! document is a plain JSON value tree. YAML numbers with no JSON form
//! (`.nan`, `.inf`) are rejected.
//!
//! Layouts are read entry by entry at the top level, so a command id
//! repeated in a JSON file is reported as a duplicate instead of being
//! collapsed by the parser.
//!
//! ```no_run
//! use oas_toolkit_loader::{load_document, load_layout};
//!
//! let doc = load_document("openapi.yaml").unwrap();
//! println!("{} schemas", doc.schema_names().len());
//!
//! let layout = load_layout("layout.yaml").unwrap();
//! println!("{} commands", layout.nodes().len());
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use oas_toolkit_core::{Document, Layout};
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Serialization format of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Picks the format from the file extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use oas_toolkit_loader::DocumentFormat;
    ///
    /// assert_eq!(DocumentFormat::from_path("api.JSON"), DocumentFormat::Json);
    /// assert_eq!(DocumentFormat::from_path("api.yml"), DocumentFormat::Yaml);
    /// assert_eq!(DocumentFormat::from_path("api"), DocumentFormat::Yaml);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Reads a JSON or YAML file into a value tree.
///
/// # Errors
///
/// Returns [`LoadError::NotFound`] if the file does not exist,
/// [`LoadError::IoError`] if it cannot be read, and
/// [`LoadError::JsonError`] / [`LoadError::YamlError`] if parsing fails.
pub fn read_value(path: impl AsRef<Path>) -> Result<Value> {
    let (format, reader) = open(path.as_ref())?;
    match format {
        DocumentFormat::Json => Ok(serde_json::from_reader(reader)?),
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value = serde_yaml::from_reader(reader)?;
            yaml_to_json(yaml)
        }
    }
}

/// Loads an API description document.
///
/// # Errors
///
/// Everything [`read_value`] returns, plus [`LoadError::InvalidDocument`]
/// when the top level is not a mapping.
pub fn load_document(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    let value = read_value(path)?;
    if !value.is_object() {
        return Err(LoadError::InvalidDocument(format!(
            "{} does not contain a mapping",
            path.display()
        )));
    }
    Ok(Document::new(value))
}

/// Writes a document as JSON or YAML, chosen by the file extension.
///
/// Key order is kept.
///
/// # Errors
///
/// Returns [`LoadError::IoError`] if the file cannot be written, or
/// [`LoadError::JsonError`] / [`LoadError::YamlError`] if serialization
/// fails.
pub fn save_document(path: impl AsRef<Path>, document: &Document) -> Result<()> {
    let path = path.as_ref();
    let format = DocumentFormat::from_path(path);
    debug!(path = %path.display(), ?format, "writing file");
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        DocumentFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, document)?;
            writeln!(writer)?;
        }
        DocumentFormat::Yaml => serde_yaml::to_writer(&mut writer, document)?,
    }
    writer.flush()?;
    Ok(())
}

/// Loads a raw layout mapping (for linting).
///
/// # Errors
///
/// Everything [`read_value`] returns, plus [`LoadError::InvalidLayout`]
/// when the top level is not a mapping.
pub fn load_layout_value(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let value = read_value(path)?;
    if !value.is_object() {
        return Err(LoadError::InvalidLayout(format!(
            "{} does not contain a mapping",
            path.display()
        )));
    }
    Ok(value)
}

/// Loads and parses a layout.
///
/// Malformed nodes and entries do not fail loading; they are kept in
/// [`Layout::problems`] and reported by compilation. A repeated command id
/// keeps its first node and is reported as a duplicate.
///
/// # Errors
///
/// Everything [`read_value`] returns, plus [`LoadError::InvalidLayout`]
/// when the top level is not a mapping.
pub fn load_layout(path: impl AsRef<Path>) -> Result<Layout> {
    let path = path.as_ref();
    let (format, reader) = open(path)?;
    let top: TopLevel<Value> = match format {
        DocumentFormat::Json => serde_json::from_reader(reader)?,
        DocumentFormat::Yaml => {
            match serde_yaml::from_reader::<_, TopLevel<serde_yaml::Value>>(reader)? {
                TopLevel::Mapping(Entries(entries)) => TopLevel::Mapping(Entries(
                    entries
                        .into_iter()
                        .map(|(id, node)| Ok((id, yaml_to_json(node)?)))
                        .collect::<Result<Vec<_>>>()?,
                )),
                TopLevel::Other(ignored) => TopLevel::Other(ignored),
            }
        }
    };

    match top {
        TopLevel::Mapping(Entries(entries)) => Ok(Layout::from_entries(
            entries.iter().map(|(id, node)| (id.as_str(), node)),
        )),
        TopLevel::Other(_) => Err(LoadError::InvalidLayout(format!(
            "{} does not contain a mapping",
            path.display()
        ))),
    }
}

fn open(path: &Path) -> Result<(DocumentFormat, BufReader<File>)> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let format = DocumentFormat::from_path(path);
    debug!(path = %path.display(), ?format, "reading file");
    Ok((format, BufReader::new(File::open(path)?)))
}

/// A top-level document: mapping entries in file order, or anything else.
#[derive(Deserialize)]
#[serde(untagged)]
enum TopLevel<V> {
    Mapping(Entries<V>),
    Other(IgnoredAny),
}

/// Mapping entries in file order, repeated keys included.
struct Entries<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a mapping of command ids")
            }

            fn visit_map<M>(self, mut map: M) -> std::result::Result<Entries<V>, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    entries.push((key, map.next_value()?));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

fn yaml_to_json(yaml: serde_yaml::Value) -> Result<Value> {
    Ok(match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| LoadError::InvalidDocument(format!("unsupported number: {n}")))?
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(yaml_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_key(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(LoadError::InvalidDocument(format!(
            "unsupported mapping key: {other:?}"
        ))),
    }
}
