//! File loading and configuration for `oas-toolkit`.
//!
//! This crate reads API descriptions and layout files (JSON or YAML, chosen
//! by extension) into the value types of `oas-toolkit-core`, and loads the
//! optional YAML tool configuration.
//!
//! # Quick start
//!
//! ```no_run
//! use oas_toolkit_core::{CompileOptions, ResolvedModel, compile_layout};
//! use oas_toolkit_loader::{ToolConfig, load_document, load_layout};
//!
//! let config = ToolConfig::load_or_default(None).unwrap();
//! let model = ResolvedModel::build(&load_document("openapi.yaml").unwrap());
//! let layout = load_layout("layout.yaml").unwrap();
//!
//! let options = CompileOptions::with_start(&config.layout.start);
//! match compile_layout(&layout, &model, &options) {
//!     Ok(compiled) => println!("{} operations bound", compiled.tree.operation_ids().len()),
//!     Err(errors) => eprintln!("{errors}"),
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::{DEFAULT_CONFIG_FILE, LayoutConfig, ToolConfig};
pub use error::{LoadError, Result};
pub use loader::{
    DocumentFormat, load_document, load_layout, load_layout_value, read_value, save_document,
};
