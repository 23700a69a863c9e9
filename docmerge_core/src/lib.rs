//! `docmerge_core` is the core library of the docmerge document generator.
//! It reads `.docx` templates containing `{{ Tag }}` placeholders, lists the
//! tags they use and renders one document per data row by substituting the
//! placeholders in place, keeping the surrounding formatting.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template bytes
//!   → Document (zip package + parsed body, headers and footers)
//!   → Tag extraction (one traversal over paragraphs and nested tables)
//!   → Mapping (tag → column, built by the caller)
//!   → Substitution per row (placeholders split across runs are merged)
//!   → Archive (one generated document per row, zipped in row order)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration loading from `docmerge.toml`.
//! - [`document`]: the package model and the container traversal shared by
//!   extraction and substitution.
//! - [`xml`]: the lossless XML tree the package parts are parsed into.
//!
//! ## Key Types
//!
//! - [`Template`]: immutable template bytes; every row parses its own copy.
//! - [`Extraction`]: tags found in a template and whether it uses control
//!   blocks that are not rendered.
//! - [`Mapping`]: which column each tag is replaced with.
//! - [`Dataset`] and [`DataRow`]: the rows to render.
//! - [`Archive`]: generated documents and failed rows of a batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docmerge_core::{DataRow, Dataset, GenerateOptions, Mapping, Template, extract, generate};
//!
//! let template = Template::from_path("letter.docx").unwrap();
//! let extraction = extract(&template.instantiate().unwrap());
//!
//! let columns = vec!["Name".to_string()];
//! let mapping = Mapping::with_defaults(&extraction.tags, &columns);
//! let dataset = Dataset::new(columns, vec![DataRow::new().with("Name", "Alice")]);
//!
//! let archive = generate(&template, &mapping, &dataset, &GenerateOptions::default()).unwrap();
//! std::fs::write("documents.zip", archive.to_zip().unwrap()).unwrap();
//! ```

pub use config::*;
pub use document::Document;
pub use document::RunFormat;
pub use document::Section;
pub use error::*;
pub use extract::*;
pub use generate::*;
pub use mapping::*;
pub use normalize::fold;
pub use normalize::normalize;
pub use substitute::*;

pub mod config;
pub mod document;
#[allow(unused_assignments)]
mod error;
mod extract;
mod generate;
pub(crate) mod layout;
pub(crate) mod lexer;
mod mapping;
mod normalize;
mod substitute;
pub mod xml;

#[cfg(test)]
mod __fixtures;
