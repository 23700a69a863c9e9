use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum DocmergeError {
	#[error(transparent)]
	#[diagnostic(code(docmerge::io_error))]
	Io(#[from] std::io::Error),

	#[error("malformed template: {0}")]
	#[diagnostic(
		code(docmerge::malformed_template),
		help("the template must be a valid .docx package saved by a word processor")
	)]
	MalformedTemplate(String),

	#[error("invalid xml in `{part}`: {reason}")]
	#[diagnostic(code(docmerge::invalid_xml))]
	InvalidXml { part: String, reason: String },

	#[error("failed to write package: {0}")]
	#[diagnostic(code(docmerge::package))]
	Package(String),

	#[error("value of column `{column}` cannot be converted to text: {value}")]
	#[diagnostic(
		code(docmerge::unstringifiable_value),
		help("NaN and infinite numbers have no textual form; fix the cell in the data source")
	)]
	UnstringifiableValue { column: String, value: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(docmerge::config_parse),
		help("check that docmerge.toml is valid TOML with an optional [mapping] section")
	)]
	ConfigParse(String),

	#[error("failed to start worker pool: {0}")]
	#[diagnostic(code(docmerge::worker_pool))]
	WorkerPool(String),
}

impl From<zip::result::ZipError> for DocmergeError {
	fn from(error: zip::result::ZipError) -> Self {
		Self::Package(error.to_string())
	}
}

pub type DocmergeResult<T> = Result<T, DocmergeError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
