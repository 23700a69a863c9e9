use std::io::Cursor;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::DocmergeError;
use crate::DocmergeResult;
use crate::document::Document;
use crate::mapping::DataRow;
use crate::mapping::Dataset;
use crate::mapping::Mapping;
use crate::normalize;
use crate::substitute::substitute;

/// Upper bound for the default number of worker threads.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// File name used for the archive when none is configured.
pub const DEFAULT_ARCHIVE_NAME: &str = "documents.zip";

const FALLBACK_STEM: &str = "document";
const DOCX_EXTENSION: &str = "docx";

/// An immutable `.docx` template. Every generated document is parsed from
/// these bytes independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
	name: String,
	bytes: Vec<u8>,
}

impl Template {
	pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
		Self {
			name: name.into(),
			bytes,
		}
	}

	/// Read a template from disk, named after its file name.
	pub fn from_path(path: impl AsRef<Path>) -> DocmergeResult<Self> {
		let path = path.as_ref();
		let bytes = std::fs::read(path)?;
		let name = path
			.file_name()
			.map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());

		Ok(Self::new(name, bytes))
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Parse a fresh document from the template bytes.
	pub fn instantiate(&self) -> DocmergeResult<Document> {
		Document::from_bytes(&self.bytes)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
	/// Tag whose row value names each generated file.
	pub name_tag: Option<String>,
	/// Number of worker threads. Defaults to the available parallelism capped
	/// at [`DEFAULT_MAX_WORKERS`].
	pub workers: Option<usize>,
}

impl GenerateOptions {
	pub fn worker_count(&self) -> usize {
		self.workers
			.unwrap_or_else(|| {
				std::thread::available_parallelism()
					.map_or(1, NonZeroUsize::get)
					.min(DEFAULT_MAX_WORKERS)
			})
			.max(1)
	}
}

/// A rendered document for one dataset row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
	/// Zero based index of the row in the dataset.
	pub index: usize,
	pub file_name: String,
	pub bytes: Vec<u8>,
}

/// A row that could not be rendered.
#[derive(Debug)]
pub struct RowFailure {
	pub index: usize,
	pub error: DocmergeError,
}

/// Result of a batch: generated documents and failed rows, both in dataset
/// order.
#[derive(Debug, Default)]
pub struct Archive {
	pub documents: Vec<GeneratedDocument>,
	pub failures: Vec<RowFailure>,
}

impl Archive {
	pub fn is_complete(&self) -> bool {
		self.failures.is_empty()
	}

	/// Package the documents into a zip archive in row order. Duplicate file
	/// names are written as they are.
	pub fn to_zip(&self) -> DocmergeResult<Vec<u8>> {
		let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
		let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

		for document in &self.documents {
			writer.start_file(document.file_name.as_str(), options)?;
			writer.write_all(&document.bytes)?;
		}

		Ok(writer.finish()?.into_inner())
	}
}

/// Render one document per dataset row.
///
/// The template is parsed once up front and a malformed template fails the
/// whole batch. Rows are then rendered in parallel, each from its own parse
/// of the template. A failing row is recorded in [`Archive::failures`] and
/// does not stop the others.
#[instrument(skip_all, fields(template = %template.name(), rows = dataset.len()))]
pub fn generate(
	template: &Template,
	mapping: &Mapping,
	dataset: &Dataset,
	options: &GenerateOptions,
) -> DocmergeResult<Archive> {
	template.instantiate()?;

	let workers = options.worker_count();
	let pool = ThreadPoolBuilder::new()
		.num_threads(workers)
		.build()
		.map_err(|e| DocmergeError::WorkerPool(e.to_string()))?;
	let name_tag = options.name_tag.as_deref().map(normalize);

	debug!(workers, "rendering rows");

	let results: Vec<DocmergeResult<GeneratedDocument>> = pool.install(|| {
		dataset
			.rows()
			.par_iter()
			.enumerate()
			.map(|(index, row)| render_row(template, mapping, row, index, name_tag.as_deref()))
			.collect()
	});

	let mut archive = Archive::default();
	for (index, result) in results.into_iter().enumerate() {
		match result {
			Ok(document) => archive.documents.push(document),
			Err(error) => {
				warn!(index, %error, "row failed");
				archive.failures.push(RowFailure { index, error });
			}
		}
	}

	info!(
		generated = archive.documents.len(),
		failed = archive.failures.len(),
		"batch finished"
	);

	Ok(archive)
}

fn render_row(
	template: &Template,
	mapping: &Mapping,
	row: &DataRow,
	index: usize,
	name_tag: Option<&str>,
) -> DocmergeResult<GeneratedDocument> {
	let mut document = template.instantiate()?;
	let report = substitute(&mut document, mapping, row)?;
	let bytes = document.to_bytes()?;

	let name_value = name_tag
		.and_then(|tag| mapping.column_for(tag))
		.and_then(|column| row.get(column).map(|value| value.to_text(column)))
		.transpose()?;
	let file_name = output_file_name(template.name(), index, name_value.as_deref());

	debug!(index, %file_name, replacements = report.replacements, "rendered row");

	Ok(GeneratedDocument {
		index,
		file_name,
		bytes,
	})
}

/// File name of the document generated for row `index`.
///
/// Uses the name value when it is non-empty, otherwise the template stem.
///
/// ```
/// use docmerge_core::output_file_name;
///
/// assert_eq!(output_file_name("letter.docx", 0, Some("Alice")), "Alice_0.docx");
/// assert_eq!(output_file_name("letter.docx", 1, None), "letter_1.docx");
/// assert_eq!(output_file_name("letter.docx", 2, Some("a/b")), "a_b_2.docx");
/// ```
pub fn output_file_name(template_name: &str, index: usize, name_value: Option<&str>) -> String {
	let base = name_value
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map_or_else(|| template_stem(template_name), sanitize_file_name);

	format!("{base}_{index}.{DOCX_EXTENSION}")
}

fn template_stem(name: &str) -> String {
	Path::new(name)
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.filter(|stem| !stem.is_empty())
		.unwrap_or_else(|| FALLBACK_STEM.to_string())
}

fn sanitize_file_name(value: &str) -> String {
	value
		.chars()
		.map(|ch| {
			if ch.is_control() || matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
				'_'
			} else {
				ch
			}
		})
		.collect()
}
