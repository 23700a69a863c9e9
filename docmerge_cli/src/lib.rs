use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Generate one document per data row from a docx template.",
	long_about = "docmerge fills `{{ Tag }}` placeholders in a .docx template with values from a \
	              CSV file or spreadsheet and bundles one generated document per row into a zip archive.\n\nThe \
	              placeholders keep the formatting of the text they replace, even when the word \
	              processor split them across differently formatted runs.\n\nQuick start:\n  \
	              docmerge init       Create a sample docmerge.toml\n  docmerge tags T     List \
	              the tags used by template T\n  docmerge generate   Render every row into an \
	              archive"
)]
pub struct DocmergeCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory. `docmerge.toml` is discovered here
	/// and relative paths from it are resolved against it.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Initialize docmerge in a project by creating a sample `docmerge.toml`.
	///
	/// If the file already exists, this command is a no-op and exits
	/// successfully.
	Init,
	/// List the tags used by a template.
	///
	/// Tags are collected from the body, every table cell (nested tables
	/// included), and every header and footer. They are printed once each in
	/// alphabetical order. Templates using `{% if %}` or `{% for %}` blocks are
	/// reported, since those blocks are copied to the output unrendered.
	Tags {
		/// The `.docx` template to inspect. Defaults to `template` from
		/// `docmerge.toml`.
		template: Option<PathBuf>,

		/// Output format. Use `text` for human-readable output or `json` for
		/// programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Render one document per row of a CSV file or spreadsheet.
	///
	/// Each tag is replaced with the column of the same name unless
	/// `[mapping]` in `docmerge.toml` or `--map` says otherwise. Tags without a
	/// column are left unchanged. Rows that fail are reported and skipped; the
	/// command then exits with status 1.
	Generate {
		/// The `.docx` template.
		#[arg(long, short)]
		template: Option<PathBuf>,

		/// The data file holding one row per document: CSV, or an Excel or
		/// OpenDocument spreadsheet (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`,
		/// `.ods`) whose first worksheet is read. The first row names the
		/// columns.
		#[arg(long, short)]
		data: Option<PathBuf>,

		/// Map a tag to a column as `TAG=COLUMN`. Use `TAG=` to leave the tag
		/// unchanged. Can be repeated.
		#[arg(long = "map", short, value_name = "TAG=COLUMN", value_parser = parse_mapping)]
		mappings: Vec<(String, String)>,

		/// Tag whose value names each generated file. Files are otherwise
		/// named after the template.
		#[arg(long)]
		name_tag: Option<String>,

		/// Number of documents rendered in parallel.
		#[arg(long)]
		workers: Option<usize>,

		/// Path of the zip archive to write. Defaults to `documents.zip`.
		#[arg(long, short)]
		output: Option<PathBuf>,

		/// Output format for the summary.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}

/// Parse a `TAG=COLUMN` pair.
pub fn parse_mapping(value: &str) -> Result<(String, String), String> {
	let Some((tag, column)) = value.split_once('=') else {
		return Err(format!("expected `TAG=COLUMN`, found `{value}`"));
	};

	let tag = tag.trim();
	if tag.is_empty() {
		return Err(format!("missing tag name in `{value}`"));
	}

	Ok((tag.to_string(), column.trim().to_string()))
}
