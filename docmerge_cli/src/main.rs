use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use calamine::Data;
use calamine::DataType;
use calamine::Reader;
use calamine::open_workbook_auto;
use clap::Parser;
use docmerge_cli::Commands;
use docmerge_cli::DocmergeCli;
use docmerge_cli::OutputFormat;
use docmerge_core::Archive;
use docmerge_core::CellValue;
use docmerge_core::DEFAULT_ARCHIVE_NAME;
use docmerge_core::DataRow;
use docmerge_core::Dataset;
use docmerge_core::DocmergeConfig;
use docmerge_core::GenerateOptions;
use docmerge_core::Mapping;
use docmerge_core::Template;
use docmerge_core::extract;
use docmerge_core::generate;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
	let args = DocmergeCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Tags { template, format }) => run_tags(&args, template.as_deref(), *format),
		Some(Commands::Generate {
			template,
			data,
			mappings,
			name_tag,
			workers,
			output,
			format,
		}) => {
			let request = GenerateRequest {
				template: template.clone(),
				data: data.clone(),
				mappings: mappings.clone(),
				name_tag: name_tag.clone(),
				workers: *workers,
				output: output.clone(),
				format: *format,
			};
			run_generate(&args, request)
		}
		None => {
			eprintln!("No subcommand specified. Run `docmerge --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<docmerge_core::DocmergeError>() {
			Ok(docmerge_err) => {
				let report: miette::Report = (*docmerge_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "error" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.init();
}

fn resolve_root(args: &DocmergeCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config(root: &Path) -> CliResult<DocmergeConfig> {
	Ok(DocmergeConfig::load(root)?.unwrap_or_default())
}

/// Pick the command line value, falling back to the config value resolved
/// against the project root.
fn pick_path(flag: Option<&Path>, configured: Option<&Path>, root: &Path) -> Option<PathBuf> {
	flag.map(Path::to_path_buf)
		.or_else(|| configured.map(|path| root.join(path)))
}

fn run_init(args: &DocmergeCli) -> CliResult<()> {
	let root = resolve_root(args);
	let config_path = root.join("docmerge.toml");

	if let Some(existing) = DocmergeConfig::resolve_path(&root) {
		println!("Config file already exists: {}", existing.display());
		return Ok(());
	}

	let sample_config = "# docmerge configuration\n\n# The .docx template holding {{ Tag }} \
	                     placeholders.\ntemplate = \"template.docx\"\n\n# CSV file with one row \
	                     per generated document.\ndata = \"data.csv\"\n\n# Zip archive to \
	                     write.\noutput = \"documents.zip\"\n\n# Tag whose value names each \
	                     generated file.\n# name_tag = \"Name\"\n\n# Number of documents \
	                     rendered in parallel.\n# workers = 4\n\n# Tags are replaced with the \
	                     column of the same name.\n# Override the column here, or use an empty \
	                     string to leave a tag unchanged.\n[mapping]\n# Name = \"full_name\"\n# \
	                     Signature = \"\"\n";

	std::fs::write(&config_path, sample_config)?;
	println!("Created {}", config_path.display());

	println!();
	println!("Next steps:");
	println!("  1. Put {{{{ Tag }}}} placeholders in your .docx template");
	println!("  2. Run `docmerge tags template.docx` to see the tags it uses");
	println!("  3. Run `docmerge generate` to render one document per CSV row");

	Ok(())
}

fn run_tags(args: &DocmergeCli, template: Option<&Path>, format: OutputFormat) -> CliResult<()> {
	let root = resolve_root(args);
	let config = load_config(&root)?;
	let template_path = pick_path(template, config.template.as_deref(), &root)
		.ok_or("no template given: pass a path or set `template` in docmerge.toml")?;

	let template = Template::from_path(&template_path)?;
	let extraction = extract(&template.instantiate()?);

	match format {
		OutputFormat::Json => {
			let output = serde_json::json!({
				"template": template.name(),
				"tags": extraction.tags,
				"has_unsupported_blocks": extraction.has_unsupported_blocks,
			});
			println!("{output}");
		}
		OutputFormat::Text => {
			if extraction.tags.is_empty() {
				println!("No tags found in {}.", template.name());
			} else {
				println!(
					"{}",
					colored!(
						format!("{} tag(s) in {}:", extraction.tags.len(), template.name()),
						bold
					)
				);
				for tag in &extraction.tags {
					println!("  {tag}");
				}
			}

			if extraction.has_unsupported_blocks {
				eprintln!(
					"{} template uses {{% if %}} or {{% for %}} blocks; they are copied to the \
					 output unrendered",
					colored!("warning:", yellow)
				);
			}
		}
	}

	Ok(())
}

struct GenerateRequest {
	template: Option<PathBuf>,
	data: Option<PathBuf>,
	mappings: Vec<(String, String)>,
	name_tag: Option<String>,
	workers: Option<usize>,
	output: Option<PathBuf>,
	format: OutputFormat,
}

fn run_generate(args: &DocmergeCli, request: GenerateRequest) -> CliResult<()> {
	let root = resolve_root(args);
	let config = load_config(&root)?;

	let template_path = pick_path(request.template.as_deref(), config.template.as_deref(), &root)
		.ok_or("no template given: pass --template or set `template` in docmerge.toml")?;
	let data_path = pick_path(request.data.as_deref(), config.data.as_deref(), &root)
		.ok_or("no data given: pass --data or set `data` in docmerge.toml")?;
	let output_path = pick_path(request.output.as_deref(), config.output.as_deref(), &root)
		.unwrap_or_else(|| root.join(DEFAULT_ARCHIVE_NAME));

	let template = Template::from_path(&template_path)?;
	let extraction = extract(&template.instantiate()?);
	let dataset = load_dataset(&data_path)?;

	let mut mapping = Mapping::with_defaults(&extraction.tags, dataset.columns());
	config.apply_mapping(&mut mapping);
	for (tag, column) in &request.mappings {
		mapping.set(tag, column.as_str());
	}

	let defaults = config.generate_options();
	let options = GenerateOptions {
		name_tag: request.name_tag.or(defaults.name_tag),
		workers: request.workers.or(defaults.workers),
	};

	if extraction.has_unsupported_blocks && request.format == OutputFormat::Text {
		eprintln!(
			"{} template uses {{% if %}} or {{% for %}} blocks; they are copied to the output \
			 unrendered",
			colored!("warning:", yellow)
		);
	}

	let archive = generate(&template, &mapping, &dataset, &options)?;

	if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(&output_path, archive.to_zip()?)?;

	match request.format {
		OutputFormat::Json => print_generate_json(&archive, &output_path),
		OutputFormat::Text => print_generate_text(&archive, &mapping, &output_path, args.verbose),
	}

	if !archive.is_complete() {
		process::exit(1);
	}

	Ok(())
}

fn print_generate_json(archive: &Archive, output_path: &Path) {
	let documents: Vec<serde_json::Value> = archive
		.documents
		.iter()
		.map(|document| {
			serde_json::json!({
				"index": document.index,
				"file": document.file_name,
			})
		})
		.collect();
	let failures: Vec<serde_json::Value> = archive
		.failures
		.iter()
		.map(|failure| {
			serde_json::json!({
				"index": failure.index,
				"message": failure.error.to_string(),
			})
		})
		.collect();
	let output = serde_json::json!({
		"ok": archive.is_complete(),
		"output": output_path.display().to_string(),
		"documents": documents,
		"failures": failures,
	});

	println!("{output}");
}

fn print_generate_text(archive: &Archive, mapping: &Mapping, output_path: &Path, verbose: bool) {
	if verbose {
		eprintln!("Mapping:");
		for (tag, target) in mapping {
			match target.column() {
				Some(column) => eprintln!("  {tag} -> {column}"),
				None => eprintln!("  {tag} -> (unchanged)"),
			}
		}
	}

	println!(
		"{} {} document(s) into {}",
		colored!("Generated", green),
		archive.documents.len(),
		output_path.display()
	);

	if archive.failures.is_empty() {
		return;
	}

	eprintln!();
	eprintln!(
		"{}",
		colored!(format!("{} row(s) failed:", archive.failures.len()), red)
	);
	for failure in &archive.failures {
		eprintln!("  row {}: {}", failure.index, failure.error);
	}
}

/// Read the dataset, picking the format from the file extension. Anything
/// that is not a known spreadsheet extension is read as CSV.
fn load_dataset(path: &Path) -> CliResult<Dataset> {
	let extension = path
		.extension()
		.and_then(OsStr::to_str)
		.map(str::to_ascii_lowercase);

	match extension.as_deref() {
		Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => load_spreadsheet(path),
		_ => load_csv(path),
	}
}

/// Read a CSV file. Header names are trimmed and empty fields become
/// [`CellValue::Empty`].
fn load_csv(path: &Path) -> CliResult<Dataset> {
	let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
	let columns: Vec<String> = reader
		.headers()?
		.iter()
		.map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
		.collect();

	let mut dataset = Dataset::new(columns.clone(), Vec::new());
	for record in reader.records() {
		let record = record?;
		let row: DataRow = columns
			.iter()
			.zip(record.iter())
			.map(|(column, field)| (column.clone(), csv_value(field)))
			.collect();
		dataset.push(row);
	}

	Ok(dataset)
}

fn csv_value(field: &str) -> CellValue {
	if field.is_empty() {
		CellValue::Empty
	} else {
		CellValue::Text(field.to_string())
	}
}

/// Read the first worksheet of a spreadsheet. Its first row names the
/// columns; rows without any value are skipped.
fn load_spreadsheet(path: &Path) -> CliResult<Dataset> {
	let mut workbook = open_workbook_auto(path)?;
	let range = workbook
		.worksheet_range_at(0)
		.ok_or_else(|| format!("`{}` has no worksheet", path.display()))??;

	let mut rows = range.rows();
	let columns: Vec<String> = rows
		.next()
		.map(|header| header.iter().map(|cell| cell.to_string().trim().to_string()).collect())
		.unwrap_or_default();

	let mut dataset = Dataset::new(columns.clone(), Vec::new());
	for cells in rows {
		if cells.iter().all(|cell| matches!(cell, Data::Empty)) {
			continue;
		}

		let row: DataRow = columns
			.iter()
			.zip(cells)
			.map(|(column, cell)| (column.clone(), spreadsheet_value(cell)))
			.collect();
		dataset.push(row);
	}

	Ok(dataset)
}

/// Typed cell values keep their type so numbers are formatted by the
/// engine. Dates are written as `YYYY-MM-DD HH:MM:SS`.
fn spreadsheet_value(cell: &Data) -> CellValue {
	match cell {
		Data::Empty => CellValue::Empty,
		Data::String(text) if text.is_empty() => CellValue::Empty,
		Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
			CellValue::Text(text.clone())
		}
		Data::Int(value) => CellValue::Integer(*value),
		Data::Float(value) => CellValue::Float(*value),
		Data::Bool(value) => CellValue::Bool(*value),
		Data::DateTime(_) => {
			CellValue::Text(
				cell.as_datetime()
					.map_or_else(|| cell.to_string(), |value| value.to_string()),
			)
		}
		Data::Error(error) => CellValue::Text(error.to_string()),
	}
}
