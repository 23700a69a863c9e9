use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::DocmergeError;
use crate::DocmergeResult;
use crate::generate::GenerateOptions;
use crate::mapping::Mapping;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = [
	"docmerge.toml",
	".docmerge.toml",
	".config/docmerge.toml",
];

/// Configuration loaded from `docmerge.toml`.
///
/// ```toml
/// template = "letter.docx"
/// data = "people.csv"
/// output = "letters.zip"
/// name_tag = "Name"
/// workers = 4
///
/// [mapping]
/// Name = "full_name"
/// Signature = ""
/// ```
///
/// Relative paths are resolved against the project root. A mapping entry
/// with an empty column leaves the tag unchanged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DocmergeConfig {
	/// Path to the `.docx` template.
	#[serde(default)]
	pub template: Option<PathBuf>,
	/// Path to the CSV data file.
	#[serde(default)]
	pub data: Option<PathBuf>,
	/// Path of the archive to write.
	#[serde(default)]
	pub output: Option<PathBuf>,
	/// Tag whose value names each generated document.
	#[serde(default)]
	pub name_tag: Option<String>,
	/// Number of worker threads.
	#[serde(default)]
	pub workers: Option<usize>,
	/// Tag to column overrides.
	#[serde(default)]
	pub mapping: BTreeMap<String, String>,
}

impl DocmergeConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> DocmergeResult<Option<DocmergeConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;

		Ok(Some(config))
	}

	pub fn parse(content: &str) -> DocmergeResult<DocmergeConfig> {
		toml::from_str(content).map_err(|e| DocmergeError::ConfigParse(e.to_string()))
	}

	/// Apply the `[mapping]` section on top of `mapping`.
	pub fn apply_mapping(&self, mapping: &mut Mapping) {
		for (tag, column) in &self.mapping {
			mapping.set(tag, column.as_str());
		}
	}

	pub fn generate_options(&self) -> GenerateOptions {
		GenerateOptions {
			name_tag: self.name_tag.clone(),
			workers: self.workers,
		}
	}
}
