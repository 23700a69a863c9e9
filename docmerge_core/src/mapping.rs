use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use derive_more::Deref;

use crate::DocmergeError;
use crate::DocmergeResult;
use crate::normalize;

/// What a tag is replaced with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum MappingTarget {
	/// Replace the tag with the value of this column.
	Column(String),
	/// Keep the tag's literal text in the output.
	#[default]
	LeaveUnchanged,
}

impl MappingTarget {
	pub fn column(&self) -> Option<&str> {
		match self {
			Self::Column(column) => Some(column.as_str()),
			Self::LeaveUnchanged => None,
		}
	}
}

impl From<&str> for MappingTarget {
	/// An empty column name means the tag is left unchanged.
	fn from(column: &str) -> Self {
		if column.is_empty() {
			Self::LeaveUnchanged
		} else {
			Self::Column(column.to_string())
		}
	}
}

static LEAVE_UNCHANGED: MappingTarget = MappingTarget::LeaveUnchanged;

/// Association from tags to data columns.
///
/// Tags are stored normalized. Tags that were never set resolve to
/// [`MappingTarget::LeaveUnchanged`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
	entries: BTreeMap<String, MappingTarget>,
}

impl Mapping {
	pub fn new() -> Self {
		Self::default()
	}

	/// A mapping that pairs each tag with the column of the same name when
	/// one exists. Column names are compared after normalization.
	pub fn with_defaults<'a>(
		tags: impl IntoIterator<Item = &'a String>,
		columns: &[String],
	) -> Self {
		let columns: HashMap<String, &String> = columns
			.iter()
			.map(|column| (normalize(column), column))
			.collect();

		let entries = tags
			.into_iter()
			.map(|tag| {
				let tag = normalize(tag);
				let target = columns
					.get(&tag)
					.map_or(MappingTarget::LeaveUnchanged, |column| {
						MappingTarget::Column((*column).clone())
					});
				(tag, target)
			})
			.collect();

		Self { entries }
	}

	pub fn set(&mut self, tag: &str, target: impl Into<MappingTarget>) {
		self.entries.insert(normalize(tag), target.into());
	}

	#[must_use]
	pub fn with(mut self, tag: &str, target: impl Into<MappingTarget>) -> Self {
		self.set(tag, target);
		self
	}

	pub fn target(&self, tag: &str) -> &MappingTarget {
		self.entries.get(tag).unwrap_or(&LEAVE_UNCHANGED)
	}

	pub fn column_for(&self, tag: &str) -> Option<&str> {
		self.target(tag).column()
	}

	/// Resolve the replacement text of every mapped tag against `row`.
	///
	/// Tags whose column is absent from the row are omitted and therefore
	/// left unchanged. Fails when a present value cannot be stringified.
	pub fn resolve(&self, row: &DataRow) -> DocmergeResult<BTreeMap<String, String>> {
		let mut values = BTreeMap::new();

		for (tag, target) in &self.entries {
			let Some(column) = target.column() else {
				continue;
			};
			let Some(value) = row.get(column) else {
				continue;
			};

			values.insert(tag.clone(), value.to_text(column)?);
		}

		Ok(values)
	}
}

impl<'a> IntoIterator for &'a Mapping {
	type IntoIter = std::collections::btree_map::Iter<'a, String, MappingTarget>;
	type Item = (&'a String, &'a MappingTarget);

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}

/// A single cell of a data row.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
	#[default]
	Empty,
	Text(String),
	Integer(i64),
	Float(f64),
	Bool(bool),
}

impl CellValue {
	/// The text a placeholder is replaced with. Integral floats are written
	/// without a fractional part.
	pub fn to_text(&self, column: &str) -> DocmergeResult<String> {
		match self {
			Self::Empty => Ok(String::new()),
			Self::Text(text) => Ok(text.clone()),
			Self::Integer(value) => Ok(value.to_string()),
			Self::Bool(value) => Ok(value.to_string()),
			Self::Float(value) if value.is_finite() => Ok(value.to_string()),
			Self::Float(value) => {
				Err(DocmergeError::UnstringifiableValue {
					column: column.to_string(),
					value: value.to_string(),
				})
			}
		}
	}
}

impl fmt::Display for CellValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty => Ok(()),
			Self::Text(text) => f.write_str(text),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::Bool(value) => write!(f, "{value}"),
		}
	}
}

impl From<&str> for CellValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<String> for CellValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}

impl From<i64> for CellValue {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}

impl From<f64> for CellValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<bool> for CellValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// One record of a dataset, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
	values: HashMap<String, CellValue>,
}

impl DataRow {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
		self.insert(column, value);
		self
	}

	pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
		self.values.insert(column.into(), value.into());
	}

	pub fn get(&self, column: &str) -> Option<&CellValue> {
		self.values.get(column)
	}
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for DataRow {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let values = iter
			.into_iter()
			.map(|(column, value)| (column.into(), value.into()))
			.collect();

		Self { values }
	}
}

/// Ordered column names and rows. Dereferences to the rows.
#[derive(Debug, Clone, Default, PartialEq, Deref)]
pub struct Dataset {
	columns: Vec<String>,
	#[deref]
	rows: Vec<DataRow>,
}

impl Dataset {
	pub fn new(columns: Vec<String>, rows: Vec<DataRow>) -> Self {
		Self { columns, rows }
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub fn rows(&self) -> &[DataRow] {
		&self.rows
	}

	pub fn push(&mut self, row: DataRow) {
		self.rows.push(row);
	}
}
