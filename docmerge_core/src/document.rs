use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::ops::Deref;
use std::ops::DerefMut;
use std::ops::Range;

use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::DocmergeError;
use crate::DocmergeResult;
use crate::xml::XmlDocument;
use crate::xml::XmlElement;
use crate::xml::XmlNode;

/// Location of the main document part when the package relationships don't
/// name one.
pub const DEFAULT_MAIN_PART: &str = "word/document.xml";

const PACKAGE_RELATIONSHIPS: &str = "_rels/.rels";
const OFFICE_DOCUMENT_TYPE: &str = "/officeDocument";
const HEADER_TYPE: &str = "/header";
const FOOTER_TYPE: &str = "/footer";

/// Elements that wrap runs inside a paragraph without being runs
/// themselves. Deleted runs (`w:del`) are deliberately absent.
const RUN_WRAPPERS: [&str; 9] = [
	"w:hyperlink",
	"w:ins",
	"w:moveTo",
	"w:smartTag",
	"w:customXml",
	"w:fldSimple",
	"w:sdt",
	"w:sdtContent",
	"w:dir",
];

/// A shared or exclusive reference to an element of the document tree.
///
/// The structural views ([`Container`], [`Table`], [`Paragraph`], [`Run`])
/// are generic over this trait so that the same traversal serves read-only
/// extraction (`&XmlElement`) and in-place substitution (`&mut XmlElement`).
pub trait NodeRef: Deref<Target = XmlElement> + Sized {
	/// Split the reference into references to the child elements.
	fn into_elements(self) -> Vec<Self>;
}

impl NodeRef for &XmlElement {
	fn into_elements(self) -> Vec<Self> {
		self.elements().collect()
	}
}

impl NodeRef for &mut XmlElement {
	fn into_elements(self) -> Vec<Self> {
		self.elements_mut().collect()
	}
}

/// Child elements with block and row level content controls (`w:sdt`) and
/// custom XML wrappers replaced by their content.
fn expand<E: NodeRef>(element: E) -> Vec<E> {
	let mut expanded = Vec::new();

	for child in element.into_elements() {
		if child.is("w:sdt") {
			if let Some(content) = child
				.into_elements()
				.into_iter()
				.find(|element| element.is("w:sdtContent"))
			{
				expanded.extend(expand(content));
			}
		} else if child.is("w:customXml") {
			expanded.extend(expand(child));
		} else {
			expanded.push(child);
		}
	}

	expanded
}

/// Kind of a parsed package part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
	Body,
	Header,
	Footer,
}

/// A structural scope holding paragraphs and tables: the document body, a
/// header, a footer or a table cell.
#[derive(Debug)]
pub struct Container<E> {
	element: E,
}

/// A paragraph or table inside a [`Container`].
#[derive(Debug)]
pub enum Block<E> {
	Paragraph(Paragraph<E>),
	Table(Table<E>),
}

impl<E: NodeRef> Container<E> {
	pub fn new(element: E) -> Self {
		Self { element }
	}

	/// Paragraphs and tables in document order.
	pub fn into_blocks(self) -> Vec<Block<E>> {
		let mut blocks = Vec::new();

		for element in expand(self.element) {
			if element.is("w:p") {
				blocks.push(Block::Paragraph(Paragraph { element }));
			} else if element.is("w:tbl") {
				blocks.push(Block::Table(Table { element }));
			}
		}

		blocks
	}
}

#[derive(Debug)]
pub struct Table<E> {
	element: E,
}

impl<E: NodeRef> Table<E> {
	pub fn into_rows(self) -> Vec<TableRow<E>> {
		expand(self.element)
			.into_iter()
			.filter(|element| element.is("w:tr"))
			.map(|element| TableRow { element })
			.collect()
	}
}

#[derive(Debug)]
pub struct TableRow<E> {
	element: E,
}

impl<E: NodeRef> TableRow<E> {
	pub fn into_cells(self) -> Vec<Container<E>> {
		expand(self.element)
			.into_iter()
			.filter(|element| element.is("w:tc"))
			.map(Container::new)
			.collect()
	}
}

/// Visit every paragraph of `container` in document order, descending
/// depth first into every table cell.
///
/// This is the only traversal of the structural tree: extraction and
/// substitution both go through it for the body, headers and footers.
pub fn visit_paragraphs<E: NodeRef>(container: Container<E>, visit: &mut impl FnMut(Paragraph<E>)) {
	for block in container.into_blocks() {
		match block {
			Block::Paragraph(paragraph) => visit(paragraph),
			Block::Table(table) => {
				for row in table.into_rows() {
					for cell in row.into_cells() {
						visit_paragraphs(cell, visit);
					}
				}
			}
		}
	}
}

/// An ordered sequence of runs.
#[derive(Debug)]
pub struct Paragraph<E> {
	element: E,
}

impl<E: NodeRef> Paragraph<E> {
	/// Runs in document order, including runs nested in hyperlinks, tracked
	/// insertions, fields and inline content controls.
	pub fn into_runs(self) -> Vec<Run<E>> {
		let mut runs = Vec::new();
		collect_runs(self.element, &mut runs);
		runs
	}

	/// The visible text: the concatenated text of all runs.
	pub fn text(&self) -> String {
		Paragraph {
			element: &*self.element,
		}
		.into_runs()
		.iter()
		.map(Run::text)
		.collect()
	}
}

fn collect_runs<E: NodeRef>(element: E, runs: &mut Vec<Run<E>>) {
	for child in element.into_elements() {
		if child.is("w:r") {
			runs.push(Run { element: child });
		} else if RUN_WRAPPERS.contains(&child.name.as_str()) {
			collect_runs(child, runs);
		}
	}
}

/// Formatting shared by every character of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFormat {
	pub bold: bool,
	pub italic: bool,
	pub underline: bool,
	pub font: Option<String>,
	/// Font size in half-points, as stored in `w:sz`.
	pub size: Option<u32>,
}

/// A span of text sharing one [`RunFormat`].
#[derive(Debug)]
pub struct Run<E> {
	element: E,
}

impl<E: NodeRef> Run<E> {
	/// Text content. Tabs read as `\t`, line breaks and carriage returns as
	/// `\n`, non-breaking hyphens as `-`.
	pub fn text(&self) -> String {
		self.element
			.elements()
			.filter_map(segment_text)
			.collect()
	}

	pub fn format(&self) -> RunFormat {
		let Some(properties) = self.element.child("w:rPr") else {
			return RunFormat::default();
		};

		let toggle = |name: &str| {
			properties.child(name).is_some_and(|element| {
				element
					.attribute("w:val")
					.is_none_or(|value| !matches!(value, "0" | "false" | "off"))
			})
		};

		RunFormat {
			bold: toggle("w:b"),
			italic: toggle("w:i"),
			underline: properties
				.child("w:u")
				.is_some_and(|element| element.attribute("w:val") != Some("none")),
			font: properties.child("w:rFonts").and_then(|fonts| {
				["w:ascii", "w:hAnsi", "w:cs"]
					.iter()
					.find_map(|name| fonts.attribute(name))
					.map(ToString::to_string)
			}),
			size: properties
				.child("w:sz")
				.and_then(|size| size.attribute("w:val"))
				.and_then(|value| value.parse().ok()),
		}
	}
}

impl<E: NodeRef + DerefMut> Run<E> {
	/// Replace the bytes `range` of [`Run::text`] with `value` and return the
	/// length of the text actually inserted.
	///
	/// Text outside `range` keeps its elements, and non-text children
	/// (drawings, page breaks, field characters) keep their position among
	/// them. Characters XML cannot carry are dropped from `value`; tabs and
	/// line breaks in it become `w:tab` and `w:br`.
	pub fn splice_text(&mut self, range: Range<usize>, value: &str) -> usize {
		let value = writable_text(value);
		let element: &mut XmlElement = &mut self.element;
		let segments = text_segments(element);
		let insertion = insertion_point(&segments, range.start, element.children.len());
		let mut edits: BTreeMap<usize, Option<String>> = BTreeMap::new();

		for segment in &segments {
			let overlaps = segment.start < range.end && range.start < segment.end;
			let anchor = match insertion {
				Insertion::Within { child, offset } if child == segment.child => Some(offset),
				_ => None,
			};

			if !overlaps && anchor.is_none() {
				continue;
			}

			if !segment.is_text {
				edits.insert(segment.child, None);
				continue;
			}

			let current = element.children[segment.child]
				.as_element()
				.map(XmlElement::text)
				.unwrap_or_default();
			let from = range.start.clamp(segment.start, segment.end) - segment.start;
			let to = range.end.clamp(segment.start, segment.end) - segment.start;
			let mut text = format!("{}{}", &current[..from], &current[to..]);
			if let Some(offset) = anchor {
				text.insert_str(offset, &value);
			}
			edits.insert(segment.child, Some(text));
		}

		let children = std::mem::take(&mut element.children);
		let count = children.len();

		for (index, node) in children.into_iter().enumerate() {
			if insertion == Insertion::Before(index) {
				element.children.extend(text_nodes(&value));
			}

			match edits.remove(&index) {
				Some(Some(text)) => element.children.extend(text_nodes(&text)),
				Some(None) => {}
				None => element.children.push(node),
			}
		}

		if insertion == Insertion::Before(count) {
			element.children.extend(text_nodes(&value));
		}

		value.len()
	}
}

/// Text of a run child that contributes to [`Run::text`].
fn segment_text(element: &XmlElement) -> Option<String> {
	match element.name.as_str() {
		"w:t" => Some(element.text()),
		"w:tab" => Some("\t".to_string()),
		"w:br" if is_text_break(element) => Some("\n".to_string()),
		"w:cr" => Some("\n".to_string()),
		"w:noBreakHyphen" => Some("-".to_string()),
		_ => None,
	}
}

fn is_text_break(element: &XmlElement) -> bool {
	element
		.attribute("w:type")
		.is_none_or(|kind| kind == "textWrapping")
}

/// A run child holding text, with its byte range in [`Run::text`].
#[derive(Debug, Clone, Copy)]
struct TextSegment {
	child: usize,
	start: usize,
	end: usize,
	/// `w:t`, as opposed to the one character elements.
	is_text: bool,
}

fn text_segments(element: &XmlElement) -> Vec<TextSegment> {
	let mut segments = Vec::new();
	let mut offset = 0;

	for (child, node) in element.children.iter().enumerate() {
		let Some(child_element) = node.as_element() else {
			continue;
		};
		let Some(text) = segment_text(child_element) else {
			continue;
		};

		segments.push(TextSegment {
			child,
			start: offset,
			end: offset + text.len(),
			is_text: child_element.is("w:t"),
		});
		offset += text.len();
	}

	segments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Insertion {
	/// Inside the text of the `w:t` child at `child`.
	Within { child: usize, offset: usize },
	/// As new elements in front of the child at this index.
	Before(usize),
}

fn insertion_point(segments: &[TextSegment], start: usize, children: usize) -> Insertion {
	if let Some(segment) = segments
		.iter()
		.find(|segment| segment.start <= start && start < segment.end)
	{
		return if segment.is_text {
			Insertion::Within {
				child: segment.child,
				offset: start - segment.start,
			}
		} else {
			Insertion::Before(segment.child)
		};
	}

	match segments.last() {
		Some(last) if last.is_text => {
			Insertion::Within {
				child: last.child,
				offset: last.end - last.start,
			}
		}
		Some(last) => Insertion::Before(last.child + 1),
		None => Insertion::Before(children),
	}
}

/// `text` without the characters XML 1.0 cannot represent. Carriage returns
/// are dropped too, so `\r\n` becomes a single line break.
fn writable_text(text: &str) -> String {
	text.chars()
		.filter(|ch| {
			matches!(ch, '\t' | '\n') || (*ch >= ' ' && !matches!(ch, '\u{fffe}' | '\u{ffff}'))
		})
		.collect()
}

fn text_nodes(text: &str) -> Vec<XmlNode> {
	fn flush(buffer: &mut String, nodes: &mut Vec<XmlNode>) {
		if buffer.is_empty() {
			return;
		}

		let mut element = XmlElement::new("w:t");
		if buffer.starts_with(char::is_whitespace) || buffer.ends_with(char::is_whitespace) {
			element.set_attribute("xml:space", "preserve");
		}
		nodes.push(XmlNode::Element(element.with_text(std::mem::take(buffer))));
	}

	let mut nodes = Vec::new();
	let mut buffer = String::new();

	for ch in text.chars() {
		match ch {
			'\t' => {
				flush(&mut buffer, &mut nodes);
				nodes.push(XmlNode::Element(XmlElement::new("w:tab")));
			}
			'\n' => {
				flush(&mut buffer, &mut nodes);
				nodes.push(XmlNode::Element(XmlElement::new("w:br")));
			}
			_ => buffer.push(ch),
		}
	}
	flush(&mut buffer, &mut nodes);

	nodes
}

/// A section of the body and the header and footer parts it references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
	/// Package paths of the referenced headers (default, first and even).
	pub headers: Vec<String>,
	/// Package paths of the referenced footers (default, first and even).
	pub footers: Vec<String>,
}

#[derive(Debug, Clone)]
struct PackageEntry {
	name: String,
	data: Vec<u8>,
	is_dir: bool,
}

#[derive(Debug, Clone)]
struct Part {
	/// Index of the package entry this part was parsed from.
	entry: usize,
	kind: ContainerKind,
	xml: XmlDocument,
}

/// An in-memory `.docx` package with its main document part and every
/// header and footer part reachable from its sections parsed.
#[derive(Debug, Clone)]
pub struct Document {
	entries: Vec<PackageEntry>,
	/// The main document part first, then headers and footers in order of
	/// first reference. Parts shared by several sections appear once.
	parts: Vec<Part>,
	sections: Vec<Section>,
}

impl Document {
	/// Parse a `.docx` package.
	pub fn from_bytes(bytes: &[u8]) -> DocmergeResult<Self> {
		let entries = read_entries(bytes)?;
		let main_name = main_part_name(&entries)?;
		let main_index = entry_index(&entries, &main_name).ok_or_else(|| {
			DocmergeError::MalformedTemplate(format!("missing main document part `{main_name}`"))
		})?;
		let main_xml = parse_entry(&entries[main_index])?;

		if main_xml
			.root()
			.and_then(|root| root.child("w:body"))
			.is_none()
		{
			return Err(DocmergeError::MalformedTemplate(format!(
				"`{main_name}` has no document body"
			)));
		}

		let relationships = read_relationships(&entries, &main_name)?;
		let sections = collect_sections(&main_xml, &relationships);
		let mut parts = vec![Part {
			entry: main_index,
			kind: ContainerKind::Body,
			xml: main_xml,
		}];

		for section in &sections {
			let referenced = section
				.headers
				.iter()
				.map(|name| (name, ContainerKind::Header))
				.chain(
					section
						.footers
						.iter()
						.map(|name| (name, ContainerKind::Footer)),
				);

			for (name, kind) in referenced {
				let index = entry_index(&entries, name).ok_or_else(|| {
					DocmergeError::MalformedTemplate(format!("missing {kind:?} part `{name}`"))
				})?;

				if parts.iter().any(|part| part.entry == index) {
					continue;
				}

				parts.push(Part {
					entry: index,
					kind,
					xml: parse_entry(&entries[index])?,
				});
			}
		}

		Ok(Self {
			entries,
			parts,
			sections,
		})
	}

	/// Serialize the package. Entries keep their original order; entries
	/// other than the parsed parts are copied unchanged.
	pub fn to_bytes(&self) -> DocmergeResult<Vec<u8>> {
		let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
		let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
		let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

		for (index, entry) in self.entries.iter().enumerate() {
			if entry.is_dir {
				writer.add_directory(entry.name.as_str(), deflated)?;
				continue;
			}

			let options = if entry.name.starts_with("word/media/") {
				stored
			} else {
				deflated
			};
			writer.start_file(entry.name.as_str(), options)?;

			match self.parts.iter().find(|part| part.entry == index) {
				Some(part) => writer.write_all(part.xml.to_xml().as_bytes())?,
				None => writer.write_all(&entry.data)?,
			}
		}

		Ok(writer.finish()?.into_inner())
	}

	pub fn sections(&self) -> &[Section] {
		&self.sections
	}

	/// The body followed by every header and footer, each exactly once.
	pub fn containers(&self) -> Vec<Container<&XmlElement>> {
		self.parts
			.iter()
			.filter_map(|part| part_container(part.kind, part.xml.root()?))
			.collect()
	}

	pub fn containers_mut(&mut self) -> Vec<Container<&mut XmlElement>> {
		self.parts
			.iter_mut()
			.filter_map(|part| part_container(part.kind, part.xml.root_mut()?))
			.collect()
	}

	/// Visit every paragraph of every container.
	pub fn visit_paragraphs<'a>(&'a self, visit: &mut impl FnMut(Paragraph<&'a XmlElement>)) {
		for container in self.containers() {
			visit_paragraphs(container, visit);
		}
	}

	pub fn visit_paragraphs_mut<'a>(
		&'a mut self,
		visit: &mut impl FnMut(Paragraph<&'a mut XmlElement>),
	) {
		for container in self.containers_mut() {
			visit_paragraphs(container, visit);
		}
	}
}

fn part_container<E: NodeRef>(kind: ContainerKind, root: E) -> Option<Container<E>> {
	match kind {
		ContainerKind::Body => {
			root.into_elements()
				.into_iter()
				.find(|element| element.is("w:body"))
				.map(Container::new)
		}
		ContainerKind::Header | ContainerKind::Footer => Some(Container::new(root)),
	}
}

fn read_entries(bytes: &[u8]) -> DocmergeResult<Vec<PackageEntry>> {
	let malformed = |error: zip::result::ZipError| DocmergeError::MalformedTemplate(error.to_string());
	let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(malformed)?;
	let mut entries = Vec::with_capacity(archive.len());

	for index in 0..archive.len() {
		let mut file = archive.by_index(index).map_err(malformed)?;
		let mut data = Vec::new();
		file.read_to_end(&mut data).map_err(|e| {
			DocmergeError::MalformedTemplate(format!("cannot read `{}`: {e}", file.name()))
		})?;
		entries.push(PackageEntry {
			name: file.name().to_string(),
			data,
			is_dir: file.is_dir(),
		});
	}

	Ok(entries)
}

fn entry_index(entries: &[PackageEntry], name: &str) -> Option<usize> {
	entries.iter().position(|entry| entry.name == name)
}

fn parse_entry(entry: &PackageEntry) -> DocmergeResult<XmlDocument> {
	let source = std::str::from_utf8(&entry.data).map_err(|e| {
		DocmergeError::MalformedTemplate(format!("`{}` is not valid UTF-8: {e}", entry.name))
	})?;

	XmlDocument::parse(&entry.name, source.trim_start_matches('\u{feff}'))
		.map_err(|e| DocmergeError::MalformedTemplate(e.to_string()))
}

fn main_part_name(entries: &[PackageEntry]) -> DocmergeResult<String> {
	let Some(index) = entry_index(entries, PACKAGE_RELATIONSHIPS) else {
		return Ok(DEFAULT_MAIN_PART.to_string());
	};

	let relationships = parse_relationships(&parse_entry(&entries[index])?, "");
	Ok(relationships
		.into_values()
		.find(|relationship| relationship.kind.ends_with(OFFICE_DOCUMENT_TYPE))
		.map_or_else(|| DEFAULT_MAIN_PART.to_string(), |relationship| relationship.target))
}

#[derive(Debug, Clone)]
struct Relationship {
	kind: String,
	/// Package path of the target part.
	target: String,
}

fn read_relationships(
	entries: &[PackageEntry],
	part: &str,
) -> DocmergeResult<HashMap<String, Relationship>> {
	let (directory, file) = part.rsplit_once('/').unwrap_or(("", part));
	let rels_name = if directory.is_empty() {
		format!("_rels/{file}.rels")
	} else {
		format!("{directory}/_rels/{file}.rels")
	};

	let Some(index) = entry_index(entries, &rels_name) else {
		return Ok(HashMap::new());
	};

	Ok(parse_relationships(&parse_entry(&entries[index])?, directory))
}

fn parse_relationships(xml: &XmlDocument, directory: &str) -> HashMap<String, Relationship> {
	let Some(root) = xml.root() else {
		return HashMap::new();
	};

	root.elements()
		.filter(|element| element.is("Relationship"))
		.filter(|element| element.attribute("TargetMode") != Some("External"))
		.filter_map(|element| {
			let id = element.attribute("Id")?;
			let kind = element.attribute("Type")?;
			let target = element.attribute("Target")?;

			Some((
				id.to_string(),
				Relationship {
					kind: kind.to_string(),
					target: resolve_target(directory, target),
				},
			))
		})
		.collect()
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(directory: &str, target: &str) -> String {
	let joined = match target.strip_prefix('/') {
		Some(absolute) => absolute.to_string(),
		None if directory.is_empty() => target.to_string(),
		None => format!("{directory}/{target}"),
	};

	let mut segments: Vec<&str> = Vec::new();
	for segment in joined.split('/') {
		match segment {
			"" | "." => {}
			".." => {
				segments.pop();
			}
			segment => segments.push(segment),
		}
	}

	segments.join("/")
}

fn collect_sections(main: &XmlDocument, relationships: &HashMap<String, Relationship>) -> Vec<Section> {
	let Some(body) = main.root().and_then(|root| root.child("w:body")) else {
		return Vec::new();
	};

	let resolve = |reference: &XmlElement, kind: &str| {
		reference
			.attributes
			.iter()
			.find(|(key, _)| key.ends_with(":id"))
			.and_then(|(_, id)| relationships.get(id))
			.filter(|relationship| relationship.kind.ends_with(kind))
			.map(|relationship| relationship.target.clone())
	};

	expand(body)
		.into_iter()
		.filter_map(|element| {
			if element.is("w:sectPr") {
				Some(element)
			} else if element.is("w:p") {
				element
					.child("w:pPr")
					.and_then(|properties| properties.child("w:sectPr"))
			} else {
				None
			}
		})
		.map(|properties| {
			Section {
				headers: properties
					.elements()
					.filter(|element| element.is("w:headerReference"))
					.filter_map(|reference| resolve(reference, HEADER_TYPE))
					.collect(),
				footers: properties
					.elements()
					.filter(|element| element.is("w:footerReference"))
					.filter_map(|reference| resolve(reference, FOOTER_TYPE))
					.collect(),
			}
		})
		.collect()
}
