use std::io::Cursor;
use std::io::Read;
use std::io::Write;

use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::Document;
use crate::RunFormat;

pub const WORD_NAMESPACE: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const RELATIONSHIP_NAMESPACE: &str =
	"http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIP_NAMESPACE: &str =
	"http://schemas.openxmlformats.org/package/2006/relationships";
const RELATIONSHIP_TYPE_BASE: &str =
	"http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn escape_text(text: &str) -> String {
	text.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}

/// A plain run.
pub fn run(text: &str) -> String {
	format!(
		r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#,
		escape_text(text)
	)
}

/// A run with the given `w:rPr` content.
pub fn styled_run(properties: &str, text: &str) -> String {
	format!(
		r#"<w:r><w:rPr>{properties}</w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
		escape_text(text)
	)
}

pub fn bold_run(text: &str) -> String {
	styled_run("<w:b/>", text)
}

pub fn italic_run(text: &str) -> String {
	styled_run("<w:i/>", text)
}

pub fn paragraph(runs: &[String]) -> String {
	format!("<w:p>{}</w:p>", runs.concat())
}

/// A paragraph made of a single plain run.
pub fn text_paragraph(text: &str) -> String {
	paragraph(&[run(text)])
}

/// A table whose cells hold the given blocks.
pub fn table(rows: &[Vec<String>]) -> String {
	let rows: String = rows
		.iter()
		.map(|cells| {
			let cells: String = cells
				.iter()
				.map(|content| format!("<w:tc><w:tcPr/>{content}</w:tc>"))
				.collect();
			format!("<w:tr>{cells}</w:tr>")
		})
		.collect();

	format!("<w:tbl><w:tblPr/>{rows}</w:tbl>")
}

/// Builds in-memory `.docx` packages.
#[derive(Debug, Clone, Default)]
pub struct DocxBuilder {
	body: Vec<String>,
	header: Option<Vec<String>>,
	footer: Option<Vec<String>>,
	media: Vec<(String, Vec<u8>)>,
}

impl DocxBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn body(mut self, blocks: &[String]) -> Self {
		self.body.extend_from_slice(blocks);
		self
	}

	pub fn header(mut self, blocks: &[String]) -> Self {
		self.header = Some(blocks.to_vec());
		self
	}

	pub fn footer(mut self, blocks: &[String]) -> Self {
		self.footer = Some(blocks.to_vec());
		self
	}

	pub fn media(mut self, name: &str, bytes: &[u8]) -> Self {
		self.media.push((format!("word/media/{name}"), bytes.to_vec()));
		self
	}

	pub fn build(&self) -> Vec<u8> {
		let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
		let mut relationships = Vec::new();
		let mut section = String::new();

		if self.header.is_some() {
			relationships.push(format!(
				r#"<Relationship Id="rId1" Type="{RELATIONSHIP_TYPE_BASE}/header" Target="header1.xml"/>"#
			));
			section.push_str(r#"<w:headerReference w:type="default" r:id="rId1"/>"#);
		}

		if self.footer.is_some() {
			relationships.push(format!(
				r#"<Relationship Id="rId2" Type="{RELATIONSHIP_TYPE_BASE}/footer" Target="footer1.xml"/>"#
			));
			section.push_str(r#"<w:footerReference w:type="default" r:id="rId2"/>"#);
		}

		entries.push((
			"[Content_Types].xml".to_string(),
			concat!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
				r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
				r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
				r#"<Default Extension="xml" ContentType="application/xml"/>"#,
				r#"<Default Extension="png" ContentType="image/png"/>"#,
				r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
				"</Types>"
			)
			.into(),
		));
		entries.push((
			"_rels/.rels".to_string(),
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}"><Relationship Id="rId1" Type="{RELATIONSHIP_TYPE_BASE}/officeDocument" Target="word/document.xml"/></Relationships>"#
			)
			.into_bytes(),
		));
		entries.push((
			"word/document.xml".to_string(),
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{WORD_NAMESPACE}" xmlns:r="{RELATIONSHIP_NAMESPACE}"><w:body>{}<w:sectPr>{section}<w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
				self.body.concat()
			)
			.into_bytes(),
		));
		entries.push((
			"word/_rels/document.xml.rels".to_string(),
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}">{}</Relationships>"#,
				relationships.concat()
			)
			.into_bytes(),
		));

		if let Some(header) = &self.header {
			entries.push((
				"word/header1.xml".to_string(),
				format!(
					r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{WORD_NAMESPACE}">{}</w:hdr>"#,
					header.concat()
				)
				.into_bytes(),
			));
		}

		if let Some(footer) = &self.footer {
			entries.push((
				"word/footer1.xml".to_string(),
				format!(
					r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr xmlns:w="{WORD_NAMESPACE}">{}</w:ftr>"#,
					footer.concat()
				)
				.into_bytes(),
			));
		}

		entries.extend(self.media.iter().cloned());

		write_zip(&entries)
	}

	pub fn document(&self) -> Document {
		Document::from_bytes(&self.build()).unwrap_or_else(|e| panic!("fixture document: {e}"))
	}
}

pub fn write_zip(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
	let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

	for (name, data) in entries {
		writer
			.start_file(name.as_str(), SimpleFileOptions::default())
			.unwrap_or_else(|e| panic!("start {name}: {e}"));
		writer
			.write_all(data)
			.unwrap_or_else(|e| panic!("write {name}: {e}"));
	}

	writer
		.finish()
		.unwrap_or_else(|e| panic!("finish zip: {e}"))
		.into_inner()
}

/// Names of the entries of a zip archive, in archive order.
pub fn zip_names(bytes: &[u8]) -> Vec<String> {
	let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap_or_else(|e| panic!("open zip: {e}"));
	(0..archive.len())
		.map(|index| {
			archive
				.by_index(index)
				.map(|file| file.name().to_string())
				.unwrap_or_else(|e| panic!("entry {index}: {e}"))
		})
		.collect()
}

pub fn zip_entry(bytes: &[u8], name: &str) -> Vec<u8> {
	let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap_or_else(|e| panic!("open zip: {e}"));
	let mut file = archive
		.by_name(name)
		.unwrap_or_else(|e| panic!("missing entry {name}: {e}"));
	let mut data = Vec::new();
	file.read_to_end(&mut data)
		.unwrap_or_else(|e| panic!("read {name}: {e}"));
	data
}

/// Visible text of every paragraph, in traversal order.
pub fn paragraph_texts(document: &Document) -> Vec<String> {
	let mut texts = Vec::new();
	document.visit_paragraphs(&mut |paragraph| texts.push(paragraph.text()));
	texts
}

/// Text and formatting of each run of the paragraph at `index`.
pub fn paragraph_runs(document: &Document, index: usize) -> Vec<(String, RunFormat)> {
	let mut found = None;
	let mut current = 0;

	document.visit_paragraphs(&mut |paragraph| {
		if current == index {
			found = Some(
				paragraph
					.into_runs()
					.iter()
					.map(|run| (run.text(), run.format()))
					.collect(),
			);
		}
		current += 1;
	});

	found.unwrap_or_else(|| panic!("no paragraph at index {index}"))
}

/// Re-open a generated document.
pub fn reopen(bytes: &[u8]) -> Document {
	Document::from_bytes(bytes).unwrap_or_else(|e| panic!("reopen document: {e}"))
}
