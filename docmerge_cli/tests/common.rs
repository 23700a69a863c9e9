#![allow(dead_code)]

use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub fn docmerge_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("docmerge"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd
}

const WORD_NAMESPACE: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const RELATIONSHIP_NAMESPACE: &str =
	"http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIP_NAMESPACE: &str =
	"http://schemas.openxmlformats.org/package/2006/relationships";

/// A paragraph with one run per text fragment.
pub fn paragraph(runs: &[&str]) -> String {
	let runs: String = runs
		.iter()
		.map(|text| format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#))
		.collect();
	format!("<w:p>{runs}</w:p>")
}

/// A minimal `.docx` package with the given body paragraphs and footer
/// paragraphs.
pub fn docx(body: &[String], footer: &[String]) -> Vec<u8> {
	let entries = [
		(
			"[Content_Types].xml",
			concat!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
				r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
				r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
				r#"<Default Extension="xml" ContentType="application/xml"/>"#,
				"</Types>"
			)
			.to_string(),
		),
		(
			"_rels/.rels",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}"><Relationship Id="rId1" Type="{RELATIONSHIP_NAMESPACE}/officeDocument" Target="word/document.xml"/></Relationships>"#
			),
		),
		(
			"word/document.xml",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{WORD_NAMESPACE}" xmlns:r="{RELATIONSHIP_NAMESPACE}"><w:body>{}<w:sectPr><w:footerReference w:type="default" r:id="rId1"/></w:sectPr></w:body></w:document>"#,
				body.concat()
			),
		),
		(
			"word/_rels/document.xml.rels",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}"><Relationship Id="rId1" Type="{RELATIONSHIP_NAMESPACE}/footer" Target="footer1.xml"/></Relationships>"#
			),
		),
		(
			"word/footer1.xml",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr xmlns:w="{WORD_NAMESPACE}">{}</w:ftr>"#,
				footer.concat()
			),
		),
	];

	zip_entries(&entries)
}

/// The letter template used across the CLI tests: `{{Name}}` and `{{City}}`
/// in the body, `{{Name}}` split across runs in the footer.
pub fn letter_docx() -> Vec<u8> {
	docx(
		&[
			paragraph(&["Dear {{Name}},"]),
			paragraph(&["Welcome to {{ City }}."]),
		],
		&[paragraph(&["Prepared for {{Na", "me}}"])],
	)
}

pub fn write_project(root: &Path, csv: &str) {
	std::fs::write(root.join("letter.docx"), letter_docx())
		.unwrap_or_else(|e| panic!("write template: {e}"));
	std::fs::write(root.join("people.csv"), csv).unwrap_or_else(|e| panic!("write csv: {e}"));
}

/// A typed spreadsheet cell.
pub enum SheetCell<'a> {
	Text(&'a str),
	Number(f64),
	Bool(bool),
}

const SPREADSHEET_NAMESPACE: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// A minimal `.xlsx` workbook holding one worksheet with the given rows.
pub fn xlsx(rows: &[&[SheetCell]]) -> Vec<u8> {
	let sheet_rows: String = rows
		.iter()
		.enumerate()
		.map(|(row_index, cells)| {
			let row_number = row_index + 1;
			let cells: String = cells
				.iter()
				.enumerate()
				.map(|(column_index, cell)| {
					let column = char::from(b'A' + u8::try_from(column_index).unwrap_or(0));
					let reference = format!("{column}{row_number}");
					match cell {
						SheetCell::Text(text) => {
							format!(r#"<c r="{reference}" t="inlineStr"><is><t>{text}</t></is></c>"#)
						}
						SheetCell::Number(value) => format!(r#"<c r="{reference}"><v>{value}</v></c>"#),
						SheetCell::Bool(value) => {
							format!(r#"<c r="{reference}" t="b"><v>{}</v></c>"#, u8::from(*value))
						}
					}
				})
				.collect();
			format!(r#"<row r="{row_number}">{cells}</row>"#)
		})
		.collect();

	let entries = [
		(
			"[Content_Types].xml",
			concat!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
				r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
				r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
				r#"<Default Extension="xml" ContentType="application/xml"/>"#,
				r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
				r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
				"</Types>"
			)
			.to_string(),
		),
		(
			"_rels/.rels",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}"><Relationship Id="rId1" Type="{RELATIONSHIP_NAMESPACE}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
			),
		),
		(
			"xl/workbook.xml",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{SPREADSHEET_NAMESPACE}" xmlns:r="{RELATIONSHIP_NAMESPACE}"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#
			),
		),
		(
			"xl/_rels/workbook.xml.rels",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}"><Relationship Id="rId1" Type="{RELATIONSHIP_NAMESPACE}/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
			),
		),
		(
			"xl/worksheets/sheet1.xml",
			format!(
				r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{SPREADSHEET_NAMESPACE}"><sheetData>{sheet_rows}</sheetData></worksheet>"#
			),
		),
	];

	zip_entries(&entries)
}

fn zip_entries(entries: &[(&str, String)]) -> Vec<u8> {
	let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
	for (name, content) in entries {
		writer
			.start_file(*name, SimpleFileOptions::default())
			.unwrap_or_else(|e| panic!("start {name}: {e}"));
		writer
			.write_all(content.as_bytes())
			.unwrap_or_else(|e| panic!("write {name}: {e}"));
	}

	writer
		.finish()
		.unwrap_or_else(|e| panic!("finish zip: {e}"))
		.into_inner()
}

/// Entry names of a zip archive in archive order.
pub fn archive_names(bytes: &[u8]) -> Vec<String> {
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

pub fn archive_entry(bytes: &[u8], name: &str) -> Vec<u8> {
	let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap_or_else(|e| panic!("open zip: {e}"));
	let mut file = archive
		.by_name(name)
		.unwrap_or_else(|e| panic!("missing entry {name}: {e}"));
	let mut data = Vec::new();
	file.read_to_end(&mut data)
		.unwrap_or_else(|e| panic!("read {name}: {e}"));
	data
}

/// Text of every `w:t` element of a generated document part, concatenated.
pub fn part_text(document: &[u8], part: &str) -> String {
	let xml = String::from_utf8(archive_entry(document, part))
		.unwrap_or_else(|e| panic!("utf-8 {part}: {e}"));
	let mut text = String::new();
	let mut rest = xml.as_str();

	while let Some(start) = rest.find("<w:t") {
		rest = &rest[start..];
		let Some(open_end) = rest.find('>') else {
			break;
		};
		let is_text_element = matches!(rest[4..].chars().next(), Some('>' | ' '));
		if !is_text_element || rest[..open_end].ends_with('/') {
			rest = &rest[open_end + 1..];
			continue;
		}
		let Some(close) = rest.find("</w:t>") else {
			break;
		};
		text.push_str(&rest[open_end + 1..close]);
		rest = &rest[close + "</w:t>".len()..];
	}

	text
}
