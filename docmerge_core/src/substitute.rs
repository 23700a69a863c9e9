use std::collections::BTreeMap;

use tracing::debug;

use crate::DocmergeResult;
use crate::document::Document;
use crate::document::Paragraph;
use crate::document::Run;
use crate::layout::ParagraphLayout;
use crate::layout::RunPosition;
use crate::lexer::scan;
use crate::mapping::DataRow;
use crate::mapping::Mapping;
use crate::xml::XmlElement;

/// Summary of one substitution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
	/// Number of placeholders replaced.
	pub replacements: usize,
	/// Number of paragraphs with at least one replacement.
	pub paragraphs_touched: usize,
}

/// Replace every mapped placeholder of the document with the row's value.
///
/// Values are resolved before the document is touched, so a value that
/// cannot be converted to text fails the call with the document unchanged.
/// The replacement takes the formatting of the run where the placeholder
/// starts. Inserted values are never scanned for placeholders again.
pub fn substitute(
	document: &mut Document,
	mapping: &Mapping,
	row: &DataRow,
) -> DocmergeResult<SubstitutionReport> {
	let values = mapping.resolve(row)?;
	let mut report = SubstitutionReport::default();

	if values.is_empty() {
		return Ok(report);
	}

	document.visit_paragraphs_mut(&mut |paragraph| {
		let replacements = substitute_paragraph(paragraph, &values);
		if replacements > 0 {
			report.replacements += replacements;
			report.paragraphs_touched += 1;
		}
	});

	debug!(
		replacements = report.replacements,
		paragraphs = report.paragraphs_touched,
		"substituted placeholders"
	);

	Ok(report)
}

fn substitute_paragraph(paragraph: Paragraph<&mut XmlElement>, values: &BTreeMap<String, String>) -> usize {
	let mut runs = paragraph.into_runs();
	let mut cursor = RunPosition { run: 0, offset: 0 };
	let mut replacements = 0;

	loop {
		let texts: Vec<String> = runs.iter().map(Run::text).collect();
		let layout = ParagraphLayout::new(&texts);
		let start = layout.offset_of(cursor);
		let next = scan(&layout.text()[start..])
			.placeholders
			.into_iter()
			.find_map(|placeholder| {
				let value = values.get(&placeholder.name)?;
				let span = start + placeholder.span.start..start + placeholder.span.end;
				Some((placeholder.name, span, value))
			});

		let Some((name, span, value)) = next else {
			break;
		};
		let Some((first, last)) = layout.locate(&span) else {
			break;
		};

		let written = if first.run == last.run {
			runs[first.run].splice_text(first.offset..last.offset, value)
		} else {
			let written = runs[first.run].splice_text(first.offset..texts[first.run].len(), value);
			for (run, text) in runs[first.run + 1..last.run]
				.iter_mut()
				.zip(&texts[first.run + 1..last.run])
			{
				run.splice_text(0..text.len(), "");
			}
			runs[last.run].splice_text(0..last.offset, "");
			written
		};

		debug!(tag = %name, first_run = first.run, last_run = last.run, "replaced placeholder");

		cursor = RunPosition {
			run: first.run,
			offset: first.offset + written,
		};
		replacements += 1;
	}

	replacements
}
