use std::collections::BTreeSet;

use tracing::debug;
use tracing::warn;

use crate::document::Document;
use crate::layout::ParagraphLayout;
use crate::lexer::scan;

/// Tags discovered in a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
	/// Normalized tag names in alphabetical order.
	pub tags: BTreeSet<String>,
	/// Whether any `{% if %}` or `{% for %}` style control block was found.
	/// Such blocks are passed through to the output unrendered.
	pub has_unsupported_blocks: bool,
}

/// Collect every placeholder of the document body, its tables and the
/// headers and footers of all sections. The document is not modified.
pub fn extract(document: &Document) -> Extraction {
	let mut extraction = Extraction::default();
	let mut control_statements = 0;

	document.visit_paragraphs(&mut |paragraph| {
		let runs: Vec<String> = paragraph.into_runs().iter().map(|run| run.text()).collect();
		let layout = ParagraphLayout::new(&runs);
		let found = scan(layout.text());

		control_statements += found.control_statements;
		extraction
			.tags
			.extend(found.placeholders.into_iter().map(|placeholder| placeholder.name));
	});

	if control_statements > 0 {
		warn!(
			control_statements,
			"template contains control blocks which are not rendered"
		);
		extraction.has_unsupported_blocks = true;
	}

	debug!(tags = extraction.tags.len(), "extracted tags");

	extraction
}
