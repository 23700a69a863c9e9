use std::ops::Range;

use crate::normalize::FoldedText;

/// Position of a character inside a paragraph: the run index and a byte
/// offset into that run's raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunPosition {
	pub run: usize,
	pub offset: usize,
}

#[derive(Debug, Clone)]
struct RunSlot {
	folded: FoldedText,
	/// Offset of this run's folded text inside the paragraph text.
	start: usize,
}

/// The folded text of a paragraph together with the mapping from every
/// folded offset back to the run it came from.
///
/// Tag extraction and substitution both scan this text, so a placeholder
/// is found by one exactly when it is found by the other.
#[derive(Debug, Clone)]
pub(crate) struct ParagraphLayout {
	text: String,
	slots: Vec<RunSlot>,
}

impl ParagraphLayout {
	pub(crate) fn new<S: AsRef<str>>(runs: &[S]) -> Self {
		let mut text = String::new();
		let mut slots = Vec::with_capacity(runs.len());

		for run in runs {
			let folded = FoldedText::new(run.as_ref());
			let start = text.len();
			text.push_str(folded.as_str());
			slots.push(RunSlot { folded, start });
		}

		Self { text, slots }
	}

	pub(crate) fn text(&self) -> &str {
		&self.text
	}

	/// Paragraph offset of the first character at or after `position`.
	pub(crate) fn offset_of(&self, position: RunPosition) -> usize {
		self.slots.get(position.run).map_or(self.text.len(), |slot| {
			slot.start + slot.folded.folded_at(position.offset)
		})
	}

	/// Run boundaries of a non-empty `span` of the paragraph text: where the
	/// span starts in its first run and where it ends in its last run.
	pub(crate) fn locate(&self, span: &Range<usize>) -> Option<(RunPosition, RunPosition)> {
		let first = self.slot_containing(span.start)?;
		let last = self.slot_containing(span.end.checked_sub(1)?)?;

		let first_slot = &self.slots[first];
		let last_slot = &self.slots[last];

		Some((
			RunPosition {
				run: first,
				offset: first_slot.folded.raw_start(span.start - first_slot.start),
			},
			RunPosition {
				run: last,
				offset: last_slot.folded.raw_end(span.end - last_slot.start),
			},
		))
	}

	fn slot_containing(&self, offset: usize) -> Option<usize> {
		self.slots
			.iter()
			.position(|slot| slot.start <= offset && offset < slot.start + slot.folded.len())
	}
}

