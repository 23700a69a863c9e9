use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const NO_BREAK_SPACE: char = '\u{a0}';
const ZERO_WIDTH_SPACE: char = '\u{200b}';

/// Canonicalize text for placeholder matching.
///
/// Replaces non-breaking spaces with plain spaces, drops zero-width spaces,
/// applies Unicode NFKC compatibility normalization and trims surrounding
/// whitespace. The result is stable: normalizing it again returns the same
/// string.
///
/// ```
/// use docmerge_core::normalize;
///
/// assert_eq!(normalize("\u{a0}Na\u{200b}me "), "Name");
/// assert_eq!(normalize("ﬁrst"), "first");
/// ```
pub fn normalize(text: &str) -> String {
	fold(text).trim().to_string()
}

/// [`normalize`] without the trimming step.
pub fn fold(text: &str) -> String {
	text.chars()
		.filter(|ch| *ch != ZERO_WIDTH_SPACE)
		.map(|ch| if ch == NO_BREAK_SPACE { ' ' } else { ch })
		.nfkc()
		.collect()
}

/// Folded text of a single run together with the cluster boundaries needed
/// to translate folded offsets back into offsets of the raw text.
///
/// A cluster is a base character followed by its combining marks. Each
/// cluster is folded on its own so that every folded byte can be attributed
/// to exactly one raw cluster.
#[derive(Debug, Clone)]
pub(crate) struct FoldedText {
	text: String,
	/// `(raw, folded)` byte offsets of every cluster start, terminated by the
	/// end offsets of both strings.
	boundaries: Vec<(usize, usize)>,
}

impl FoldedText {
	pub(crate) fn new(raw: &str) -> Self {
		let mut text = String::with_capacity(raw.len());
		let mut boundaries = Vec::new();
		let mut cluster_start = 0;

		for (index, ch) in raw.char_indices() {
			if index > 0 && !is_combining_mark(ch) {
				boundaries.push((cluster_start, text.len()));
				text.push_str(&fold(&raw[cluster_start..index]));
				cluster_start = index;
			}
		}

		if !raw.is_empty() {
			boundaries.push((cluster_start, text.len()));
			text.push_str(&fold(&raw[cluster_start..]));
		}

		boundaries.push((raw.len(), text.len()));

		Self { text, boundaries }
	}

	pub(crate) fn as_str(&self) -> &str {
		&self.text
	}

	pub(crate) fn len(&self) -> usize {
		self.text.len()
	}

	/// Raw offset for a match starting at `folded`. Offsets inside a cluster
	/// round down to the cluster start; clusters that fold to nothing (such
	/// as zero-width spaces) stay before the match.
	pub(crate) fn raw_start(&self, folded: usize) -> usize {
		let index = self.boundaries.partition_point(|&(_, f)| f <= folded);
		self.boundaries[index.saturating_sub(1)].0
	}

	/// Raw offset for a match ending at `folded`. Offsets inside a cluster
	/// round up to the next cluster; clusters that fold to nothing stay after
	/// the match.
	pub(crate) fn raw_end(&self, folded: usize) -> usize {
		let index = self.boundaries.partition_point(|&(_, f)| f < folded);
		self.boundaries[index.min(self.boundaries.len() - 1)].0
	}

	/// Folded offset of the first cluster starting at or after `raw`.
	pub(crate) fn folded_at(&self, raw: usize) -> usize {
		let index = self.boundaries.partition_point(|&(r, _)| r < raw);
		self.boundaries[index.min(self.boundaries.len() - 1)].1
	}
}
