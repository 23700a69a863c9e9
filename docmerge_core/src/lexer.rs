use std::ops::Range;

use logos::Logos;

use crate::normalize;

/// Keywords that open or close template control blocks. Documents using them
/// are flagged because the blocks are passed through unrendered.
const CONTROL_KEYWORDS: [&str; 6] = ["if", "elif", "else", "endif", "for", "endfor"];

/// Raw tokens produced by logos for flat tokenization of paragraph text.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
	#[token("{{")]
	PlaceholderOpen,
	#[token("}}")]
	PlaceholderClose,
	#[token("{%")]
	StatementOpen,
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[token("%")]
	Percent,
	#[regex(r"[^{}%]+")]
	Text,
}

/// A `{{ name }}` placeholder found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
	/// The normalized name between the braces.
	pub name: String,
	/// Byte range of the whole placeholder, braces included.
	pub span: Range<usize>,
}

/// Everything the lexer found in one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagScan {
	/// Placeholders in order of appearance.
	pub placeholders: Vec<Placeholder>,
	/// Number of `{% if %}`/`{% for %}` style control statements.
	pub control_statements: usize,
}

/// Scan text for placeholders and control statements.
///
/// A placeholder is `{{`, optional whitespace, the shortest name, optional
/// whitespace and `}}`. The name cannot span a line break and names that are
/// empty after normalization are skipped.
pub fn scan(source: &str) -> TagScan {
	let tokens = lex(source);

	TagScan {
		placeholders: scan_placeholders(source, &tokens),
		control_statements: count_control_statements(source, &tokens),
	}
}

fn lex(source: &str) -> Vec<(RawToken, Range<usize>)> {
	RawToken::lexer(source)
		.spanned()
		.map(|(result, span)| (result.unwrap_or(RawToken::Text), span))
		.collect()
}

fn scan_placeholders(source: &str, tokens: &[(RawToken, Range<usize>)]) -> Vec<Placeholder> {
	let mut placeholders = Vec::new();
	let mut cursor = 0;

	while cursor < tokens.len() {
		let (token, open) = &tokens[cursor];
		if *token != RawToken::PlaceholderOpen {
			cursor += 1;
			continue;
		}

		let Some(close_index) = tokens[cursor + 1..]
			.iter()
			.position(|(token, _)| *token == RawToken::PlaceholderClose)
			.map(|offset| cursor + 1 + offset)
		else {
			break;
		};

		let close = &tokens[close_index].1;
		let inner = source[open.end..close.start].trim();

		if inner.contains('\n') {
			cursor += 1;
			continue;
		}

		let name = normalize(inner);
		if !name.is_empty() {
			placeholders.push(Placeholder {
				name,
				span: open.start..close.end,
			});
		}

		cursor = close_index + 1;
	}

	placeholders
}

fn count_control_statements(source: &str, tokens: &[(RawToken, Range<usize>)]) -> usize {
	let mut count = 0;
	let mut cursor = 0;

	while cursor < tokens.len() {
		let (token, open) = &tokens[cursor];
		if *token != RawToken::StatementOpen {
			cursor += 1;
			continue;
		}

		// `%}` is lexed as `%` followed by `}` or `}}`.
		let close_index = tokens[cursor + 1..]
			.windows(2)
			.position(|pair| {
				pair[0].0 == RawToken::Percent
					&& matches!(pair[1].0, RawToken::BraceClose | RawToken::PlaceholderClose)
			})
			.map(|offset| cursor + 1 + offset);

		let Some(close_index) = close_index else {
			break;
		};

		let inner = &source[open.end..tokens[close_index].1.start];
		if is_control_keyword(inner) {
			count += 1;
		}

		cursor = close_index + 2;
	}

	count
}

fn is_control_keyword(statement: &str) -> bool {
	let statement = statement.trim().trim_start_matches('-').trim_end_matches('-');
	statement
		.split_whitespace()
		.next()
		.is_some_and(|keyword| CONTROL_KEYWORDS.contains(&keyword))
}
