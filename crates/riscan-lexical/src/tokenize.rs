//! Word and sentence segmentation using Unicode (UAX #29) boundaries.

use std::ops::Range;

use riscan_core::{CharIndex, Span};
use unicode_segmentation::UnicodeSegmentation;

/// A word token with both byte and character positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte range into the source text.
    pub bytes: Range<usize>,
    /// Character span into the source text.
    pub span: Span,
    /// Lowercased token text.
    pub lower: String,
}

/// A sentence as a character span of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence {
    /// Character span, including trailing whitespace.
    pub span: Span,
}

/// Split `text` into word tokens, dropping punctuation and whitespace segments.
///
/// Hyphenated compounds come out as separate tokens (`"climate-proof"` →
/// `climate`, `proof`).
///
/// # Examples
///
/// ```
/// use riscan_core::CharIndex;
/// use riscan_lexical::tokenize::word_tokens;
///
/// let text = "Flood-proof substations, built in 2019.";
/// let tokens = word_tokens(text, &CharIndex::new(text));
/// let words: Vec<&str> = tokens.iter().map(|t| t.lower.as_str()).collect();
/// assert_eq!(words, ["flood", "proof", "substations", "built", "in", "2019"]);
/// ```
pub fn word_tokens(text: &str, index: &CharIndex) -> Vec<Token> {
    text.split_word_bound_indices()
        .filter(|(_, word)| word.chars().any(char::is_alphanumeric))
        .map(|(start, word)| {
            let end = start + word.len();
            Token {
                bytes: start..end,
                span: Span {
                    start: index.byte_to_char(start),
                    end: index.byte_to_char(end),
                },
                lower: word.to_lowercase(),
            }
        })
        .collect()
}

/// Split `text` into sentences.
///
/// # Examples
///
/// ```
/// use riscan_core::CharIndex;
/// use riscan_lexical::tokenize::sentences;
///
/// let text = "The dam held. The levee failed.";
/// let sents = sentences(text, &CharIndex::new(text));
/// assert_eq!(sents.len(), 2);
/// assert_eq!(sents[1].span.start, 14);
/// ```
pub fn sentences(text: &str, index: &CharIndex) -> Vec<Sentence> {
    text.split_sentence_bound_indices()
        .map(|(start, sentence)| Sentence {
            span: Span {
                start: index.byte_to_char(start),
                end: index.byte_to_char(start + sentence.len()),
            },
        })
        .filter(|s| !s.span.is_empty())
        .collect()
}

/// `true` if the text between two tokens only joins them into a phrase:
/// whitespace and hyphens, nothing else.
pub(crate) fn is_phrase_gap(gap: &str) -> bool {
    gap.chars()
        .all(|c| c.is_whitespace() || matches!(c, '-' | '\u{2010}' | '\u{2011}'))
}
