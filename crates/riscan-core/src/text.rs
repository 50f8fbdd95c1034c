//! Character/byte offset translation.
//!
//! Rust string slicing works on byte offsets while every span riscan emits
//! is measured in characters. [`CharIndex`] precomputes the byte position
//! of each character boundary so both directions are cheap.

use crate::types::Span;

/// Byte offsets of every character boundary in a string.
///
/// # Examples
///
/// ```
/// use riscan_core::{CharIndex, Span};
///
/// let text = "naïve flood";
/// let index = CharIndex::new(text);
/// assert_eq!(index.char_len(), 11);
/// assert_eq!(index.byte_to_char(7), 6);
/// assert_eq!(index.slice(text, Span { start: 6, end: 11 }), "flood");
/// ```
#[derive(Debug, Clone)]
pub struct CharIndex {
    // boundaries[i] is the byte offset of char i; the last entry is text.len().
    boundaries: Vec<usize>,
}

impl CharIndex {
    /// Index the character boundaries of `text`.
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Number of characters in the indexed text.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Byte offset of character `char_offset`, clamped to the end of the text.
    pub fn char_to_byte(&self, char_offset: usize) -> usize {
        let last = self.boundaries.len() - 1;
        self.boundaries[char_offset.min(last)]
    }

    /// Character offset of byte `byte_offset`.
    ///
    /// A byte offset inside a multi-byte character maps to that character.
    pub fn byte_to_char(&self, byte_offset: usize) -> usize {
        match self.boundaries.binary_search(&byte_offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Slice `text` (the string this index was built from) by a character span.
    pub fn slice<'a>(&self, text: &'a str, span: Span) -> &'a str {
        &text[self.char_to_byte(span.start)..self.char_to_byte(span.end)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_are_identity() {
        let index = CharIndex::new("levee");
        for i in 0..=5 {
            assert_eq!(index.char_to_byte(i), i);
            assert_eq!(index.byte_to_char(i), i);
        }
    }

    #[test]
    fn multibyte_characters_translate() {
        let text = "€ dam";
        let index = CharIndex::new(text);
        assert_eq!(index.char_len(), 5);
        assert_eq!(index.char_to_byte(1), 3);
        assert_eq!(index.byte_to_char(3), 1);
        // Byte 1 sits inside the euro sign.
        assert_eq!(index.byte_to_char(1), 0);
        assert_eq!(index.slice(text, Span { start: 2, end: 5 }), "dam");
    }

    #[test]
    fn empty_text_has_single_boundary() {
        let index = CharIndex::new("");
        assert_eq!(index.char_len(), 0);
        assert_eq!(index.char_to_byte(10), 0);
    }
}
