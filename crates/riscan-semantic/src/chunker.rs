//! Fixed-size overlapping character windows.

use riscan_core::{CharIndex, Chunk, RiError, Span};

/// Split `text` into chunks of `size` characters overlapping by `overlap`.
///
/// Chunk `i` starts at character `i * (size - overlap)` and holds
/// `min(size, len - start)` characters. Chunking stops at the first chunk
/// that reaches the end of the text, so consecutive chunks never leave a gap
/// and only the last one may be shorter than `size`.
///
/// # Errors
///
/// Returns [`RiError::InvalidParameter`] if `size == 0` or `overlap >= size`.
///
/// # Examples
///
/// ```
/// use riscan_semantic::chunker::chunk_text;
///
/// let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
/// let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["abcd", "defg", "ghij"]);
/// assert_eq!(chunks[2].offset, 6);
///
/// assert!(chunk_text("", 500, 100).unwrap().is_empty());
/// assert!(chunk_text("abc", 100, 100).is_err());
/// ```
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, RiError> {
    if size == 0 {
        return Err(RiError::InvalidParameter(
            "chunk size must be greater than zero".into(),
        ));
    }
    if overlap >= size {
        return Err(RiError::InvalidParameter(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
        )));
    }

    let index = CharIndex::new(text);
    let len = index.char_len();
    let step = size - overlap;

    let mut chunks = Vec::with_capacity(len / step + 1);
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        chunks.push(Chunk {
            index: chunks.len(),
            offset: start,
            text: index.slice(text, Span { start, end }).to_string(),
        });
        if end == len {
            break;
        }
        start += step;
    }

    tracing::debug!(chars = len, size, overlap, chunks = chunks.len(), "chunked text");
    Ok(chunks)
}
