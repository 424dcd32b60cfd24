//! Plain-text helpers layered on page text: search with context and
//! overlapping chunking. Positions are character (not byte) offsets.

use serde::Serialize;

use super::selection::SelectionRect;

pub const DEFAULT_CONTEXT: usize = 200;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// One case-insensitive match of a search term
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    /// Character offset of the match
    pub position: usize,
    /// Match length in characters
    pub length: usize,
    /// The match with up to `context` characters on either side
    pub context: String,
}

/// A search match located on a page, with highlight rectangles
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    /// 1-based page number
    pub page: usize,
    pub occurrence: Occurrence,
    pub rects: Vec<SelectionRect>,
}

fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Finds non-overlapping, case-insensitive occurrences of `term`.
#[must_use]
pub fn find_occurrences(text: &str, term: &str, context: usize) -> Vec<Occurrence> {
    let haystack: Vec<char> = text.chars().collect();
    let needle: Vec<char> = term.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    let mut results = Vec::new();
    let mut position = 0;
    while position + needle.len() <= haystack.len() {
        let window = &haystack[position..position + needle.len()];
        if window.iter().zip(&needle).all(|(&a, &b)| chars_match(a, b)) {
            let start = position.saturating_sub(context);
            let end = (position + needle.len() + context).min(haystack.len());
            results.push(Occurrence {
                position,
                length: needle.len(),
                context: haystack[start..end].iter().collect(),
            });
            position += needle.len();
        } else {
            position += 1;
        }
    }
    results
}

/// Splits `text` into windows of `chunk_size` characters, consecutive
/// windows sharing `overlap` characters.
///
/// Text that fits in one chunk is returned whole. An overlap that would
/// keep the walk from advancing is clamped to `chunk_size - 1`.
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chunk_size == 0 || chars.len() <= chunk_size {
        return vec![text.to_string()];
    }
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// One window of [`chunk_text`] with its position in the sequence
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub text: String,
    /// 0-based
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// This is the last chunk
    pub is_complete: bool,
}

/// The `index`th chunk of `text`, or `None` past the last one
#[must_use]
pub fn chunk_at(text: &str, chunk_size: usize, overlap: usize, index: usize) -> Option<TextChunk> {
    let chunks = chunk_text(text, chunk_size, overlap);
    let total_chunks = chunks.len();
    let text = chunks.into_iter().nth(index)?;
    Some(TextChunk {
        text,
        chunk_index: index,
        total_chunks,
        is_complete: index + 1 == total_chunks,
    })
}
