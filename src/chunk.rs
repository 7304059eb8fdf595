//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s no longer than a
//! configurable `max_tokens`. Splitting happens on paragraph boundaries
//! (`\n\n`) so clauses stay together; a paragraph that alone exceeds the
//! limit is hard-split at the nearest newline or space.
//!
//! Each chunk carries a SHA-256 hash of its text, used by the index to store
//! repeated boilerplate only once.

use sha2::{Digest, Sha256};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A contiguous slice of one corpus document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// File name of the source document.
    pub document: String,
    pub chunk_index: usize,
    pub text: String,
    pub hash: String,
}

/// Chunks `text` from `document`, packing whole paragraphs up to
/// `max_tokens`. Indices run from 0 without gaps; blank text yields nothing.
pub fn chunk_text(document: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, document, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            for piece in hard_split(trimmed, max_chars) {
                push_chunk(&mut chunks, document, piece);
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, document, &current_buf);
    }

    chunks
}

/// Cuts one oversized paragraph into non-empty pieces of at most
/// `max_chars` bytes, preferring to break after a newline, then a space.
fn hard_split(paragraph: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = paragraph;
    while !rest.is_empty() {
        let limit = floor_char_boundary(rest, max_chars);
        let cut = if limit == rest.len() {
            limit
        } else {
            let window = &rest[..limit];
            match window.rfind('\n').or_else(|| window.rfind(' ')) {
                Some(pos) => pos + 1,
                None => limit,
            }
        };
        let (head, tail) = rest.split_at(cut);
        let head = head.trim();
        if !head.is_empty() {
            pieces.push(head);
        }
        rest = tail;
    }
    pieces
}

/// Largest byte index `<= max` that falls on a char boundary (at least one
/// full char, so progress is always made).
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        s.chars().next().map(char::len_utf8).unwrap_or(s.len())
    } else {
        idx
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, document: &str, text: &str) {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    chunks.push(Chunk {
        document: document.to_string(),
        chunk_index: chunks.len(),
        text: text.to_string(),
        hash,
    });
}
