//! Boundary-aware text chunker with fixed overlap.
//!
//! Splits extracted document text into [`TextChunk`]s of at most
//! `chunk_size` characters. Each chunk after the first begins with the
//! final `chunk_overlap` characters of the previous one, so context that
//! straddles a cut is visible to both sides.
//!
//! # Algorithm
//!
//! 1. Measure text in characters (Unicode scalar values), not bytes.
//! 2. If the remaining text from `start` fits in `chunk_size`, emit it as
//!    the final chunk.
//! 3. Otherwise search the back half of the window
//!    `(start + max(overlap, size / 2), start + size]` for the last
//!    paragraph break (`\n\n`), then line break (`\n`), then space. The
//!    separator stays at the end of the chunk. With no separator, cut hard
//!    at `start + size`.
//! 4. The next chunk starts `chunk_overlap` characters before the cut.
//!
//! Nothing is trimmed or dropped, so dropping the first `chunk_overlap`
//! characters of every chunk after the first and concatenating reproduces
//! the input exactly.
//!
//! # Example
//!
//! ```rust
//! use knowledge_base_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let chunks = chunker.split(&"x".repeat(2500)).unwrap();
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[1].start, 800);
//! ```

use crate::error::{KbError, KbResult};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Split points in order of preference.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A contiguous span of the input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the chunk sequence, starting at 0.
    pub index: usize,
    pub text: String,
    /// Character offset of the first character (inclusive).
    pub start: usize,
    /// Character offset past the last character (exclusive).
    pub end: usize,
}

/// Chunking policy: maximum size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Build a chunker. Requires `chunk_size > 0` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> KbResult<Self> {
        if chunk_size == 0 {
            return Err(KbError::InvalidRequest(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(KbError::InvalidRequest(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into overlapping chunks.
    ///
    /// Fails with [`KbError::EmptyInput`] when `text` has no
    /// non-whitespace content, so callers can reject the upload instead of
    /// silently storing nothing.
    pub fn split(&self, text: &str) -> KbResult<Vec<TextChunk>> {
        if text.trim().is_empty() {
            return Err(KbError::EmptyInput);
        }

        // bounds[i] is the byte offset of char i; bounds[total] == text.len()
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let limit = start + self.chunk_size;
            let end = if limit >= total {
                total
            } else {
                self.find_split(text, &bounds, start, limit)
            };

            chunks.push(TextChunk {
                index: chunks.len(),
                text: text[bounds[start]..bounds[end]].to_string(),
                start,
                end,
            });

            if end == total {
                break;
            }
            start = end - self.chunk_overlap;
        }

        Ok(chunks)
    }

    /// Pick the cut for the window `[start, limit)`, returning a char offset
    /// strictly greater than `start + max(overlap, size / 2)`.
    fn find_split(&self, text: &str, bounds: &[usize], start: usize, limit: usize) -> usize {
        let floor = start + self.chunk_overlap.max(self.chunk_size / 2);
        let window_start = bounds[floor];
        let window = &text[window_start..bounds[limit]];

        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let split_byte = window_start + pos + sep.len();
                // separators are ASCII, so split_byte is always a char boundary
                let split = bounds.partition_point(|&b| b < split_byte);
                if split > floor {
                    return split;
                }
            }
        }

        limit
    }
}
