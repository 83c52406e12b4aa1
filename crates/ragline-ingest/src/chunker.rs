//! Content chunking for embedding.
//!
//! Splits text into fixed-size character windows that overlap by a fixed
//! amount. Offsets are in characters (not bytes) so they are stable across
//! encodings. Cut points prefer paragraph breaks, then sentence ends, then
//! whitespace, and fall back to a hard cut at the size limit.

use crate::error::{IngestError, IngestResult};
use ragline_core::CharRange;

/// Configuration for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum size of each chunk in characters.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    /// Create config from ingest settings.
    pub fn from_ingest_config(config: &ragline_config::IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// A piece of text with its character range in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub range: CharRange,
}

/// Content chunker for splitting text.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Create a chunker, rejecting configurations that cannot make progress.
    pub fn new(config: ChunkConfig) -> IngestResult<Self> {
        if config.chunk_size == 0 {
            return Err(IngestError::Chunking("chunk_size must be positive".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(IngestError::Chunking(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Split text into overlapping spans covering `[0, len)`.
    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut spans = Vec::new();
        if len == 0 {
            return spans;
        }

        let mut start = 0;
        loop {
            if len - start <= size {
                spans.push(span(&chars, start, len));
                break;
            }

            let hard_end = start + size;
            // Never cut so early that the next window would not advance
            let min_end = start + (size / 2).max(overlap + 1);
            let end = find_boundary(&chars, min_end, hard_end).unwrap_or(hard_end);

            spans.push(span(&chars, start, end));
            start = end - overlap;
        }

        spans
    }
}

fn span(chars: &[char], start: usize, end: usize) -> TextSpan {
    TextSpan {
        text: chars[start..end].iter().collect(),
        range: CharRange::new(start, end),
    }
}

/// Best exclusive end in `[lo, hi]`: paragraph break, sentence end, then whitespace.
fn find_boundary(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let candidates = (lo.max(1)..=hi).rev();

    let paragraph = candidates
        .clone()
        .find(|&e| e >= 2 && chars[e - 1] == '\n' && chars[e - 2] == '\n');
    if paragraph.is_some() {
        return paragraph;
    }

    let sentence = candidates.clone().find(|&e| {
        matches!(chars[e - 1], '.' | '!' | '?') && chars.get(e).map_or(true, |c| c.is_whitespace())
    });
    if sentence.is_some() {
        return sentence;
    }

    candidates.into_iter().find(|&e| chars[e - 1].is_whitespace())
}
