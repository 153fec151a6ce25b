//! Span chunking for model input.
//!
//! Models accept a bounded input, so a chapter is cut into spans of at most
//! `max_bytes` bytes. Cuts prefer paragraph breaks, then line breaks, then
//! sentence ends, then spaces; a hard cut on a char boundary is the last resort.

use tomo_core::floor_char_boundary;

/// Default span size, matching the usual 512-position encoder window.
pub const DEFAULT_MAX_SPAN: usize = 512;

/// A span of chapter text with its byte position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Greedy chunker cutting at the latest preferred separator in each window.
pub struct SpanChunker {
    pub max_bytes: usize,
    separators: Vec<&'static str>,
}

impl SpanChunker {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes.max(1),
            separators: vec!["\n\n", "\n", ". ", "! ", "? ", " "],
        }
    }

    /// Cut `text` into spans. Whitespace-only spans are skipped.
    pub fn chunk(&self, text: &str) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let end = self.cut_point(text, start);
            let piece = &text[start..end];
            if !piece.trim().is_empty() {
                spans.push(TextSpan {
                    text: piece.to_string(),
                    start,
                    end,
                });
            }
            start = end;
        }
        spans
    }

    /// End offset of the span beginning at `start`.
    fn cut_point(&self, text: &str, start: usize) -> usize {
        if text.len() - start <= self.max_bytes {
            return text.len();
        }

        let limit = floor_char_boundary(text, start + self.max_bytes);
        let window = &text[start..limit];
        for sep in &self.separators {
            if let Some(idx) = window.rfind(sep) {
                let end = start + idx + sep.len();
                if end > start {
                    return end;
                }
            }
        }

        if limit > start {
            limit
        } else {
            // One char wider than the whole budget.
            text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len())
        }
    }
}

impl Default for SpanChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SPAN)
    }
}
