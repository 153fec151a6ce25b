//! Byte-offset → page projection, pagination and the reader session.

use std::collections::BTreeMap;

use tomo_core::{floor_char_boundary, ChapterMap, PageRange};

/// 1-based page containing byte `offset`.
pub fn page_of(offset: usize, page_size: usize) -> usize {
    offset / page_size.max(1) + 1
}

/// Page range of every chapter, in ascending chapter order.
///
/// A chapter's end offset is the next chapter's start (or `text_len`), so
/// adjacent ranges can share a boundary page.
pub fn map(chapters: &ChapterMap, text_len: usize, page_size: usize) -> BTreeMap<u32, PageRange> {
    chapters
        .spans(text_len)
        .into_iter()
        .map(|span| {
            (
                span.chapter,
                PageRange::new(page_of(span.start, page_size), page_of(span.end, page_size)),
            )
        })
        .collect()
}

/// Split `text` into pages of at most `page_size` bytes, cut on char boundaries.
pub fn paginate(text: &str, page_size: usize) -> Vec<String> {
    let page_size = page_size.max(1);
    let mut pages = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = floor_char_boundary(text, start + page_size);
        if end == start {
            // A single char wider than the page; take it whole.
            end = text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len());
        }
        pages.push(text[start..end].to_string());
        start = end;
    }
    pages
}

/// Paginated view of one document with a cursor.
#[derive(Debug, Clone, Default)]
pub struct ReaderSession {
    pages: Vec<String>,
    current: usize,
}

impl ReaderSession {
    pub fn new(text: &str, page_size: usize) -> Self {
        Self {
            pages: paginate(text, page_size),
            current: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based number of the current page; 0 for an empty document.
    pub fn current_number(&self) -> usize {
        if self.pages.is_empty() {
            0
        } else {
            self.current + 1
        }
    }

    /// Text of the current page.
    pub fn current(&self) -> Option<&str> {
        self.pages.get(self.current).map(String::as_str)
    }

    /// Advance one page. Returns false at the last page.
    pub fn next(&mut self) -> bool {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Go back one page. Returns false at the first page.
    pub fn prev(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Jump to 1-based `page`. Out-of-range pages leave the cursor alone.
    pub fn go_to(&mut self, page: usize) -> bool {
        if page >= 1 && page <= self.pages.len() {
            self.current = page - 1;
            true
        } else {
            false
        }
    }

    pub fn label(&self) -> String {
        format!("Page {} of {}", self.current_number(), self.page_count())
    }

    /// Chapters whose range covers the current page.
    pub fn chapters_on_page(&self, ranges: &BTreeMap<u32, PageRange>) -> Vec<u32> {
        let page = self.current_number();
        ranges
            .iter()
            .filter(|(_, range)| range.contains(page))
            .map(|(&chapter, _)| chapter)
            .collect()
    }
}
