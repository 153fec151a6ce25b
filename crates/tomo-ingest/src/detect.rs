//! Chapter boundary detection.
//!
//! Three strategies run in strict priority order and the first non-empty one
//! wins: an index (table of contents) near the start of the text, chapter
//! headings anywhere in the body, and finally fixed-length blocks.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tomo_core::{floor_char_boundary, ChapterMap, TomoConfig};
use tracing::{debug, info, warn};

/// `Chapter 3 ........ 45`: chapter number, then the last number on the line.
static INDEX_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\b(?:chapter|capitolo)\s+(\d+)\b[^\n]*?\D(\d+)[ \t\r]*$").unwrap()
});

/// `Capitolo 7` anywhere in the body.
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:chapter|capitolo)\s+(\d+)\b").unwrap());

/// Which strategy produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Chapter → declared page, read from an index in the leading pages.
    Index,
    /// Chapter → byte offset of its first heading in the body.
    Pattern,
    /// Equal blocks of `chapter_length` pages.
    FixedLength,
    /// Nothing found; the text is shorter than one fixed block.
    None,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Pattern => write!(f, "pattern"),
            Self::FixedLength => write!(f, "fixed-length"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Raw detector output.
///
/// For [`Strategy::Index`] the values are page numbers; for every other
/// strategy they are byte offsets. Use [`Detection::into_chapter_map`] to get
/// offsets in either case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub strategy: Strategy,
    pub entries: BTreeMap<u32, usize>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert to a byte-offset [`ChapterMap`] over `text`.
    pub fn into_chapter_map(self, text: &str, page_size: usize) -> ChapterMap {
        match self.strategy {
            Strategy::Index => ChapterMap::from_offsets(
                self.entries
                    .into_iter()
                    .map(|(chapter, page)| (chapter, page.saturating_sub(1) * page_size)),
                text,
            ),
            _ => ChapterMap::from_offsets(self.entries, text),
        }
    }
}

/// Three-tier chapter detector.
#[derive(Debug, Clone, Copy)]
pub struct ChapterDetector {
    pub page_size: usize,
    /// Pages per fixed-length chapter.
    pub chapter_length: usize,
    /// Leading pages searched for an index.
    pub index_pages: usize,
}

impl ChapterDetector {
    pub fn new(page_size: usize, chapter_length: usize, index_pages: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            chapter_length: chapter_length.max(1),
            index_pages,
        }
    }

    pub fn from_config(config: &TomoConfig) -> Self {
        Self::new(config.page_size, config.chapter_length, config.index_pages)
    }

    /// Run the strategies in priority order; never fails.
    pub fn detect(&self, text: &str) -> Detection {
        let index = self.scan_index(text);
        if !index.is_empty() {
            info!("Index found: {} chapters", index.len());
            return Detection {
                strategy: Strategy::Index,
                entries: index,
            };
        }

        let headings = self.scan_headings(text);
        if !headings.is_empty() {
            info!("No index, found {} chapter headings", headings.len());
            return Detection {
                strategy: Strategy::Pattern,
                entries: headings,
            };
        }

        let blocks = self.fixed_blocks(text);
        if !blocks.is_empty() {
            info!(
                "No chapters found, splitting every {} pages ({} chapters)",
                self.chapter_length,
                blocks.len()
            );
            return Detection {
                strategy: Strategy::FixedLength,
                entries: blocks,
            };
        }

        info!("No chapters found");
        Detection {
            strategy: Strategy::None,
            entries: BTreeMap::new(),
        }
    }

    /// Detect and convert straight to a byte-offset map.
    pub fn detect_map(&self, text: &str) -> (Strategy, ChapterMap) {
        let detection = self.detect(text);
        let strategy = detection.strategy;
        (strategy, detection.into_chapter_map(text, self.page_size))
    }

    /// Index lines in the leading window: chapter → declared page.
    ///
    /// A chapter listed twice keeps the last page seen.
    fn scan_index(&self, text: &str) -> BTreeMap<u32, usize> {
        let window_end = floor_char_boundary(text, self.index_pages.saturating_mul(self.page_size));
        let window = &text[..window_end];
        let mut index = BTreeMap::new();

        for cap in INDEX_LINE_RE.captures_iter(window) {
            let (Some(chapter), Some(page)) = (parse_num::<u32>(&cap[1]), parse_num(&cap[2]))
            else {
                continue;
            };
            if let Some(previous) = index.insert(chapter, page) {
                if previous != page {
                    warn!(
                        "Index lists chapter {} twice (page {} then {}); keeping the last",
                        chapter, previous, page
                    );
                }
            }
        }
        index
    }

    /// Chapter headings across the whole text: chapter → first offset.
    fn scan_headings(&self, text: &str) -> BTreeMap<u32, usize> {
        let mut headings = BTreeMap::new();
        for cap in HEADING_RE.captures_iter(text) {
            let Some(chapter) = parse_num::<u32>(&cap[1]) else {
                continue;
            };
            let offset = cap.get(0).map(|m| m.start()).unwrap_or(0);
            headings.entry(chapter).or_insert_with(|| {
                debug!("Heading for chapter {} at byte {}", chapter, offset);
                offset
            });
        }
        headings
    }

    /// Full blocks of `chapter_length * page_size` bytes, numbered from 1.
    ///
    /// A trailing partial block is dropped.
    fn fixed_blocks(&self, text: &str) -> BTreeMap<u32, usize> {
        let block = self.chapter_length * self.page_size;
        let count = text.len() / block;
        (0..count)
            .map(|i| ((i + 1) as u32, floor_char_boundary(text, i * block)))
            .collect()
    }
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self::from_config(&TomoConfig::default())
    }
}

fn parse_num<T: std::str::FromStr>(s: &str) -> Option<T> {
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomo_core::PageRange;

    fn detector(page_size: usize) -> ChapterDetector {
        ChapterDetector::new(page_size, 12, 5)
    }

    #[test]
    fn test_short_text_without_markers_is_empty() {
        let text = "Nothing to see here. ".repeat(10);
        let d = detector(100);
        let detection = d.detect(&text);
        assert_eq!(detection.strategy, Strategy::None);
        assert!(detection.is_empty());
        assert!(d.detect_map(&text).1.is_empty());
    }

    #[test]
    fn test_empty_text() {
        let (strategy, map) = detector(100).detect_map("");
        assert_eq!(strategy, Strategy::None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_pattern_scenario() {
        let text = format!(
            "Capitolo 1\n{}\nCapitolo 2\n{}",
            "content ".repeat(20),
            "content ".repeat(20)
        );
        let second = text.find("Capitolo 2").unwrap();
        let (strategy, map) = detector(100).detect_map(&text);
        assert_eq!(strategy, Strategy::Pattern);
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![(1, 0), (2, second)]);

        // 343 bytes, chapter 2 at byte 172: both chapters touch page 2.
        assert_eq!((second, text.len()), (172, 343));
        let ranges = crate::pages::map(&map, text.len(), 100);
        assert_eq!(ranges[&1], PageRange::new(1, 2));
        assert_eq!(ranges[&2], PageRange::new(2, 4));
    }

    #[test]
    fn test_pattern_first_occurrence_wins() {
        let text = "Chapter 1 begins. Chapter 2 starts. Later we recall chapter 2 again.";
        let detection = detector(1000).detect(text);
        assert_eq!(detection.strategy, Strategy::Pattern);
        assert_eq!(detection.entries[&2], text.find("Chapter 2").unwrap());
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        let text = "CHAPTER 4 loud. capitolo 5 quiet.";
        let detection = detector(1000).detect(text);
        assert_eq!(detection.entries.keys().copied().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_index_short_circuits_pattern_scan() {
        let mut text = String::from("Indice\nCapitolo 3 ........ 2\n");
        text.push_str(&"testo ".repeat(40));
        // Body headings that the pattern scan would otherwise pick up.
        text.push_str("Capitolo 7 here. Capitolo 8 there.");
        let detection = detector(100).detect(&text);
        assert_eq!(detection.strategy, Strategy::Index);
        assert_eq!(detection.entries.len(), 1);
        assert_eq!(detection.entries[&3], 2);
    }

    #[test]
    fn test_index_values_are_pages() {
        let mut text = String::from("Contents\nChapter 1 ... 1\nChapter 2 ... 3\n");
        text.push_str(&"x".repeat(500));
        let d = detector(100);
        let detection = d.detect(&text);
        assert_eq!(detection.entries[&2], 3);

        let map = detection.into_chapter_map(&text, 100);
        assert_eq!(map.start(1), Some(0));
        assert_eq!(map.start(2), Some(200));
    }

    #[test]
    fn test_index_pages_past_end_are_dropped() {
        let mut text = String::from("Contents\nChapter 1 ... 1\nChapter 2 ... 40\nChapter 3 ... 90\n");
        text.push_str(&"x".repeat(300));
        let (strategy, map) = detector(100).detect_map(&text);
        assert_eq!(strategy, Strategy::Index);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(1, 0)]);
    }

    #[test]
    fn test_index_entirely_past_end_has_no_fallback() {
        let mut text = String::from("Indice\nCapitolo 1 ........ 50\nCapitolo 2 ........ 60\n");
        // Headings and length that the later strategies would accept.
        text.push_str(&"Capitolo 1 testo. ".repeat(10));
        let (strategy, map) = detector(100).detect_map(&text);
        assert_eq!(strategy, Strategy::Index);
        assert!(map.is_empty());
    }

    #[test]
    fn test_index_duplicate_last_wins() {
        let mut text = String::from("Chapter 1 .... 1\nChapter 2 .... 2\nChapter 2 .... 4\n");
        text.push_str(&"x".repeat(600));
        let detection = detector(100).detect(&text);
        assert_eq!(detection.entries[&2], 4);
    }

    #[test]
    fn test_index_only_in_leading_window() {
        // Index-like line beyond 5 pages of 10 bytes: not an index, just a heading.
        let mut text = "y".repeat(80);
        text.push_str("\nChapter 1 ...... 9\n");
        let detection = detector(10).detect(&text);
        assert_eq!(detection.strategy, Strategy::Pattern);
    }

    #[test]
    fn test_heading_line_alone_is_not_index() {
        let text = "Chapter 12\nIt was a dark night.";
        let detection = detector(1000).detect(text);
        assert_eq!(detection.strategy, Strategy::Pattern);
        assert_eq!(detection.entries[&12], 0);
    }

    #[test]
    fn test_fixed_length_fallback_drops_partial_block() {
        // Block = 12 pages * 10 bytes = 120 bytes; 250 bytes → 2 full blocks.
        let text = "z".repeat(250);
        let d = ChapterDetector::new(10, 12, 5);
        let detection = d.detect(&text);
        assert_eq!(detection.strategy, Strategy::FixedLength);
        let entries: Vec<_> = detection.entries.into_iter().collect();
        assert_eq!(entries, vec![(1, 0), (2, 120)]);
    }

    #[test]
    fn test_fixed_length_respects_char_boundaries() {
        // Multi-byte chars so block edges land mid-character.
        let text = "é".repeat(150); // 300 bytes
        let d = ChapterDetector::new(11, 12, 0); // block = 132
        let (_, map) = d.detect_map(&text);
        for (_, offset) in map.iter() {
            assert!(text.is_char_boundary(offset));
        }
        assert_eq!(map.len(), 2);
    }
}
