//! Chapter maps, page ranges, per-chapter status and run summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::document::floor_char_boundary;

/// Ordered chapter number → start byte offset.
///
/// Invariants: offsets strictly increase with chapter number, lie on char
/// boundaries and are strictly inside the text. Chapter `k` ends where the
/// next chapter starts, or at the end of the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChapterMap {
    starts: BTreeMap<u32, usize>,
}

/// One chapter's byte span within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterSpan {
    pub chapter: u32,
    pub start: usize,
    pub end: usize,
}

impl ChapterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw `(chapter, offset)` entries against `text`.
    ///
    /// Offsets are aligned down to char boundaries. Entries at or past the end
    /// of the text, or not strictly after the previous kept chapter, are dropped.
    pub fn from_offsets(entries: impl IntoIterator<Item = (u32, usize)>, text: &str) -> Self {
        let raw: BTreeMap<u32, usize> = entries.into_iter().collect();
        let mut starts = BTreeMap::new();
        let mut previous: Option<usize> = None;

        for (chapter, offset) in raw {
            let offset = floor_char_boundary(text, offset);
            if offset >= text.len() {
                debug!("Dropping chapter {}: offset {} past end of text", chapter, offset);
                continue;
            }
            if previous.is_some_and(|p| offset <= p) {
                debug!(
                    "Dropping chapter {}: offset {} does not follow previous chapter",
                    chapter, offset
                );
                continue;
            }
            starts.insert(chapter, offset);
            previous = Some(offset);
        }

        Self { starts }
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Start offset of a chapter.
    pub fn start(&self, chapter: u32) -> Option<usize> {
        self.starts.get(&chapter).copied()
    }

    /// Chapters in ascending order with their start offsets.
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.starts.iter().map(|(&c, &o)| (c, o))
    }

    /// Byte spans for every chapter, given the document length.
    pub fn spans(&self, text_len: usize) -> Vec<ChapterSpan> {
        let entries: Vec<(u32, usize)> = self.iter().collect();
        entries
            .iter()
            .enumerate()
            .map(|(i, &(chapter, start))| {
                let end = entries.get(i + 1).map(|&(_, s)| s).unwrap_or(text_len);
                ChapterSpan {
                    chapter,
                    start,
                    end: end.max(start),
                }
            })
            .collect()
    }

    /// Owned text slice for every chapter.
    pub fn slices(&self, text: &str) -> Vec<(u32, String)> {
        self.spans(text.len())
            .into_iter()
            .map(|span| {
                let end = floor_char_boundary(text, span.end);
                (span.chapter, text[span.start..end].to_string())
            })
            .collect()
    }
}

/// Inclusive, 1-based page range of a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start_page: usize,
    pub end_page: usize,
}

impl PageRange {
    pub fn new(start_page: usize, end_page: usize) -> Self {
        Self {
            start_page,
            end_page,
        }
    }

    /// Whether `page` falls in the inclusive range.
    pub fn contains(&self, page: usize) -> bool {
        page >= self.start_page && page <= self.end_page
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_page, self.end_page)
    }
}

impl std::str::FromStr for PageRange {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| crate::Error::Artifact(format!("malformed page range '{}'", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| crate::Error::Artifact(format!("malformed page range '{}'", s)))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

/// Chapter lifecycle. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    Pending,
    /// Persisted as `incomplete`.
    #[serde(rename = "incomplete")]
    InProgress,
    #[serde(rename = "completed")]
    Complete,
    Failed,
}

impl ChapterStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "incomplete"),
            Self::Complete => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ChapterStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "incomplete" => Ok(Self::InProgress),
            "completed" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::Artifact(format!("unknown status '{}'", other))),
        }
    }
}

/// One (reconciled) entity with its mention count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCount {
    pub name: String,
    pub category: String,
    pub count: usize,
}

/// Computed payload for one chapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Entities ranked by count, descending.
    pub entities: Vec<EntityCount>,
    pub dominant_emotion: String,
    /// Accumulated score per label, in first-seen order.
    pub emotion_scores: Vec<(String, f64)>,
    /// Extractive narrative summary, if enabled.
    pub summary: Option<String>,
}

/// Why a chapter did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChapterFailure {
    #[error("chapter has no analyzable content")]
    NoContent,

    #[error("{stage} stage failed: {reason}")]
    Stage { stage: String, reason: String },

    #[error("status artifact could not be written: {0}")]
    Artifact(String),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker process failed: {0}")]
    Process(String),
}

impl ChapterFailure {
    pub fn stage(stage: &str, reason: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Explicit per-chapter result.
pub type ChapterOutcome = std::result::Result<AnalysisResult, ChapterFailure>;

/// One row of the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub chapter: u32,
    pub pages: PageRange,
    pub status: ChapterStatus,
}

/// Per-document outcome of an analysis run, one row per chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub document: String,
    pub rows: Vec<SummaryRow>,
}

impl RunSummary {
    /// Build a summary; rows are re-sorted into ascending chapter order.
    pub fn new(document: impl Into<String>, mut rows: Vec<SummaryRow>) -> Self {
        rows.sort_by_key(|r| r.chapter);
        Self {
            document: document.into(),
            rows,
        }
    }

    pub fn empty(document: impl Into<String>) -> Self {
        Self::new(document, Vec::new())
    }

    pub fn completed(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.status == ChapterStatus::Complete)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.completed()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
