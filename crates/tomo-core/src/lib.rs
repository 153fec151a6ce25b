//! Tomo Core: shared document/chapter types, configuration, errors.

pub mod chapter;
pub mod config;
pub mod document;
pub mod error;

pub use chapter::{
    AnalysisResult, ChapterFailure, ChapterMap, ChapterOutcome, ChapterSpan, ChapterStatus,
    EntityCount, PageRange, RunSummary, SummaryRow,
};
pub use config::{
    chapter_artifact_path, document_dir, summary_path, TomoConfig, WorkerIsolation,
};
pub use document::{derive_name, floor_char_boundary, Document};
pub use error::{Error, Result};
