//! Tomo Ingest: text extraction, chapter detection, page mapping, span chunking, summaries.

pub mod chunking;
pub mod detect;
pub mod file;
pub mod pages;
pub mod summary;

pub use chunking::{SpanChunker, TextSpan};
pub use detect::{ChapterDetector, Detection, Strategy};
pub use file::{extract_text, load_document, FileType, TextExtractor};
pub use pages::{paginate, ReaderSession};
pub use summary::{extract_key_sentences, summarize};
