//! Tomo runtime: per-chapter workers, the bounded scheduler and the pipeline
//! that ties detection, analysis and summary writing together.

pub mod artifact;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod worker;

pub use artifact::{clear_chapters, final_status, read_chapter, ChapterArtifact, ChapterRecord, SummaryWriter};
pub use pipeline::{Pipeline, PipelineReport, Structure};
pub use reconcile::reconcile;
pub use scheduler::AnalysisScheduler;
pub use worker::AnalysisWorker;
