//! End-to-end pipeline: load, detect, map pages, schedule, summarize.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tomo_core::{ChapterMap, Document, PageRange, Result, RunSummary, TomoConfig, WorkerIsolation};
use tomo_infer::{create_models, ModelSet};
use tomo_ingest::{load_document, pages, ChapterDetector, Strategy};
use tracing::info;

use crate::artifact::SummaryWriter;
use crate::scheduler::AnalysisScheduler;
use crate::worker::AnalysisWorker;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub document: String,
    pub strategy: Strategy,
    pub pages: BTreeMap<u32, PageRange>,
    pub summary: RunSummary,
    /// `None` when there was nothing to analyze.
    pub summary_path: Option<PathBuf>,
}

/// Chapter structure of a document, without analysis.
#[derive(Debug, Clone)]
pub struct Structure {
    pub strategy: Strategy,
    pub chapters: ChapterMap,
    pub pages: BTreeMap<u32, PageRange>,
}

pub struct Pipeline {
    config: TomoConfig,
    detector: ChapterDetector,
    scheduler: AnalysisScheduler,
}

impl Pipeline {
    /// Pipeline with the best models available for `config`.
    pub fn new(config: TomoConfig) -> Self {
        let models = create_models(&config);
        Self::with_models(config, models)
    }

    pub fn with_models(config: TomoConfig, models: ModelSet) -> Self {
        let detector = ChapterDetector::from_config(&config);
        let scheduler = AnalysisScheduler::new(AnalysisWorker::new(models, &config), &config);
        Self {
            config,
            detector,
            scheduler,
        }
    }

    /// Override the executable used for process-isolated workers.
    pub fn with_worker_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.scheduler = self.scheduler.with_worker_command(command);
        self
    }

    pub fn config(&self) -> &TomoConfig {
        &self.config
    }

    pub fn isolation(&self) -> WorkerIsolation {
        self.scheduler.isolation()
    }

    /// Chapters and their page ranges.
    pub fn structure(&self, document: &Document) -> Structure {
        let (strategy, chapters) = self.detector.detect_map(document.text());
        let pages = pages::map(&chapters, document.len(), self.config.page_size);
        Structure {
            strategy,
            chapters,
            pages,
        }
    }

    /// Load `path` and report its structure.
    pub fn detect(&self, path: &Path) -> Result<(Document, Structure)> {
        let document = load_document(path)?;
        let structure = self.structure(&document);
        Ok((document, structure))
    }

    /// Run the full pipeline over the file at `path`.
    pub async fn analyze(&self, path: &Path) -> Result<PipelineReport> {
        let document = load_document(path)?;
        info!(
            "Loaded {} ({} bytes) as {}",
            path.display(),
            document.len(),
            document.name()
        );
        self.analyze_document(&document).await
    }

    /// Run the pipeline over an already loaded document.
    pub async fn analyze_document(&self, document: &Document) -> Result<PipelineReport> {
        let Structure {
            strategy,
            chapters,
            pages,
        } = self.structure(document);
        info!(
            "Strategy {} found {} chapters in {}",
            strategy,
            chapters.len(),
            document.name()
        );

        let output_dir = &self.config.output_dir;
        let summary = self.scheduler.run(document, &chapters, output_dir).await;

        let summary_path = if summary.is_empty() {
            if SummaryWriter::remove(output_dir, document.name())? {
                info!("Removed stale summary for {}", document.name());
            }
            None
        } else {
            Some(SummaryWriter::write(output_dir, document.name(), &summary.rows)?)
        };

        Ok(PipelineReport {
            document: document.name().to_string(),
            strategy,
            pages,
            summary,
            summary_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomo_core::{ChapterStatus, Error};

    use crate::artifact::read_chapter;

    fn config(output_dir: &Path) -> TomoConfig {
        TomoConfig {
            page_size: 100,
            max_workers: 2,
            output_dir: output_dir.to_path_buf(),
            isolation: WorkerIsolation::Task,
            ..TomoConfig::default()
        }
    }

    const NOVEL: &str = "Capitolo 1\nRenzo walked to the village with joy in his heart.\n\
        Capitolo 2\nLucia waited by the lake, afraid of the night.\n\
        Capitolo 3\nDon Abbondio was angry and full of rage.\n";

    #[tokio::test]
    async fn test_analyze_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("novel.txt");
        std::fs::write(&source, NOVEL).unwrap();
        let output = dir.path().join("out");

        let pipeline = Pipeline::with_models(config(&output), ModelSet::heuristic());
        let report = pipeline.analyze(&source).await.unwrap();

        assert_eq!(report.strategy, Strategy::Pattern);
        assert_eq!(report.summary.rows.len(), 3);
        assert_eq!(report.summary.completed(), 3);
        assert_eq!(report.pages.len(), 3);
        assert_eq!(report.pages[&1].start_page, 1);

        let summary_path = report.summary_path.unwrap();
        assert!(summary_path.exists());
        let stored = SummaryWriter::read(&output, &report.document).unwrap();
        assert_eq!(stored.rows, report.summary.rows);

        let record = read_chapter(&output, &report.document, 2).unwrap();
        assert_eq!(record.status, ChapterStatus::Complete);
        assert_eq!(record.dominant_emotion.as_deref(), Some("fear"));
    }

    #[tokio::test]
    async fn test_empty_document_removes_stale_summary() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("blank.txt");
        std::fs::write(&source, "").unwrap();
        let output = dir.path().join("out");
        let pipeline = Pipeline::with_models(config(&output), ModelSet::heuristic());

        let document = load_document(&source).unwrap();
        SummaryWriter::write(&output, document.name(), &[]).unwrap();

        let report = pipeline.analyze(&source).await.unwrap();
        assert_eq!(report.strategy, Strategy::None);
        assert!(report.summary.is_empty());
        assert!(report.summary_path.is_none());
        assert!(!tomo_core::summary_path(&output, document.name()).exists());
    }

    #[tokio::test]
    async fn test_input_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_models(config(dir.path()), ModelSet::heuristic());

        let missing = pipeline.analyze(&dir.path().join("nope.txt")).await.unwrap_err();
        assert!(matches!(missing, Error::NotFound(_)));
        assert_eq!(missing.exit_code(), 2);

        let odt = dir.path().join("book.odt");
        std::fs::write(&odt, "text").unwrap();
        let unsupported = pipeline.analyze(&odt).await.unwrap_err();
        assert_eq!(unsupported.exit_code(), 4);
    }

    #[test]
    fn test_structure_page_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_models(config(dir.path()), ModelSet::heuristic());
        let text = format!("Capitolo 1 {}\nCapitolo 2 {}", "a".repeat(138), "b".repeat(200));
        let document = Document::new("ranges", text);

        let structure = pipeline.structure(&document);
        assert_eq!(structure.chapters.start(2), Some(150));
        assert_eq!(structure.pages[&1], PageRange::new(1, 2));
        assert_eq!(structure.pages[&2], PageRange::new(2, 4));
    }
}
