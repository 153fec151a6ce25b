//! Concurrent chapter dispatch.
//!
//! Every chapter is dispatched exactly once onto a pool bounded by a
//! semaphore, all of them are joined (no fail-fast, no timeout), and the
//! final status of each is then read back from its artifact. Artifacts from
//! an earlier run of the same document are removed before dispatch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tomo_core::{
    ChapterFailure, ChapterMap, ChapterStatus, Document, RunSummary, SummaryRow, TomoConfig,
    WorkerIsolation,
};
use tomo_ingest::pages;
use tracing::{debug, error, info, warn};

use crate::artifact::{clear_chapters, final_status};
use crate::worker::AnalysisWorker;

/// Bounded worker pool over the chapters of one document.
pub struct AnalysisScheduler {
    worker: Arc<AnalysisWorker>,
    isolation: WorkerIsolation,
    budget: usize,
    page_size: usize,
    worker_command: Option<PathBuf>,
    worker_args: Vec<String>,
}

impl AnalysisScheduler {
    pub fn new(worker: AnalysisWorker, config: &TomoConfig) -> Self {
        Self {
            worker: Arc::new(worker),
            isolation: config.isolation,
            budget: config.worker_budget(),
            page_size: config.page_size,
            worker_command: None,
            worker_args: config.worker_args(),
        }
    }

    pub fn with_isolation(mut self, isolation: WorkerIsolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Executable re-run for [`WorkerIsolation::Process`]; defaults to the
    /// current executable.
    pub fn with_worker_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.worker_command = Some(command.into());
        self
    }

    pub fn isolation(&self) -> WorkerIsolation {
        self.isolation
    }

    /// Analyze every chapter and return one row per chapter, ascending.
    ///
    /// Never fails because of a chapter: unfinished chapters become `failed` rows.
    pub async fn run(
        &self,
        document: &Document,
        chapters: &ChapterMap,
        output_dir: &Path,
    ) -> RunSummary {
        if let Err(e) = clear_chapters(output_dir, document.name()) {
            warn!("Cannot clear previous artifacts of {}: {}", document.name(), e);
        }
        if chapters.is_empty() {
            info!("No chapters to analyze for {}", document.name());
            return RunSummary::empty(document.name());
        }

        // Owned slices: workers never share the document buffer.
        let slices = chapters.slices(document.text());
        let pool_size = self.budget.clamp(1, slices.len());
        info!(
            "Analyzing {} chapters of {} with {} workers ({} isolation)",
            slices.len(),
            document.name(),
            pool_size,
            self.isolation
        );

        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut join_set: JoinSet<(u32, Result<(), ChapterFailure>)> = JoinSet::new();

        for (chapter, text) in slices {
            let semaphore = semaphore.clone();
            let worker = self.worker.clone();
            let document_name = document.name().to_string();
            let output_dir = output_dir.to_path_buf();
            let isolation = self.isolation;
            let command = self.worker_command.clone();
            let worker_args = self.worker_args.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (chapter, Err(ChapterFailure::Process(e.to_string()))),
                };
                debug!("Dispatching chapter {}", chapter);
                let result = match isolation {
                    WorkerIsolation::Task => {
                        run_in_task(worker, document_name, chapter, text, output_dir).await
                    }
                    WorkerIsolation::Process => {
                        run_in_process(
                            command,
                            &worker_args,
                            &document_name,
                            chapter,
                            text,
                            &output_dir,
                        )
                        .await
                    }
                };
                (chapter, result)
            });
        }

        // Join barrier.
        let mut finished = BTreeSet::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((chapter, Ok(()))) => {
                    debug!("Chapter {} finished", chapter);
                    finished.insert(chapter);
                }
                Ok((chapter, Err(failure))) => warn!("Chapter {} did not complete: {}", chapter, failure),
                Err(e) => error!("Worker join failed: {}", e),
            }
        }

        // A chapter completes only if its dispatch succeeded and its artifact
        // carries the completion marker.
        let ranges = pages::map(chapters, document.len(), self.page_size);
        let rows: Vec<SummaryRow> = ranges
            .into_iter()
            .map(|(chapter, pages)| SummaryRow {
                chapter,
                pages,
                status: if finished.contains(&chapter) {
                    final_status(output_dir, document.name(), chapter)
                } else {
                    ChapterStatus::Failed
                },
            })
            .collect();

        let summary = RunSummary::new(document.name(), rows);
        info!(
            "Run complete for {}: {} completed, {} failed",
            document.name(),
            summary.completed(),
            summary.failed()
        );
        summary
    }
}

async fn run_in_task(
    worker: Arc<AnalysisWorker>,
    document: String,
    chapter: u32,
    text: String,
    output_dir: PathBuf,
) -> Result<(), ChapterFailure> {
    tokio::task::spawn_blocking(move || worker.run(&document, chapter, &text, &output_dir))
        .await
        .map_err(|e| ChapterFailure::Panicked(e.to_string()))?
        .map(|_| ())
}

/// Re-execute the binary as `worker --document <name> --chapter <n> --output <dir>`
/// plus the analysis settings, with the chapter text on stdin.
async fn run_in_process(
    command: Option<PathBuf>,
    worker_args: &[String],
    document: &str,
    chapter: u32,
    text: String,
    output_dir: &Path,
) -> Result<(), ChapterFailure> {
    let program = match command {
        Some(path) => path,
        None => std::env::current_exe().map_err(|e| ChapterFailure::Process(e.to_string()))?,
    };

    let mut child = Command::new(&program)
        .arg("worker")
        .arg("--document")
        .arg(document)
        .arg("--chapter")
        .arg(chapter.to_string())
        .arg("--output")
        .arg(output_dir)
        .args(worker_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ChapterFailure::Process(format!("{}: {}", program.display(), e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ChapterFailure::Process(format!("writing chapter text: {}", e)))?;
        // Dropping stdin closes the pipe so the worker sees EOF.
    }

    let status = child
        .wait()
        .await
        .map_err(|e| ChapterFailure::Process(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(ChapterFailure::Process(format!("worker exited with {}", status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tomo_core::{chapter_artifact_path, EntityCount, Error, Result};
    use tomo_infer::{EmotionScore, EmotionScorer, EntityTagger, ModelSet};

    use crate::artifact::read_chapter;

    /// Fails deterministically on any span mentioning `poison`.
    struct PoisonedScorer;

    impl EmotionScorer for PoisonedScorer {
        fn score_emotion(&self, text: &str) -> Result<EmotionScore> {
            if text.contains("poison") {
                Err(Error::Inference("cannot score poisoned text".into()))
            } else {
                Ok(EmotionScore {
                    label: "neutral".into(),
                    score: 0.5,
                })
            }
        }
    }

    /// Counts calls; used to observe dispatches.
    struct CountingTagger(Arc<AtomicUsize>);

    impl EntityTagger for CountingTagger {
        fn analyze_entities(&self, _text: &str) -> Result<Vec<EntityCount>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn config(max_workers: usize) -> TomoConfig {
        TomoConfig {
            page_size: 100,
            max_workers,
            isolation: WorkerIsolation::Task,
            ..TomoConfig::default()
        }
    }

    fn chaptered(n: usize) -> (Document, ChapterMap) {
        let text: String = (1..=n)
            .map(|i| format!("Chapter {} Some plain words for this part of the tale.\n", i))
            .collect();
        let offsets: Vec<(u32, usize)> = (1..=n)
            .map(|i| {
                let marker = format!("Chapter {} ", i);
                (i as u32, text.find(&marker).unwrap())
            })
            .collect();
        let map = ChapterMap::from_offsets(offsets, &text);
        (Document::new("tale", text), map)
    }

    #[tokio::test]
    async fn test_n_chapters_n_rows() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut models = ModelSet::heuristic();
        models.tagger = Arc::new(CountingTagger(calls.clone()));
        let config = config(3);
        let scheduler = AnalysisScheduler::new(AnalysisWorker::new(models, &config), &config);

        let (document, chapters) = chaptered(7);
        let summary = scheduler.run(&document, &chapters, dir.path()).await;

        assert_eq!(summary.rows.len(), 7);
        // Each chapter fits one span, so one tagger call per dispatch.
        assert_eq!(calls.load(Ordering::SeqCst), 7);
        let order: Vec<u32> = summary.rows.iter().map(|r| r.chapter).collect();
        assert_eq!(order, (1..=7).collect::<Vec<_>>());
        assert!(summary.rows.iter().all(|r| r.status == ChapterStatus::Complete));
    }

    #[tokio::test]
    async fn test_zero_chapters_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let scheduler =
            AnalysisScheduler::new(AnalysisWorker::new(ModelSet::heuristic(), &config), &config);

        let document = Document::new("empty", "");
        let summary = scheduler.run(&document, &ChapterMap::new(), dir.path()).await;
        assert!(summary.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut models = ModelSet::heuristic();
        models.emotion = Arc::new(PoisonedScorer);
        let config = config(0);
        let scheduler = AnalysisScheduler::new(AnalysisWorker::new(models, &config), &config);

        let text = "Chapter 1 calm words here.\nChapter 2 a poison cup.\nChapter 3 calm again.\n";
        let chapters = ChapterMap::from_offsets(
            [
                (1, 0),
                (2, text.find("Chapter 2").unwrap()),
                (3, text.find("Chapter 3").unwrap()),
            ],
            text,
        );
        let document = Document::new("poison", text);
        let summary = scheduler.run(&document, &chapters, dir.path()).await;

        let statuses: Vec<ChapterStatus> = summary.rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ChapterStatus::Complete, ChapterStatus::Failed, ChapterStatus::Complete]
        );
        for chapter in [1, 3] {
            let record = read_chapter(dir.path(), "poison", chapter).unwrap();
            assert_eq!(record.dominant_emotion.as_deref(), Some("neutral"));
        }
        let failed = read_chapter(dir.path(), "poison", 2).unwrap();
        assert!(failed.error.unwrap().contains("poisoned"));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let scheduler =
            AnalysisScheduler::new(AnalysisWorker::new(ModelSet::heuristic(), &config), &config);
        let (document, chapters) = chaptered(4);

        let first = scheduler.run(&document, &chapters, dir.path()).await;
        let second = scheduler.run(&document, &chapters, dir.path()).await;
        assert_eq!(first.rows, second.rows);
    }

    #[tokio::test]
    async fn test_unstartable_worker_process_fails_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(1);
        let scheduler = AnalysisScheduler::new(
            AnalysisWorker::new(ModelSet::heuristic(), &config),
            &config,
        )
        .with_isolation(WorkerIsolation::Process)
        .with_worker_command("/nonexistent/tomo");

        let (document, chapters) = chaptered(2);
        let summary = scheduler.run(&document, &chapters, dir.path()).await;
        // The worker process never started: no artifact, so both rows fail.
        assert_eq!(summary.failed(), 2);
    }

    #[tokio::test]
    async fn test_rerun_does_not_report_stale_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let (document, chapters) = chaptered(2);

        let first =
            AnalysisScheduler::new(AnalysisWorker::new(ModelSet::heuristic(), &config), &config)
                .run(&document, &chapters, dir.path())
                .await;
        assert_eq!(first.completed(), 2);

        // Second run over the same output directory with workers that never start.
        let second =
            AnalysisScheduler::new(AnalysisWorker::new(ModelSet::heuristic(), &config), &config)
                .with_isolation(WorkerIsolation::Process)
                .with_worker_command("/nonexistent/tomo")
                .run(&document, &chapters, dir.path())
                .await;
        assert_eq!(second.failed(), 2);
        for chapter in [1, 2] {
            assert!(!chapter_artifact_path(dir.path(), "tale", chapter).exists());
        }
    }

    #[tokio::test]
    async fn test_rerun_with_fewer_chapters_removes_extra_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let scheduler =
            AnalysisScheduler::new(AnalysisWorker::new(ModelSet::heuristic(), &config), &config);

        let (document, chapters) = chaptered(3);
        scheduler.run(&document, &chapters, dir.path()).await;
        assert!(chapter_artifact_path(dir.path(), "tale", 3).exists());

        let (document, chapters) = chaptered(2);
        let summary = scheduler.run(&document, &chapters, dir.path()).await;
        assert_eq!(summary.completed(), 2);
        assert!(chapter_artifact_path(dir.path(), "tale", 2).exists());
        assert!(!chapter_artifact_path(dir.path(), "tale", 3).exists());
    }
}
