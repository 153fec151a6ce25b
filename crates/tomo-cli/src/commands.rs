//! Command implementations behind the `tomo` binary.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tomo_core::TomoConfig;
use tomo_infer::{create_models, ModelSet};
use tomo_ingest::ReaderSession;
use tomo_runtime::{read_chapter, AnalysisWorker, Pipeline, SummaryWriter};
use tracing::{debug, info};

/// Full pipeline; prints the run report as JSON.
pub async fn analyze(config: TomoConfig, path: &Path) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config);
    let report = pipeline.analyze(path).await?;
    info!(
        "{}: {} chapters, {} completed, {} failed",
        report.document,
        report.summary.rows.len(),
        report.summary.completed(),
        report.summary.failed()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Chapter structure only; no models are run.
pub fn detect(config: TomoConfig, path: &Path) -> anyhow::Result<()> {
    let pipeline = Pipeline::with_models(config, ModelSet::heuristic());
    let (document, structure) = pipeline.detect(path)?;

    println!("Document: {}", document.name());
    println!("Strategy: {}", structure.strategy);
    for (chapter, pages) in &structure.pages {
        println!("Chapter {}: pages {}", chapter, pages);
    }
    Ok(())
}

/// Print one page with its label and the chapters covering it.
pub fn page(config: TomoConfig, path: &Path, page: usize) -> anyhow::Result<()> {
    let page_size = config.page_size;
    let pipeline = Pipeline::with_models(config, ModelSet::heuristic());
    let (document, structure) = pipeline.detect(path)?;

    let mut session = ReaderSession::new(document.text(), page_size);
    if !session.go_to(page) {
        eprintln!(
            "Page {} out of range: {} has {} pages.",
            page,
            path.display(),
            session.page_count()
        );
        std::process::exit(1);
    }

    let chapters: Vec<String> = session
        .chapters_on_page(&structure.pages)
        .iter()
        .map(u32::to_string)
        .collect();
    println!("{}", session.label());
    if !chapters.is_empty() {
        println!("Chapters: {}", chapters.join(", "));
    }
    println!();
    println!("{}", session.current().unwrap_or_default());
    Ok(())
}

/// Stored summary plus the last status of every chapter artifact, as JSON.
pub fn report(config: &TomoConfig, document: &str) -> anyhow::Result<()> {
    let summary = SummaryWriter::read(&config.output_dir, document)?;

    let chapters: Vec<serde_json::Value> = summary
        .rows
        .iter()
        .map(|row| match read_chapter(&config.output_dir, document, row.chapter) {
            Ok(record) => serde_json::json!({
                "chapter": row.chapter,
                "pages": row.pages.to_string(),
                "status": row.status,
                "artifact": record,
            }),
            Err(e) => {
                debug!("Chapter {} artifact unreadable: {}", row.chapter, e);
                serde_json::json!({
                    "chapter": row.chapter,
                    "pages": row.pages.to_string(),
                    "status": row.status,
                    "artifact": null,
                    "artifactError": e.to_string(),
                })
            }
        })
        .collect();

    let report = serde_json::json!({
        "document": summary.document,
        "completed": summary.completed(),
        "failed": summary.failed(),
        "chapters": chapters,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Process-isolated chapter worker: chapter text arrives on stdin.
pub fn worker(
    config: TomoConfig,
    document: &str,
    chapter: u32,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("reading chapter text from stdin")?;
    debug!("Worker for chapter {} received {} bytes", chapter, text.len());

    let worker = AnalysisWorker::new(create_models(&config), &config);
    worker
        .run(document, chapter, &text, output_dir)
        .map_err(|failure| anyhow::anyhow!("chapter {} failed: {}", chapter, failure))?;
    Ok(())
}
