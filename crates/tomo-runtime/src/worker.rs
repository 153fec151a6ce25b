//! Per-chapter analysis worker.
//!
//! Protocol: mark the chapter `incomplete` on disk, run the analysis stages,
//! then append the completion marker and payload. Every stage error (and any
//! panic) is caught here and persisted as an `Error` row.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tomo_core::{AnalysisResult, ChapterFailure, ChapterOutcome, EntityCount, TomoConfig};
use tomo_infer::ModelSet;
use tomo_ingest::{summarize, SpanChunker};
use tracing::{debug, warn};

use crate::artifact::ChapterArtifact;
use crate::reconcile::reconcile;

/// Runs the analysis stages for one chapter at a time. Shareable across tasks.
pub struct AnalysisWorker {
    models: ModelSet,
    chunker: SpanChunker,
    similarity_threshold: f32,
    max_entities: usize,
    summary_sentences: usize,
}

impl AnalysisWorker {
    pub fn new(models: ModelSet, config: &TomoConfig) -> Self {
        Self {
            models,
            chunker: SpanChunker::new(config.max_model_input),
            similarity_threshold: config.similarity_threshold,
            max_entities: config.max_entities,
            summary_sentences: config.summary_sentences,
        }
    }

    /// Full worker protocol for one chapter, artifact included.
    pub fn run(
        &self,
        document: &str,
        chapter: u32,
        text: &str,
        output_dir: &Path,
    ) -> ChapterOutcome {
        let artifact = ChapterArtifact::begin(output_dir, document, chapter).map_err(|e| {
            warn!("Chapter {}: cannot create status artifact: {}", chapter, e);
            ChapterFailure::Artifact(e.to_string())
        })?;

        let outcome = catch_unwind(AssertUnwindSafe(|| self.analyze(text)))
            .unwrap_or_else(|panic| Err(ChapterFailure::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(result) => {
                artifact
                    .complete(&result, self.max_entities)
                    .map_err(|e| {
                        warn!("Chapter {}: cannot record completion: {}", chapter, e);
                        ChapterFailure::Artifact(e.to_string())
                    })?;
                debug!(
                    "Chapter {} complete: {} entities, emotion={}",
                    chapter,
                    result.entities.len(),
                    result.dominant_emotion
                );
                Ok(result)
            }
            Err(failure) => {
                warn!("Chapter {} failed: {}", chapter, failure);
                if let Err(e) = artifact.fail(&failure.to_string()) {
                    warn!("Chapter {}: cannot record failure reason: {}", chapter, e);
                }
                Err(failure)
            }
        }
    }

    /// Analysis stages only; no I/O.
    pub fn analyze(&self, text: &str) -> ChapterOutcome {
        let spans = self.chunker.chunk(text);
        if spans.is_empty() {
            return Err(ChapterFailure::NoContent);
        }

        // Entities, accumulated per (name, category) in first-seen order.
        let mut order: Vec<(String, String)> = Vec::new();
        let mut counts: HashMap<(String, String), usize> = HashMap::new();
        for span in &spans {
            let found = self
                .models
                .tagger
                .analyze_entities(&span.text)
                .map_err(|e| ChapterFailure::stage("entity", e))?;
            for entity in found {
                let key = (entity.name, entity.category);
                if !counts.contains_key(&key) {
                    order.push(key.clone());
                }
                *counts.entry(key).or_insert(0) += entity.count;
            }
        }
        let mut entities: Vec<EntityCount> = order
            .into_iter()
            .map(|key| {
                let count = counts.get(&key).copied().unwrap_or(0);
                EntityCount {
                    name: key.0,
                    category: key.1,
                    count,
                }
            })
            .collect();
        entities.sort_by(|a, b| b.count.cmp(&a.count));

        // Emotion, weighted by confidence, in first-seen label order.
        let mut emotion_scores: Vec<(String, f64)> = Vec::new();
        for span in &spans {
            let score = self
                .models
                .emotion
                .score_emotion(&span.text)
                .map_err(|e| ChapterFailure::stage("emotion", e))?;
            match emotion_scores.iter_mut().find(|(label, _)| *label == score.label) {
                Some((_, total)) => *total += score.score,
                None => emotion_scores.push((score.label, score.score)),
            }
        }
        let dominant_emotion = dominant_label(&emotion_scores).ok_or(ChapterFailure::NoContent)?;

        let entities = reconcile(
            entities,
            self.models.embedder.as_ref(),
            self.similarity_threshold,
        );

        let summary = if self.summary_sentences > 0 {
            summarize(text, self.summary_sentences)
        } else {
            None
        };

        Ok(AnalysisResult {
            entities,
            dominant_emotion,
            emotion_scores,
            summary,
        })
    }
}

/// Label with the highest accumulated score; the first one wins ties.
fn dominant_label(scores: &[(String, f64)]) -> Option<String> {
    let mut best: Option<&(String, f64)> = None;
    for entry in scores {
        if best.map_or(true, |b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    best.map(|(label, _)| label.clone())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
