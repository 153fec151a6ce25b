//! Tomo Infer: entity tagging, emotion scoring and embeddings behind traits.
//!
//! The analysis pipeline only sees [`EntityTagger`], [`EmotionScorer`] and
//! [`EmbedderBackend`]. With the `onnx` feature and model files present,
//! ONNX Runtime backs the emotion classifier and the embedder. Otherwise the
//! heuristic tagger, the lexicon scorer and the hashing embedder are used.

pub mod cache;
pub mod embedder;
pub mod emotion;
pub mod onnx;
pub mod similarity;
pub mod stemmer;
pub mod tagger;

pub use cache::{CachedEmbedder, EmbeddingCache};
pub use embedder::{EmbedderBackend, EmbeddingResult, HashingEmbedder, NoopEmbedder};
pub use emotion::{EmotionScore, EmotionScorer, LexiconEmotionScorer};
pub use similarity::cosine_similarity;
pub use tagger::{EntityTagger, HeuristicTagger};

#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmbedder, OnnxEmotionClassifier};

use std::sync::Arc;

use tomo_core::TomoConfig;

/// Embedding cache capacity shared by one model set.
const EMBEDDING_CACHE_SIZE: usize = 4096;

/// The models one analysis run uses. Cheap to clone; shared across workers.
#[derive(Clone)]
pub struct ModelSet {
    pub tagger: Arc<dyn EntityTagger>,
    pub emotion: Arc<dyn EmotionScorer>,
    pub embedder: Arc<dyn EmbedderBackend>,
}

impl ModelSet {
    /// Heuristic models only; no model files needed.
    pub fn heuristic() -> Self {
        Self {
            tagger: Arc::new(HeuristicTagger::new()),
            emotion: Arc::new(LexiconEmotionScorer::new()),
            embedder: Arc::new(CachedEmbedder::new(
                HashingEmbedder::default(),
                EMBEDDING_CACHE_SIZE,
            )),
        }
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("embedding_dim", &self.embedder.dimension())
            .field("embedder_available", &self.embedder.is_available())
            .finish()
    }
}

/// Create the best available models for `config`.
///
/// Tries ONNX first (if the feature is enabled and model files load), and
/// falls back to the heuristic set per model.
pub fn create_models(config: &TomoConfig) -> ModelSet {
    #[allow(unused_mut)]
    let mut models = ModelSet::heuristic();

    #[cfg(feature = "onnx")]
    {
        let embedder_dir = config.model_dir.join("embedder");
        match OnnxEmbedder::load(&embedder_dir) {
            Ok(embedder) => {
                tracing::info!("Using ONNX embedder (dim={})", embedder.dimension());
                models.embedder = Arc::new(CachedEmbedder::new(embedder, EMBEDDING_CACHE_SIZE));
            }
            Err(e) => {
                tracing::warn!("ONNX embedder unavailable: {}. Falling back to hashing embedder.", e);
            }
        }

        let emotion_dir = config.model_dir.join("emotion");
        match OnnxEmotionClassifier::load(&emotion_dir, config.max_model_input) {
            Ok(classifier) => {
                tracing::info!("Using ONNX emotion classifier ({} labels)", classifier.labels().len());
                models.emotion = Arc::new(classifier);
            }
            Err(e) => {
                tracing::warn!("ONNX emotion classifier unavailable: {}. Falling back to lexicon.", e);
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        tracing::info!(
            "ONNX feature disabled ({} unused). Using heuristic models.",
            config.model_dir.display()
        );
    }

    models
}
