//! ONNX Runtime backends: a sentence embedder and an emotion classifier.
//!
//! Each model directory holds `model.onnx` and a HuggingFace `tokenizer.json`;
//! the classifier also reads `id2label` from `config.json`. Requires the
//! `onnx` feature. Sessions are not safe for concurrent runs, so each sits
//! behind a `parking_lot::Mutex`.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ndarray::Array1;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tomo_core::{Error, Result};
    use tracing::{info, warn};

    use crate::embedder::{EmbedderBackend, EmbeddingResult};
    use crate::emotion::{EmotionScore, EmotionScorer};

    /// Maximum sequence length for the encoders.
    const MAX_SEQ_LEN: usize = 512;

    fn load_session(model_dir: &Path) -> Result<(Session, Tokenizer)> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(Error::Inference(format!("Model not found: {}", model_path.display())));
        }
        if !tokenizer_path.exists() {
            return Err(Error::Inference(format!(
                "Tokenizer not found: {}",
                tokenizer_path.display()
            )));
        }

        // With load-dynamic, ORT_DYLIB_PATH must point to libonnxruntime.
        ort::init().commit();

        let session = Session::builder()
            .map_err(|e| Error::Inference(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(2)
            .map_err(|e| Error::Inference(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| Error::Inference(format!("Failed to load ONNX model: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Inference(format!("Failed to load tokenizer: {}", e)))?;

        Ok((session, tokenizer))
    }

    /// Token ids, attention mask and type ids as `[1, seq_len]` tensors.
    fn encode(
        tokenizer: &Tokenizer,
        text: &str,
        max_len: usize,
    ) -> Result<(Vec<i64>, [Tensor<i64>; 3])> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| Error::Inference(format!("Tokenization failed: {}", e)))?;

        let seq_len = encoding.get_ids().len().min(max_len);
        let ids: Vec<i64> = encoding.get_ids()[..seq_len].iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask()[..seq_len]
            .iter()
            .map(|&m| m as i64)
            .collect();
        let type_ids = vec![0i64; seq_len];

        let tensor = |data: Vec<i64>| {
            Tensor::from_array(([1usize, seq_len], data))
                .map_err(|e| Error::Inference(format!("Failed to create tensor: {}", e)))
        };
        let tensors = [tensor(ids)?, tensor(mask.clone())?, tensor(type_ids)?];
        Ok((mask, tensors))
    }

    /// Sentence embedder (SentenceTransformers export).
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimension: usize,
    }

    impl OnnxEmbedder {
        /// Default embedding dimension (MiniLM family).
        const DEFAULT_DIM: usize = 384;

        pub fn load(model_dir: &Path) -> Result<Self> {
            let (session, tokenizer) = load_session(model_dir)?;
            info!("ONNX embedder loaded from {}", model_dir.display());
            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimension: Self::DEFAULT_DIM,
            })
        }

        fn infer(&self, text: &str) -> Result<Array1<f32>> {
            let (mask, [ids, attention, types]) = encode(&self.tokenizer, text, MAX_SEQ_LEN)?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![ids, attention, types])
                .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;

            // Either [1, seq_len, dim] token embeddings (mean-pooled here)
            // or an already pooled [1, dim] sentence embedding.
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Inference(format!("Failed to extract output: {}", e)))?;
            let dims: Vec<i64> = shape.iter().copied().collect();

            let embedding = match dims.as_slice() {
                [_, _, dim] => {
                    let dim = *dim as usize;
                    let mask_sum: f32 = mask.iter().map(|&m| m as f32).sum();
                    if mask_sum < 1e-9 {
                        return Err(Error::Inference("empty attention mask".into()));
                    }
                    let mut pooled = Array1::<f32>::zeros(dim);
                    for (i, &m) in mask.iter().enumerate() {
                        if m > 0 {
                            let offset = i * dim;
                            for d in 0..dim {
                                pooled[d] += data[offset + d];
                            }
                        }
                    }
                    pooled / mask_sum
                }
                [_, dim] => Array1::from_vec(data[..*dim as usize].to_vec()),
                other => {
                    return Err(Error::Inference(format!("Unexpected output shape: {:?}", other)))
                }
            };

            let norm = embedding.dot(&embedding).sqrt();
            Ok(if norm > 0.0 { embedding / norm } else { embedding })
        }
    }

    impl EmbedderBackend for OnnxEmbedder {
        fn embed(&self, text: &str) -> Option<EmbeddingResult> {
            match self.infer(text) {
                Ok(embedding) => Some(EmbeddingResult {
                    embedding,
                    cached: false,
                }),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    /// Sequence classifier emitting one logit per emotion label.
    pub struct OnnxEmotionClassifier {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        labels: Vec<String>,
        max_len: usize,
    }

    impl OnnxEmotionClassifier {
        pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
            let labels = read_labels(&model_dir.join("config.json"))?;
            let (session, tokenizer) = load_session(model_dir)?;
            info!(
                "ONNX emotion classifier loaded from {} ({} labels)",
                model_dir.display(),
                labels.len()
            );
            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                labels,
                max_len: max_len.clamp(1, MAX_SEQ_LEN),
            })
        }

        pub fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    /// `id2label` from a HuggingFace config, ordered by id.
    fn read_labels(config_path: &Path) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(config_path)?;
        let config: serde_json::Value = serde_json::from_str(&raw)?;
        let map = config
            .get("id2label")
            .and_then(|v| v.as_object())
            .ok_or_else(|| Error::Inference("config.json has no id2label".into()))?;

        let mut labels: Vec<(usize, String)> = map
            .iter()
            .filter_map(|(id, label)| {
                Some((id.parse().ok()?, label.as_str()?.to_lowercase()))
            })
            .collect();
        labels.sort_by_key(|(id, _)| *id);
        if labels.is_empty() {
            return Err(Error::Inference("config.json id2label is empty".into()));
        }
        Ok(labels.into_iter().map(|(_, l)| l).collect())
    }

    impl EmotionScorer for OnnxEmotionClassifier {
        fn score_emotion(&self, text: &str) -> Result<EmotionScore> {
            let (_, [ids, attention, types]) = encode(&self.tokenizer, text, self.max_len)?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![ids, attention, types])
                .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;
            let (_, logits) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Inference(format!("Failed to extract logits: {}", e)))?;

            let n = self.labels.len().min(logits.len());
            if n == 0 {
                return Err(Error::Inference("classifier produced no logits".into()));
            }
            // Softmax; the first maximal logit wins.
            let max = logits[..n].iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exp: Vec<f32> = logits[..n].iter().map(|&l| (l - max).exp()).collect();
            let sum: f32 = exp.iter().sum();
            let mut best = 0;
            for i in 1..n {
                if exp[i] > exp[best] {
                    best = i;
                }
            }

            Ok(EmotionScore {
                label: self.labels[best].clone(),
                score: (exp[best] / sum) as f64,
            })
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::{OnnxEmbedder, OnnxEmotionClassifier};
