//! Embedding engine trait and implementations.
//!
//! The `EmbedderBackend` trait abstracts over embedding generation.
//! Implementations:
//! - `OnnxEmbedder`: ONNX Runtime sentence encoder (requires the `onnx` feature)
//! - `HashingEmbedder`: character trigram feature hashing, no model files
//! - `NoopEmbedder`: returns None, which disables synonym reconciliation

use ndarray::Array1;

/// Result of an embedding operation.
pub struct EmbeddingResult {
    /// L2-normalized float32 embedding vector.
    pub embedding: Array1<f32>,
    /// Whether this was served from cache.
    pub cached: bool,
}

/// Trait for embedding backends.
pub trait EmbedderBackend: Send + Sync {
    /// Generate an embedding for a text string.
    /// Returns None if the embedder is not available.
    fn embed(&self, text: &str) -> Option<EmbeddingResult>;

    /// Generate embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Option<EmbeddingResult>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Check if the embedder is available (model loaded).
    fn is_available(&self) -> bool;
}

/// Placeholder embedder that always returns None.
pub struct NoopEmbedder {
    dim: usize,
}

impl NoopEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbedderBackend for NoopEmbedder {
    fn embed(&self, _text: &str) -> Option<EmbeddingResult> {
        None
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Hashes lowercased, accent-folded character trigrams into a fixed-size
/// vector. Spelling variants of a name land close together.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIM: usize = 256;

    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

impl EmbedderBackend for HashingEmbedder {
    fn embed(&self, text: &str) -> Option<EmbeddingResult> {
        let normalized: Vec<char> = std::iter::once(' ')
            .chain(
                text.chars()
                    .flat_map(char::to_lowercase)
                    .map(fold_accent)
                    .filter(|c| c.is_alphanumeric() || c.is_whitespace()),
            )
            .chain(std::iter::once(' '))
            .collect();
        if normalized.len() < 3 || normalized.iter().all(|c| c.is_whitespace()) {
            return None;
        }

        let mut vector = Array1::<f32>::zeros(self.dim);
        for gram in normalized.windows(3) {
            let slot = (fnv1a(gram) % self.dim as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            vector /= norm;
        }

        Some(EmbeddingResult {
            embedding: vector,
            cached: false,
        })
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &c in chars {
        for byte in (c as u32).to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    hash
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    fn embed(text: &str) -> Array1<f32> {
        HashingEmbedder::default().embed(text).unwrap().embedding
    }

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let a = embed("Lucia Mondella");
        let b = embed("Lucia Mondella");
        assert_eq!(a, b);
        assert!((a.dot(&a) - 1.0).abs() < 1e-5);
        assert_eq!(a.len(), HashingEmbedder::DEFAULT_DIM);
    }

    #[test]
    fn test_hashing_embedder_groups_variants() {
        let same = cosine_similarity(&embed("Fra Cristoforo"), &embed("fra Cristòforo"));
        let different = cosine_similarity(&embed("Fra Cristoforo"), &embed("Milano"));
        assert!(same > 0.99);
        assert!(different < 0.5);
    }

    #[test]
    fn test_hashing_embedder_empty_input() {
        assert!(HashingEmbedder::default().embed("  ").is_none());
        assert!(HashingEmbedder::default().embed("...").is_none());
    }

    #[test]
    fn test_noop_embedder() {
        let e = NoopEmbedder::new(8);
        assert!(e.embed("x").is_none());
        assert!(!e.is_available());
        assert_eq!(e.dimension(), 8);
    }
}
