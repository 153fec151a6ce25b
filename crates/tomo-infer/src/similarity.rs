//! Vector similarity.

use ndarray::Array1;

/// Cosine similarity of two vectors; 0.0 when either is zero or the
/// dimensions differ.
pub fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    a.dot(b) / (norm_a * norm_b)
}
