//! Vector similarity for the approximate-matching read path

use crate::constants::SIMILARITY_EPSILON;

/// Compute cosine similarity between two vectors.
///
/// Degrades rather than errors on awkward inputs: mismatched lengths and
/// zero-norm vectors both yield 0.0. The store does not enforce a single
/// embedding dimensionality, so pairwise comparison has to absorb mixed
/// dimensions.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b + SIMILARITY_EPSILON)
}
