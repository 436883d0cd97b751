//! Cosine distance utilities for HNSW search.
//!
//! Norms are computed once per stored vector and once per query, so the hot
//! path only performs a dot product. All distances are `1 - cosine_similarity`
//! and lie in \[0, 2\]; lower is more similar.

/// Euclidean norm `sqrt(sum(v_i^2))`.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|&x| x * x).sum::<f32>().sqrt()
}

/// Scales `v` to unit length. A zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|&x| x / n).collect()
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Cosine distance with precomputed norms.
///
/// Returns `1.0` (orthogonal) if either vector has zero norm, so zero vectors never
/// produce NaN. Both slices must have the same length; callers validate this.
#[inline]
pub fn cosine_distance(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot(a, b) / (norm_a * norm_b)
}

/// Cosine similarity of two equal-length vectors. `0.0` for a zero vector.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_distance(a, norm(a), b, norm(b))
}
