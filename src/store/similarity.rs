//! Vectorized cosine similarity over the in-memory embedding matrix.

use ndarray::{ArrayView1, ArrayView2};

/// Euclidean norm of `vector`.
pub(crate) fn norm(vector: &[f32]) -> f32 {
    ArrayView1::from(vector).dot(&ArrayView1::from(vector)).sqrt()
}

/// Cosine similarity of `query` against every row of `matrix`.
///
/// `norms[i]` is the norm of row `i`. Rows with a zero norm, or a zero query,
/// score 0.
pub(crate) fn cosine_scores(matrix: ArrayView2<'_, f32>, norms: &[f32], query: &[f32]) -> Vec<f32> {
    let query_norm = norm(query);
    if query_norm == 0.0 {
        return vec![0.0; matrix.nrows()];
    }
    let dots = matrix.dot(&ArrayView1::from(query));
    dots.iter()
        .zip(norms)
        .map(|(dot, row_norm)| {
            if *row_norm == 0.0 {
                0.0
            } else {
                dot / (row_norm * query_norm)
            }
        })
        .collect()
}

/// Indices of the `k` highest scores, best first. Ties keep row order.
pub(crate) fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    indices.truncate(k);
    indices
}
