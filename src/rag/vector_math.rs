/// Cosine similarity; `0.0` for empty, zero-norm, non-finite or mismatched
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    let similarity = dot / denom;
    if denom <= f32::EPSILON || !similarity.is_finite() {
        0.0
    } else {
        similarity.clamp(-1.0, 1.0)
    }
}

/// `1 - similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

/// Candidate key used for tie-breaking: `(chunk_index, id)`.
pub trait Rankable {
    fn embedding(&self) -> &[f32];
    fn chunk_index(&self) -> usize;
    fn id(&self) -> &str;
}

/// Scores candidates against `query`, drops those below `threshold`, and
/// orders by similarity descending, then `chunk_index` ascending, then id.
pub fn rank_candidates<T: Rankable>(
    query: &[f32],
    candidates: Vec<T>,
    threshold: Option<f32>,
    top_k: usize,
) -> Vec<(T, f32)> {
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .map(|candidate| {
            let score = cosine_similarity(query, candidate.embedding());
            (candidate, score)
        })
        .filter(|(_, score)| threshold.map_or(true, |min| *score >= min))
        .collect();

    scored.sort_by(|(left, left_score), (right, right_score)| {
        right_score
            .total_cmp(left_score)
            .then_with(|| left.chunk_index().cmp(&right.chunk_index()))
            .then_with(|| left.id().cmp(right.id()))
    });
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Candidate {
        id: &'static str,
        index: usize,
        embedding: Vec<f32>,
    }

    impl Rankable for Candidate {
        fn embedding(&self) -> &[f32] {
            &self.embedding
        }
        fn chunk_index(&self) -> usize {
            self.index
        }
        fn id(&self) -> &str {
            self.id
        }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn equal_scores_are_ordered_by_chunk_index() {
        let candidates = vec![
            Candidate { id: "c", index: 7, embedding: vec![1.0, 0.0] },
            Candidate { id: "a", index: 2, embedding: vec![1.0, 0.0] },
            Candidate { id: "b", index: 4, embedding: vec![0.0, 1.0] },
            Candidate { id: "d", index: 2, embedding: vec![2.0, 0.0] },
        ];

        let ranked = rank_candidates(&[1.0, 0.0], candidates, None, 10);
        let ids: Vec<&str> = ranked.iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids, vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn threshold_and_top_k_are_applied() {
        let candidates = vec![
            Candidate { id: "a", index: 0, embedding: vec![1.0, 0.0] },
            Candidate { id: "b", index: 1, embedding: vec![1.0, 1.0] },
            Candidate { id: "c", index: 2, embedding: vec![0.0, 1.0] },
        ];

        let ranked = rank_candidates(&[1.0, 0.0], candidates, Some(0.5), 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.id, "a");
    }

    #[test]
    fn non_finite_embeddings_rank_as_unrelated() {
        let candidates = vec![
            Candidate { id: "nan", index: 0, embedding: vec![f32::NAN, 1.0] },
            Candidate { id: "inf", index: 1, embedding: vec![f32::INFINITY, 0.0] },
            Candidate { id: "near", index: 2, embedding: vec![1.0, 0.1] },
            Candidate { id: "far", index: 3, embedding: vec![-1.0, 0.0] },
        ];

        assert_eq!(cosine_similarity(&[1.0, 0.0], &[f32::NAN, 1.0]), 0.0);
        let ranked = rank_candidates(&[1.0, 0.0], candidates, None, 10);
        let ids: Vec<&str> = ranked.iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids, vec!["near", "nan", "inf", "far"]);
        assert!(ranked.iter().all(|(_, score)| score.is_finite()));
    }
}
