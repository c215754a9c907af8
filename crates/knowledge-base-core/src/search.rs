//! Similarity retrieval and distance-to-score conversion.
//!
//! The retrieval step operates entirely through the [`VectorIndex`] trait.
//! The caller embeds the query text and passes the vector in; this module
//! runs the k-NN search and converts each raw distance to a bounded score:
//!
//! ```text
//! score = clamp(1 - distance / saturation, 0, 1)
//! ```
//!
//! The default saturation of `3.0` is calibrated for squared Euclidean
//! distance between unit-normalised sentence embeddings (range `[0, 4]`).
//! It is not portable: a backend with a different metric must supply its
//! own value. Scores are a relevance scale, not a probability.

use anyhow::Result;

use crate::models::QueryResult;
use crate::store::VectorIndex;

/// Distance at which the similarity score reaches zero.
pub const DEFAULT_SCORE_SATURATION: f32 = 3.0;

/// Convert a raw distance to a score in `[0, 1]`, higher is better.
///
/// Monotonically non-increasing in `distance`. Non-finite distances score 0.
///
/// ```rust
/// use knowledge_base_core::search::distance_to_score;
///
/// assert_eq!(distance_to_score(0.0, 3.0), 1.0);
/// assert_eq!(distance_to_score(1.5, 3.0), 0.5);
/// assert_eq!(distance_to_score(3.5, 3.0), 0.0);
/// ```
pub fn distance_to_score(distance: f32, saturation: f32) -> f32 {
    if !distance.is_finite() || saturation <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / saturation).clamp(0.0, 1.0)
}

/// Run a k-NN search and attach scores, preserving the index's ranking.
pub async fn similarity_query<I: VectorIndex + ?Sized>(
    index: &I,
    query_vec: &[f32],
    top_k: usize,
    saturation: f32,
) -> Result<Vec<QueryResult>> {
    let hits = index.similarity_search(query_vec, top_k).await?;
    Ok(hits
        .into_iter()
        .map(|hit| QueryResult {
            score: distance_to_score(hit.distance, saturation),
            distance: hit.distance,
            content: hit.chunk.text,
            metadata: hit.chunk.metadata,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata, IndexRecord};
    use crate::store::memory::InMemoryIndex;

    #[test]
    fn test_score_bounds() {
        for d in [0.0f32, 0.1, 1.0, 2.9, 3.0, 4.0, 100.0, f32::INFINITY, f32::NAN] {
            let s = distance_to_score(d, DEFAULT_SCORE_SATURATION);
            assert!((0.0..=1.0).contains(&s), "score {} out of range for {}", s, d);
        }
    }

    #[test]
    fn test_score_monotonic() {
        let distances: Vec<f32> = (0..400).map(|i| i as f32 * 0.01).collect();
        for pair in distances.windows(2) {
            let s1 = distance_to_score(pair[0], DEFAULT_SCORE_SATURATION);
            let s2 = distance_to_score(pair[1], DEFAULT_SCORE_SATURATION);
            assert!(s1 >= s2, "score increased from {} to {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_negative_distance_clamped() {
        assert_eq!(distance_to_score(-0.5, 3.0), 1.0);
    }

    #[tokio::test]
    async fn test_query_keeps_distance_and_score() {
        let index = InMemoryIndex::new();
        let records: Vec<IndexRecord> = [("close", 0.5f32), ("far", 2.0), ("farthest", 4.0)]
            .iter()
            .map(|(text, x)| IndexRecord {
                chunk: Chunk::new(*text, ChunkMetadata::default()),
                vector: vec![*x],
            })
            .collect();
        index.add_vectors(&records).await.unwrap();

        let results = similarity_query(&index, &[0.0], 5, 3.0).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "close");
        assert_eq!(results[0].distance, 0.25);
        assert!((results[0].score - (1.0 - 0.25 / 3.0)).abs() < 1e-6);
        assert_eq!(results[2].distance, 16.0);
        assert_eq!(results[2].score, 0.0);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let index = InMemoryIndex::new();
        let results = similarity_query(&index, &[0.0, 1.0], 5, 3.0).await.unwrap();
        assert!(results.is_empty());
    }
}
