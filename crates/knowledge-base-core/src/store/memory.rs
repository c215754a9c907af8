//! In-memory [`VectorIndex`] implementation for testing and WASM targets.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force squared Euclidean distance over all stored vectors.
//! [`InMemoryBackend`] keys indexes by path without touching the
//! filesystem; opening an unknown path yields an empty index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::squared_l2_distance;
use crate::models::{ChunkMetadata, IndexRecord};

use super::{top_k_by_distance, DimensionMismatch, IndexBackend, ScoredChunk, VectorIndex};

type Records = Arc<RwLock<Vec<IndexRecord>>>;

/// In-memory index handle. Clones share the same records.
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    records: Records,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add_vectors(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut stored = self.records.write().map_err(poisoned)?;
        stored.extend_from_slice(records);
        Ok(records.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self.records.read().map_err(poisoned)?;
        if let Some(first) = stored.first() {
            if first.vector.len() != query.len() {
                return Err(DimensionMismatch {
                    expected: first.vector.len(),
                    actual: query.len(),
                }
                .into());
            }
        }
        let scored = stored
            .iter()
            .map(|r| ScoredChunk {
                chunk: r.chunk.clone(),
                distance: squared_l2_distance(query, &r.vector),
            })
            .collect();
        Ok(top_k_by_distance(scored, k))
    }

    async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let stored = self.records.read().map_err(poisoned)?;
        Ok(stored.iter().map(|r| r.chunk.metadata.clone()).collect())
    }
}

/// Path-keyed registry of in-memory indexes.
#[derive(Default)]
pub struct InMemoryBackend {
    indexes: RwLock<HashMap<PathBuf, InMemoryIndex>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexBackend for InMemoryBackend {
    type Index = InMemoryIndex;

    async fn create(&self, path: &Path, records: &[IndexRecord]) -> Result<InMemoryIndex> {
        let index = InMemoryIndex::new();
        index.add_vectors(records).await?;
        self.indexes
            .write()
            .map_err(poisoned)?
            .insert(path.to_path_buf(), index.clone());
        Ok(index)
    }

    async fn open(&self, path: &Path) -> Result<InMemoryIndex> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        Ok(indexes.entry(path.to_path_buf()).or_default().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn record(text: &str, source: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            chunk: Chunk::new(
                text,
                ChunkMetadata {
                    source_file: source.to_string(),
                    collection: "docs".to_string(),
                    uploaded_at: "2026-01-01T00:00:00Z".to_string(),
                    chunk_index: 0,
                },
            ),
            vector,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let index = InMemoryIndex::new();
        index
            .add_vectors(&[
                record("far", "a.txt", vec![10.0, 0.0]),
                record("near", "a.txt", vec![1.0, 0.0]),
                record("mid", "b.txt", vec![3.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.similarity_search(&[0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "near");
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[1].chunk.text, "mid");
        assert_eq!(hits[1].distance, 9.0);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let index = InMemoryIndex::new();
        index
            .add_vectors(&[
                record("first", "a.txt", vec![1.0]),
                record("second", "a.txt", vec![-1.0]),
            ])
            .await
            .unwrap();
        let hits = index.similarity_search(&[0.0], 5).await.unwrap();
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[tokio::test]
    async fn test_search_rejects_query_of_other_width() {
        let index = InMemoryIndex::new();
        index
            .add_vectors(&[record("one", "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = index.similarity_search(&[1.0, 0.0, 0.0], 5).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<DimensionMismatch>(),
            Some(&DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[tokio::test]
    async fn test_backend_reopens_same_records() {
        let backend = InMemoryBackend::new();
        let path = Path::new("/kb/docs");
        backend
            .create(path, &[record("one", "a.txt", vec![0.0])])
            .await
            .unwrap();

        let reopened = backend.open(path).await.unwrap();
        reopened
            .add_vectors(&[record("two", "b.txt", vec![1.0])])
            .await
            .unwrap();

        let again = backend.open(path).await.unwrap();
        assert_eq!(again.count().await.unwrap(), 2);
        let sources: Vec<String> = again
            .all_metadata()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.source_file)
            .collect();
        assert_eq!(sources, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_open_unknown_path_is_empty() {
        let backend = InMemoryBackend::new();
        let index = backend.open(Path::new("/kb/missing")).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.similarity_search(&[0.0], 3).await.unwrap().is_empty());
    }
}
