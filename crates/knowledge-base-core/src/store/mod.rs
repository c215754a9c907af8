//! Vector index abstraction.
//!
//! A collection's vectors live in an opaque, persistent index rooted at the
//! collection's storage directory. Two traits split the responsibilities:
//!
//! - [`IndexBackend`] knows how to create or open an index at a path.
//! - [`VectorIndex`] is an open handle supporting insert, count, k-NN
//!   search, and metadata enumeration.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Backend-internal handles never escape these traits.

pub mod memory;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ChunkMetadata, IndexRecord};

/// A stored chunk paired with its raw distance to the query vector.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Squared Euclidean distance; lower is closer.
    pub distance: f32,
}

/// A query vector whose width differs from the vectors already stored.
///
/// Raised by [`VectorIndex::similarity_search`] when the embedding model
/// changed since the collection was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("query has {actual} dimensions but the index holds {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// An open vector index for one collection.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_vectors`](VectorIndex::add_vectors) | Append records |
/// | [`count`](VectorIndex::count) | Number of stored records |
/// | [`similarity_search`](VectorIndex::similarity_search) | k nearest records |
/// | [`all_metadata`](VectorIndex::all_metadata) | Provenance of every record |
/// | [`close`](VectorIndex::close) | Release the handle |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append records, returning how many were written.
    ///
    /// All-or-nothing: either every record is stored or none is.
    async fn add_vectors(&self, records: &[IndexRecord]) -> Result<usize>;

    /// Total number of stored records.
    async fn count(&self) -> Result<usize>;

    /// The `k` records closest to `query`, ascending by distance.
    ///
    /// Ties keep insertion order. Fails with [`DimensionMismatch`] when the
    /// index is non-empty and `query` has a different width.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Metadata of every stored record, in insertion order.
    async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>>;

    /// Release any resources held by the handle.
    async fn close(&self) {}
}

/// Factory for [`VectorIndex`] handles rooted at a directory.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    type Index: VectorIndex;

    /// Create a new index at `path` seeded with `records` in one batch.
    ///
    /// Creates `path` if needed.
    async fn create(&self, path: &Path, records: &[IndexRecord]) -> Result<Self::Index>;

    /// Open the index rooted at `path`, which must be an existing directory.
    async fn open(&self, path: &Path) -> Result<Self::Index>;
}

/// Rank `(chunk, distance)` pairs ascending by distance and keep `k`.
///
/// The sort is stable, so equal distances keep their input order. Shared
/// by the brute-force backends.
pub fn top_k_by_distance(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    scored.truncate(k);
    scored
}
