//! Core data models shared by the indexing and retrieval pipeline.
//!
//! These types represent the chunks, stored records, query results, and
//! collection summaries that flow between the pipeline, the collection
//! manager, and the index backends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback label for chunks stored without a `source_file`.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Provenance attached to every chunk at ingestion time.
///
/// Stored as JSON next to the vector. Fields default on read so records
/// written by older or foreign writers still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    /// Original upload filename.
    pub source_file: String,
    /// Owning collection name.
    pub collection: String,
    /// Ingestion timestamp (RFC 3339).
    pub uploaded_at: String,
    /// Position of the chunk within its upload.
    pub chunk_index: usize,
}

impl ChunkMetadata {
    /// Source filename, or [`UNKNOWN_SOURCE`] when provenance is missing.
    pub fn source_label(&self) -> &str {
        if self.source_file.is_empty() {
            UNKNOWN_SOURCE
        } else {
            &self.source_file
        }
    }
}

/// A chunk of document text with its provenance, ready to be embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk with a fresh UUID.
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }
}

/// A chunk paired with its embedding, as written to an index.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A single ranked hit returned by a query.
///
/// Ephemeral: built per request and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Chunk text.
    pub content: String,
    /// Chunk provenance.
    pub metadata: ChunkMetadata,
    /// Raw distance reported by the index (lower is closer).
    pub distance: f32,
    /// Bounded similarity score in `[0, 1]` (higher is better).
    pub score: f32,
}

/// Response body for a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub documents: Vec<QueryResult>,
    pub count: usize,
}

/// One entry in the collection listing.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: usize,
    pub created_at: String,
    pub last_updated: String,
}

/// Detailed statistics for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub total_chunks: usize,
    /// Chunk count per source filename.
    pub source_files: BTreeMap<String, usize>,
    pub file_count: usize,
    pub created_at: String,
    pub last_updated: String,
}

impl CollectionStats {
    /// Tally chunk metadata into a per-file histogram.
    pub fn from_metadata<'a>(
        collection: &str,
        metadata: impl IntoIterator<Item = &'a ChunkMetadata>,
        created_at: String,
        last_updated: String,
    ) -> Self {
        let mut source_files: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0usize;
        for meta in metadata {
            *source_files.entry(meta.source_label().to_string()).or_insert(0) += 1;
            total += 1;
        }
        Self {
            collection: collection.to_string(),
            total_chunks: total,
            file_count: source_files.len(),
            source_files,
            created_at,
            last_updated,
        }
    }
}

/// Response body for a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub status: String,
    pub collection: String,
    pub chunks_added: usize,
    pub filename: String,
    pub message: String,
}
