//! SQLite-backed vector index.
//!
//! Each collection directory holds one `index.sqlite` file with a single
//! `chunks` table: text, JSON metadata, and the embedding as a little-endian
//! `f32` blob. Search is brute force: every vector is loaded, scored by
//! squared Euclidean distance in Rust, and ranked with a stable sort so
//! ties keep insertion order.
//!
//! Opening a directory without an index file writes nothing: the handle
//! reads as empty and the file is created by the first `add_vectors`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use knowledge_base_core::embedding::{blob_to_vec, squared_l2_distance, vec_to_blob};
use knowledge_base_core::models::{Chunk, ChunkMetadata, IndexRecord};
use knowledge_base_core::store::{
    top_k_by_distance, DimensionMismatch, IndexBackend, ScoredChunk, VectorIndex,
};

use crate::{db, migrate};

/// Creates and opens [`SqliteIndex`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

impl SqliteBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IndexBackend for SqliteBackend {
    type Index = SqliteIndex;

    async fn create(&self, path: &Path, records: &[IndexRecord]) -> Result<SqliteIndex> {
        let index = SqliteIndex::unopened(path);

        let seeded = async {
            index.writable_pool().await?;
            index.add_vectors(records).await
        }
        .await;

        if let Err(e) = seeded {
            index.close().await;
            return Err(e.context(format!("Failed to create index at {}", path.display())));
        }
        Ok(index)
    }

    /// Open the index at `path`. A bare directory gets an empty index.
    async fn open(&self, path: &Path) -> Result<SqliteIndex> {
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            bail!("Index directory missing: {}", path.display());
        }

        if !tokio::fs::try_exists(db::index_path(path)).await? {
            return Ok(SqliteIndex::unopened(path));
        }

        let pool = db::connect(path, false).await?;
        if let Err(e) = migrate::verify_schema(&pool).await {
            pool.close().await;
            return Err(e.context(format!("Unreadable index at {}", path.display())));
        }
        Ok(SqliteIndex {
            dir: path.to_path_buf(),
            pool: OnceCell::from(pool),
        })
    }
}

/// An open per-collection index.
///
/// The pool is absent until the index file exists; reads on such a handle
/// see no rows.
pub struct SqliteIndex {
    dir: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl SqliteIndex {
    fn unopened(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            pool: OnceCell::new(),
        }
    }

    /// The pool, creating the index file and schema on first use.
    async fn writable_pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = db::connect(&self.dir, true).await?;
                if let Err(e) = migrate::run_migrations(&pool).await {
                    pool.close().await;
                    return Err(e);
                }
                Ok::<_, anyhow::Error>(pool)
            })
            .await
    }

    /// Vector width already stored, if any rows exist.
    async fn stored_dims(&self) -> Result<Option<usize>> {
        let Some(pool) = self.pool.get() else {
            return Ok(None);
        };
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunks LIMIT 1")
            .fetch_optional(pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn add_vectors(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let expected = match self.stored_dims().await? {
            Some(dims) => dims,
            None => records[0].vector.len(),
        };
        if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
            bail!(
                "Embedding dimension mismatch: index holds {} dims, got {}",
                expected,
                bad.vector.len()
            );
        }

        let pool = self.writable_pool().await?;
        let mut tx = pool.begin().await?;
        for record in records {
            let metadata_json = serde_json::to_string(&record.chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, chunk_index, text, metadata_json, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.chunk.id)
            .bind(record.chunk.metadata.chunk_index as i64)
            .bind(&record.chunk.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert chunk {}", record.chunk.id))?;
        }
        tx.commit().await?;

        Ok(records.len())
    }

    async fn count(&self) -> Result<usize> {
        let Some(pool) = self.pool.get() else {
            return Ok(0);
        };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await?;
        Ok(count as usize)
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(pool) = self.pool.get() else {
            return Ok(Vec::new());
        };
        if let Some(dims) = self.stored_dims().await? {
            if dims != query.len() {
                return Err(DimensionMismatch {
                    expected: dims,
                    actual: query.len(),
                }
                .into());
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, text, metadata_json, embedding FROM chunks ORDER BY rowid")
            .fetch_all(pool)
            .await?;

        let scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let metadata_json: String = row.get("metadata_json");
                ScoredChunk {
                    chunk: Chunk {
                        id: row.get("id"),
                        text: row.get("text"),
                        metadata: parse_metadata(&metadata_json),
                    },
                    distance: squared_l2_distance(query, &vector),
                }
            })
            .collect();

        Ok(top_k_by_distance(scored, k))
    }

    async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let Some(pool) = self.pool.get() else {
            return Ok(Vec::new());
        };
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT metadata_json FROM chunks ORDER BY rowid")
                .fetch_all(pool)
                .await?;
        Ok(rows.iter().map(|json| parse_metadata(json)).collect())
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

/// Malformed metadata degrades to defaults rather than failing the read.
fn parse_metadata(json: &str) -> ChunkMetadata {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Unparseable chunk metadata; using defaults");
        ChunkMetadata::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

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
    async fn test_create_then_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        let backend = SqliteBackend::new();

        let index = backend
            .create(&dir, &[record("alpha", "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        index.close().await;

        assert!(db::index_path(&dir).is_file());
        let reopened = backend.open(&dir).await.unwrap();
        reopened
            .add_vectors(&[record("beta", "b.txt", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);

        let metas = reopened.all_metadata().await.unwrap();
        assert_eq!(metas[0].source_file, "a.txt");
        assert_eq!(metas[1].source_file, "b.txt");
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_search_orders_by_distance_then_insertion() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        let index = SqliteBackend
            .create(
                &dir,
                &[
                    record("far", "a.txt", vec![0.0, 3.0]),
                    record("tie-first", "a.txt", vec![1.0, 0.0]),
                    record("tie-second", "a.txt", vec![1.0, 0.0]),
                    record("exact", "a.txt", vec![0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.similarity_search(&[0.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "tie-first", "tie-second"]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].distance, 1.0);
        index.close().await;
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_atomically() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        let index = SqliteBackend
            .create(&dir, &[record("alpha", "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = index
            .add_vectors(&[
                record("ok", "b.txt", vec![0.0, 1.0]),
                record("bad", "b.txt", vec![0.0, 1.0, 2.0]),
            ])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
        assert_eq!(index.count().await.unwrap(), 1);
        index.close().await;
    }

    #[tokio::test]
    async fn test_open_rejects_missing_and_corrupt_indexes() {
        let tmp = TempDir::new().unwrap();

        let missing = tmp.path().join("nope");
        assert!(SqliteBackend.open(&missing).await.is_err());
        assert!(!missing.exists());

        let corrupt_dir = tmp.path().join("corrupt");
        std::fs::create_dir(&corrupt_dir).unwrap();
        std::fs::write(db::index_path(&corrupt_dir), vec![0xAB_u8; 4096]).unwrap();
        assert!(SqliteBackend.open(&corrupt_dir).await.is_err());
    }

    #[tokio::test]
    async fn test_open_bare_directory_yields_empty_index() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("fresh");
        std::fs::create_dir(&dir).unwrap();

        let index = SqliteBackend.open(&dir).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.similarity_search(&[1.0], 5).await.unwrap().is_empty());
        assert!(index.all_metadata().await.unwrap().is_empty());
        index.close().await;
        assert!(!db::index_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_bare_directory_index_created_on_first_write() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("fresh");
        std::fs::create_dir(&dir).unwrap();

        let index = SqliteBackend.open(&dir).await.unwrap();
        index
            .add_vectors(&[record("alpha", "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        index.close().await;

        assert!(db::index_path(&dir).is_file());
        let reopened = SqliteBackend.open(&dir).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_search_rejects_query_of_other_width() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        let index = SqliteBackend
            .create(&dir, &[record("alpha", "a.txt", vec![1.0, 0.0])])
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
        assert_eq!(index.similarity_search(&[1.0, 0.0], 5).await.unwrap().len(), 1);
        index.close().await;
    }

    #[tokio::test]
    async fn test_malformed_metadata_falls_back_to_unknown() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        let index = SqliteBackend
            .create(&dir, &[record("alpha", "a.txt", vec![1.0])])
            .await
            .unwrap();
        sqlx::query("UPDATE chunks SET metadata_json = 'not json'")
            .execute(index.pool.get().unwrap())
            .await
            .unwrap();

        let metas = index.all_metadata().await.unwrap();
        assert_eq!(metas[0].source_label(), "unknown");
        index.close().await;
    }
}
