//! Collection lifecycle: existence, listing, create-or-append, delete, stats.
//!
//! A collection is a directory `<base_dir>/<name>` holding one index. The
//! manager is the only component that touches those directories; the
//! indexing pipeline and query engine go through it. Index handles are
//! opened per operation and closed before returning.
//!
//! # Delete
//!
//! The directory is first renamed to a hidden tombstone
//! (`.<name>.deleting-<uuid>`) in the same base directory, so the
//! collection disappears in one step, then the tombstone is removed. A
//! failed removal is logged; the collection is already gone.
//!
//! # Embedding
//!
//! Chunk texts go to the provider in batches of `batch_size`, one request
//! at a time. The first failed batch aborts the upload before any storage
//! is touched.
//!
//! # Concurrency
//!
//! There is no per-name lock. Two concurrent `create_or_append` calls for a
//! missing collection may both try to create it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use knowledge_base_core::collection::{is_valid_name, CollectionName};
use knowledge_base_core::embedding::EmbeddingProvider;
use knowledge_base_core::models::{Chunk, CollectionInfo, CollectionStats, IndexRecord};
use knowledge_base_core::store::{IndexBackend, VectorIndex};
use knowledge_base_core::{KbError, KbResult};

/// Texts per provider call unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 64;

pub struct CollectionManager<B: IndexBackend> {
    base_dir: PathBuf,
    backend: B,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl<B: IndexBackend> CollectionManager<B> {
    pub fn new(base_dir: impl Into<PathBuf>, backend: B, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            base_dir: base_dir.into(),
            backend,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Maximum number of texts sent to the provider per call. Zero is
    /// treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Storage directory for `name`. Does not check existence.
    pub fn path_for(&self, name: &CollectionName) -> PathBuf {
        self.base_dir.join(name.as_str())
    }

    /// True iff the collection's directory exists.
    pub async fn exists(&self, name: &CollectionName) -> bool {
        is_dir(&self.path_for(name)).await
    }

    /// Every readable collection, sorted by name.
    ///
    /// Hidden entries and invalid names are ignored. Collections whose index
    /// cannot be opened or counted are skipped with a warning.
    pub async fn list(&self) -> KbResult<Vec<CollectionInfo>> {
        if !is_dir(&self.base_dir).await {
            return Ok(Vec::new());
        }

        let read_failed = |e: std::io::Error| {
            KbError::storage(anyhow::Error::new(e).context(format!(
                "Failed to read base directory {}",
                self.base_dir.display()
            )))
        };
        let mut entries = tokio::fs::read_dir(&self.base_dir).await.map_err(read_failed)?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_valid_name(&name) && is_dir(&entry.path()).await {
                names.push(name);
            }
        }
        names.sort();

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let path = self.base_dir.join(&name);
            match self.count_at(&path).await {
                Ok(document_count) => {
                    let (created_at, last_updated) = dir_timestamps(&path).await;
                    collections.push(CollectionInfo {
                        name,
                        document_count,
                        created_at,
                        last_updated,
                    });
                }
                Err(e) => {
                    tracing::warn!(collection = %name, error = %format!("{:#}", e), "Skipping unreadable collection");
                }
            }
        }

        Ok(collections)
    }

    async fn count_at(&self, path: &Path) -> anyhow::Result<usize> {
        let index = self.backend.open(path).await?;
        let count = index.count().await;
        index.close().await;
        count
    }

    /// Embed `chunks` and store them, creating the collection if needed.
    ///
    /// Returns the number of chunks written. Embedding runs before any
    /// storage access, so an embedding failure leaves nothing behind. A
    /// failed creation removes the directory it made.
    pub async fn create_or_append(&self, name: &CollectionName, chunks: Vec<Chunk>) -> KbResult<usize> {
        if chunks.is_empty() {
            return Err(KbError::EmptyInput);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batches = texts.len().div_ceil(self.batch_size);
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = self.embedder.embed(batch).await.map_err(KbError::embedding)?;
            if embedded.len() != batch.len() {
                return Err(KbError::Embedding(format!(
                    "provider returned {} vectors for a batch of {} chunks",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
            tracing::debug!(collection = %name, batch = i + 1, batches, "Embedded batch");
        }

        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord { chunk, vector })
            .collect();

        let path = self.path_for(name);
        if self.exists(name).await {
            let index = self.backend.open(&path).await.map_err(KbError::storage)?;
            let written = index.add_vectors(&records).await;
            index.close().await;
            let written = written.map_err(KbError::storage)?;
            tracing::info!(collection = %name, chunks = written, "Appended to collection");
            Ok(written)
        } else {
            match self.backend.create(&path, &records).await {
                Ok(index) => {
                    index.close().await;
                    tracing::info!(collection = %name, chunks = records.len(), "Created collection");
                    Ok(records.len())
                }
                Err(e) => {
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        if let Err(cleanup) = tokio::fs::remove_dir_all(&path).await {
                            tracing::warn!(
                                collection = %name,
                                error = %cleanup,
                                "Failed to remove partially created collection"
                            );
                        }
                    }
                    Err(KbError::storage(e))
                }
            }
        }
    }

    /// Remove a collection and everything stored in it.
    pub async fn delete(&self, name: &CollectionName) -> KbResult<()> {
        if !self.exists(name).await {
            return Err(KbError::NotFound(name.to_string()));
        }

        let path = self.path_for(name);
        let tombstone = self
            .base_dir
            .join(format!(".{}.deleting-{}", name, Uuid::new_v4()));
        tokio::fs::rename(&path, &tombstone).await.map_err(|e| {
            KbError::storage(anyhow::Error::new(e).context(format!(
                "Failed to delete collection {}",
                name
            )))
        })?;

        if let Err(e) = tokio::fs::remove_dir_all(&tombstone).await {
            tracing::warn!(
                collection = %name,
                tombstone = %tombstone.display(),
                error = %e,
                "Collection deleted but tombstone removal failed"
            );
        }

        tracing::info!(collection = %name, "Deleted collection");
        Ok(())
    }

    /// Chunk totals and per-file histogram for one collection.
    ///
    /// A collection that exists but holds no chunks is reported as not found.
    pub async fn stats(&self, name: &CollectionName) -> KbResult<CollectionStats> {
        let index = self.open(name).await?;
        let metadata = index.all_metadata().await;
        index.close().await;
        let metadata = metadata.map_err(KbError::storage)?;

        if metadata.is_empty() {
            return Err(KbError::NotFound(name.to_string()));
        }

        let (created_at, last_updated) = dir_timestamps(&self.path_for(name)).await;
        Ok(CollectionStats::from_metadata(
            name.as_str(),
            &metadata,
            created_at,
            last_updated,
        ))
    }

    /// Open the index of an existing collection. The caller must close it.
    pub async fn open(&self, name: &CollectionName) -> KbResult<B::Index> {
        if !self.exists(name).await {
            return Err(KbError::NotFound(name.to_string()));
        }
        self.backend
            .open(&self.path_for(name))
            .await
            .map_err(KbError::storage)
    }
}

/// `(created_at, last_updated)` of a collection directory as RFC 3339 UTC.
///
/// Creation falls back to modification time where the filesystem lacks
/// birth time. Last update is the newest mtime of the directory and its
/// direct entries.
async fn dir_timestamps(path: &Path) -> (String, String) {
    let meta = tokio::fs::metadata(path).await.ok();
    let modified = meta.as_ref().and_then(|m| m.modified().ok());
    let created = meta
        .as_ref()
        .and_then(|m| m.created().ok())
        .or(modified)
        .unwrap_or_else(SystemTime::now);

    let mut newest_entry: Option<SystemTime> = None;
    if let Ok(mut entries) = tokio::fs::read_dir(path).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let entry_modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
            newest_entry = newest_entry.max(entry_modified);
        }
    }
    let last_updated = modified
        .into_iter()
        .chain(newest_entry)
        .max()
        .unwrap_or(created);

    (format_time(created), format_time(last_updated))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}
