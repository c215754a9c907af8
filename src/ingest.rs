//! Indexing pipeline: upload → parse → chunk → provenance → store.
//!
//! Validation (extension, collection name), parsing, and chunking all run
//! before the collection manager is called, so a rejected upload never
//! touches collection storage. The upload is staged in a scratch file
//! carrying its original suffix; the file is removed on every exit path
//! when the `NamedTempFile` drops.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use knowledge_base_core::chunk::Chunker;
use knowledge_base_core::collection::CollectionName;
use knowledge_base_core::models::{Chunk, ChunkMetadata, IngestOutcome};
use knowledge_base_core::store::IndexBackend;
use knowledge_base_core::{KbError, KbResult};

use crate::collections::CollectionManager;
use crate::extract::{self, DocumentFormat, ExtractError, SUPPORTED_EXTENSIONS};

pub struct IndexingPipeline<B: IndexBackend> {
    manager: Arc<CollectionManager<B>>,
    chunker: Chunker,
    scratch_dir: Option<PathBuf>,
}

impl<B: IndexBackend> IndexingPipeline<B> {
    pub fn new(manager: Arc<CollectionManager<B>>, chunker: Chunker, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            manager,
            chunker,
            scratch_dir,
        }
    }

    /// Index one uploaded document into `collection`.
    ///
    /// Creates the collection on first use, appends otherwise.
    pub async fn ingest(&self, bytes: Vec<u8>, filename: &str, collection: &str) -> KbResult<IngestOutcome> {
        let extension = extract::file_extension(filename);
        if DocumentFormat::from_extension(&extension).is_none() {
            return Err(KbError::UnsupportedFormat {
                extension,
                supported: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            });
        }
        let name = CollectionName::parse(collection)?;

        let text = self.parse_upload(bytes, filename, &extension).await?;

        let pieces = self.chunker.split(&text).map_err(|e| match e {
            KbError::EmptyInput => KbError::NoContent {
                filename: filename.to_string(),
            },
            other => other,
        })?;

        let uploaded_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| {
                Chunk::new(
                    piece.text,
                    ChunkMetadata {
                        source_file: filename.to_string(),
                        collection: name.to_string(),
                        uploaded_at: uploaded_at.clone(),
                        chunk_index: piece.index,
                    },
                )
            })
            .collect();

        tracing::debug!(collection = %name, filename, chunks = chunks.len(), "Chunked upload");
        let chunks_added = self.manager.create_or_append(&name, chunks).await?;

        Ok(IngestOutcome {
            status: "success".to_string(),
            collection: name.to_string(),
            chunks_added,
            filename: filename.to_string(),
            message: format!("Successfully indexed {} chunks from {}", chunks_added, filename),
        })
    }

    /// Stage the upload in a scratch file and extract its text off the executor.
    async fn parse_upload(&self, bytes: Vec<u8>, filename: &str, extension: &str) -> KbResult<String> {
        let scratch_dir = self.scratch_dir.clone();
        let suffix = extension.to_string();

        let parsed = tokio::task::spawn_blocking(move || -> Result<String, ExtractError> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("kb-upload-").suffix(&suffix);
            let mut scratch = match scratch_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            scratch.write_all(&bytes)?;
            scratch.flush()?;
            extract::extract_file(scratch.path())
        })
        .await
        .map_err(|e| KbError::Storage(format!("parser task failed: {}", e)))?;

        parsed.map_err(|e| match e {
            ExtractError::Io(io) => KbError::Storage(format!("scratch file error: {}", io)),
            other => KbError::Extraction {
                filename: filename.to_string(),
                reason: other.to_string(),
            },
        })
    }
}
