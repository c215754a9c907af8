//! Wiring: one [`KnowledgeBase`] value holding the collection manager,
//! indexing pipeline, and query engine over a shared embedding provider.
//!
//! The CLI and the HTTP server both build it once at start-up.

use anyhow::Result;
use std::sync::Arc;

use knowledge_base_core::chunk::Chunker;
use knowledge_base_core::embedding::EmbeddingProvider;
use knowledge_base_core::store::IndexBackend;

use crate::collections::CollectionManager;
use crate::config::Config;
use crate::embedding;
use crate::ingest::IndexingPipeline;
use crate::query::QueryEngine;
use crate::sqlite_index::SqliteBackend;

pub struct KnowledgeBase<B: IndexBackend = SqliteBackend> {
    manager: Arc<CollectionManager<B>>,
    pipeline: IndexingPipeline<B>,
    engine: QueryEngine<B>,
}

impl KnowledgeBase<SqliteBackend> {
    /// Build from configuration, loading the configured embedding provider.
    ///
    /// Provider construction may download a model, so it runs on the
    /// blocking pool.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedding_config = config.embedding.clone();
        let provider =
            tokio::task::spawn_blocking(move || embedding::create_provider(&embedding_config))
                .await??;
        tracing::info!(
            provider = %config.embedding.provider,
            model = provider.model_name(),
            dims = provider.dims(),
            "Embedding provider ready"
        );
        Self::with_provider(config, provider)
    }

    /// Build over SQLite storage with an already constructed provider.
    pub fn with_provider(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::with_backend(config, SqliteBackend::new(), provider)
    }
}

impl<B: IndexBackend> KnowledgeBase<B> {
    pub fn with_backend(config: &Config, backend: B, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let manager = Arc::new(
            CollectionManager::new(config.storage.base_dir.clone(), backend, provider)
                .with_batch_size(config.embedding.batch_size),
        );
        let pipeline = IndexingPipeline::new(
            manager.clone(),
            chunker,
            config.storage.scratch_dir.clone(),
        );
        let engine = QueryEngine::new(manager.clone(), config.retrieval.clone());

        Ok(Self {
            manager,
            pipeline,
            engine,
        })
    }

    pub fn collections(&self) -> &CollectionManager<B> {
        &self.manager
    }

    pub fn pipeline(&self) -> &IndexingPipeline<B> {
        &self.pipeline
    }

    pub fn engine(&self) -> &QueryEngine<B> {
        &self.engine
    }
}
