//! Query engine: embed the question, search one collection, score hits.

use std::sync::Arc;

use knowledge_base_core::collection::CollectionName;
use knowledge_base_core::embedding::embed_one;
use knowledge_base_core::models::QueryResponse;
use knowledge_base_core::search::similarity_query;
use knowledge_base_core::store::{DimensionMismatch, IndexBackend, VectorIndex};
use knowledge_base_core::{KbError, KbResult};

use crate::collections::CollectionManager;
use crate::config::RetrievalConfig;

pub struct QueryEngine<B: IndexBackend> {
    manager: Arc<CollectionManager<B>>,
    retrieval: RetrievalConfig,
}

impl<B: IndexBackend> QueryEngine<B> {
    pub fn new(manager: Arc<CollectionManager<B>>, retrieval: RetrievalConfig) -> Self {
        Self { manager, retrieval }
    }

    /// Return the `top_k` chunks of `collection` closest to `text`.
    ///
    /// `top_k` defaults to `retrieval.default_top_k` and is clamped to
    /// `retrieval.max_top_k`; zero is rejected. Results keep the index's
    /// ranking. An existing but empty collection yields no documents. A
    /// query embedding whose width differs from the stored vectors is
    /// rejected as an invalid request.
    pub async fn query(&self, text: &str, collection: &str, top_k: Option<usize>) -> KbResult<QueryResponse> {
        let name = CollectionName::parse(collection)?;
        let top_k = match top_k.unwrap_or(self.retrieval.default_top_k) {
            0 => return Err(KbError::InvalidRequest("top_k must be >= 1".to_string())),
            k => k.min(self.retrieval.max_top_k),
        };

        if !self.manager.exists(&name).await {
            return Err(KbError::NotFound(name.to_string()));
        }

        let query_vec = embed_one(self.manager.embedder().as_ref(), text)
            .await
            .map_err(KbError::embedding)?;

        let index = self.manager.open(&name).await?;
        let results =
            similarity_query(&index, &query_vec, top_k, self.retrieval.score_saturation).await;
        index.close().await;
        let documents = results.map_err(|e| match e.downcast_ref::<DimensionMismatch>() {
            Some(mismatch) => KbError::InvalidRequest(format!(
                "{}; the collection was indexed with a different embedding model",
                mismatch
            )),
            None => KbError::storage(e),
        })?;

        tracing::debug!(collection = %name, top_k, hits = documents.len(), "Query served");
        Ok(QueryResponse {
            query: text.to_string(),
            count: documents.len(),
            documents,
        })
    }
}
