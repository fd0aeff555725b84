//! Paired dense + sparse embedding.

use std::sync::Arc;

use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};
use crate::sparse::{SparseEmbedder, SparseVector};

/// Produces a dense and a sparse vector for every input text.
///
/// Batches go out as exactly one dense call and one sparse call so that
/// indexing N descriptors costs a constant number of round trips.
#[derive(Clone)]
pub struct HybridEmbedder {
    dense: Arc<dyn EmbeddingProvider>,
    sparse: Arc<dyn SparseEmbedder>,
}

impl HybridEmbedder {
    /// Pair a dense provider with a sparse embedder.
    pub fn new(dense: Arc<dyn EmbeddingProvider>, sparse: Arc<dyn SparseEmbedder>) -> Self {
        Self { dense, sparse }
    }

    /// Dimension the dense provider reports for its default model.
    pub fn dense_dimension(&self) -> usize {
        self.dense.default_dimension()
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<(Embedding, SparseVector)> {
        let dense = self.dense.embed(EmbeddingRequest::new(text)).await?;
        let sparse = self.sparse.embed_sparse(text).await?;
        Ok((dense.embedding, sparse))
    }

    /// Embed many texts with one dense and one sparse batch call.
    pub async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Embedding>, Vec<SparseVector>)> {
        if texts.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        debug!(
            "Embedding batch of {} texts with {} + {}",
            texts.len(),
            self.dense.name(),
            self.sparse.name()
        );

        let requests = texts.iter().map(EmbeddingRequest::new).collect();
        let dense: Vec<Embedding> = self
            .dense
            .embed_batch(requests)
            .await?
            .into_iter()
            .map(|r| r.embedding)
            .collect();
        let sparse = self.sparse.embed_sparse_batch(texts).await?;

        if dense.len() != texts.len() || sparse.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "batch of {} texts produced {} dense and {} sparse vectors",
                texts.len(),
                dense.len(),
                sparse.len()
            )));
        }

        Ok((dense, sparse))
    }
}
