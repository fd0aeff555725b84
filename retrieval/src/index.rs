//! Vector index abstraction over named dense and sparse spaces.

use async_trait::async_trait;
use datachat_embeddings::{Embedding, SparseVector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::descriptor::TableDescriptor;
use crate::error::Result;
use crate::fusion::{DEFAULT_RANK_CONSTANT, FusedPoint, reciprocal_rank_fusion};

/// Name of the dense vector space.
pub const DENSE_VECTOR: &str = "dense";

/// Name of the sparse vector space.
pub const SPARSE_VECTOR: &str = "sparse";

/// One stored point: both vectors plus the descriptor payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: String,
    pub dense: Embedding,
    pub sparse: SparseVector,
    pub payload: TableDescriptor,
}

impl IndexPoint {
    /// Build a point whose id is derived from the table's qualified name.
    pub fn for_descriptor(
        descriptor: TableDescriptor,
        dense: Embedding,
        sparse: SparseVector,
    ) -> Self {
        Self {
            id: point_id(&descriptor),
            dense,
            sparse,
            payload: descriptor,
        }
    }
}

/// A point returned by a single-space sub-query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: TableDescriptor,
}

/// Stable point id for a descriptor, so re-indexing a table replaces it.
pub fn point_id(descriptor: &TableDescriptor) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, descriptor.qualified_name().as_bytes()).to_string()
}

/// A store holding one point per table with a dense and a sparse vector.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Drop the collection if it exists and create it empty.
    async fn recreate_collection(&self, dense_dimension: usize) -> Result<()>;

    /// Insert or replace points by id.
    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()>;

    /// Nearest neighbours in the dense space, best first.
    async fn query_dense(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>>;

    /// Best matches in the sparse space, best first.
    async fn query_sparse(
        &self,
        vector: &SparseVector,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>>;

    /// Number of stored points.
    async fn count(&self) -> Result<usize>;

    /// Smoothing constant used by [`VectorIndex::fused_search`].
    fn rank_constant(&self) -> u32 {
        DEFAULT_RANK_CONSTANT
    }

    /// Run one sub-query per space and merge them with reciprocal rank fusion.
    ///
    /// Each sub-query fetches `limit * 2` candidates so fusion sees points
    /// that rank well in only one space.
    async fn fused_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<FusedPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefetch = limit.saturating_mul(2);
        let dense_hits = self.query_dense(dense, prefetch, score_threshold).await?;
        let sparse_hits = self.query_sparse(sparse, prefetch, score_threshold).await?;

        debug!(
            "{}: {} dense, {} sparse candidates",
            self.name(),
            dense_hits.len(),
            sparse_hits.len()
        );

        let mut fused = reciprocal_rank_fusion(dense_hits, sparse_hits, self.rank_constant());
        fused.truncate(limit);
        Ok(fused)
    }
}
