//! In-process vector index.

use std::cmp::Reverse;

use async_trait::async_trait;
use datachat_embeddings::{SparseVector, cosine_similarity, sparse_dot};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::fusion::DEFAULT_RANK_CONSTANT;
use crate::index::{IndexPoint, ScoredPoint, VectorIndex};

#[derive(Debug, Default)]
struct Collection {
    dimension: Option<usize>,
    points: IndexMap<String, IndexPoint>,
}

/// Vector index kept in memory.
///
/// Dense similarity is cosine; sparse similarity is the dot product of the
/// (already normalised) sparse vectors. Points keep insertion order, which
/// makes equal-score results come back in a stable order.
#[derive(Debug)]
pub struct InMemoryIndex {
    collection: RwLock<Collection>,
    rank_constant: u32,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collection: RwLock::new(Collection::default()),
            rank_constant: DEFAULT_RANK_CONSTANT,
        }
    }

    /// Override the fusion smoothing constant.
    pub fn with_rank_constant(mut self, rank_constant: u32) -> Self {
        self.rank_constant = rank_constant;
        self
    }

    /// Fetch a stored point by id.
    pub async fn get(&self, id: &str) -> Option<IndexPoint> {
        self.collection.read().await.points.get(id).cloned()
    }

    fn ranked(mut scored: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
        scored.sort_by_key(|p| Reverse(OrderedFloat(p.score)));
        scored.truncate(limit);
        scored
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn rank_constant(&self) -> u32 {
        self.rank_constant
    }

    async fn recreate_collection(&self, dense_dimension: usize) -> Result<()> {
        let mut collection = self.collection.write().await;
        collection.points.clear();
        collection.dimension = Some(dense_dimension);
        debug!("Recreated in-memory collection (dim {dense_dimension})");
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        let mut collection = self.collection.write().await;
        let Some(dimension) = collection.dimension else {
            return Err(RetrievalError::Index(
                "collection does not exist".to_string(),
            ));
        };

        if let Some(bad) = points.iter().find(|p| p.dense.len() != dimension) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: bad.dense.len(),
            });
        }

        for point in points {
            collection.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn query_dense(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let collection = self.collection.read().await;
        if let Some(dimension) = collection.dimension {
            if vector.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let mut scored = Vec::new();
        for point in collection.points.values() {
            let score = cosine_similarity(vector, &point.dense)?;
            if score >= score_threshold {
                scored.push(ScoredPoint {
                    id: point.id.clone(),
                    score,
                    payload: point.payload.clone(),
                });
            }
        }

        Ok(Self::ranked(scored, limit))
    }

    async fn query_sparse(
        &self,
        vector: &SparseVector,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let collection = self.collection.read().await;

        let scored = collection
            .points
            .values()
            .map(|point| (point, sparse_dot(vector, &point.sparse)))
            .filter(|(_, score)| *score > 0.0 && *score >= score_threshold)
            .map(|(point, score)| ScoredPoint {
                id: point.id.clone(),
                score,
                payload: point.payload.clone(),
            })
            .collect();

        Ok(Self::ranked(scored, limit))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.collection.read().await.points.len())
    }
}
