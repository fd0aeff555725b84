//! Configuration for the hybrid retrieval engine.

use serde::{Deserialize, Serialize};

/// Configuration for the hybrid retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Name of the vector collection holding table descriptors.
    pub collection_name: String,

    /// Fixed size of the dense vector space.
    pub dense_dimension: usize,

    /// Minimum similarity for a point to appear in a sub-query.
    pub score_threshold: f32,

    /// Smoothing constant for reciprocal rank fusion.
    pub rank_constant: u32,

    /// Candidate multiplier applied when reranking will run.
    pub rerank_oversample: usize,

    /// Whether searches rerank by default.
    pub use_reranking: bool,

    /// Vector store connection.
    pub qdrant: QdrantConfig,

    /// Reranker settings.
    pub rerank: RerankConfig,
}

impl RetrievalConfig {
    /// Create a new configuration for the given collection.
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..Self::default()
        }
    }

    /// Set the dense dimension.
    pub fn with_dense_dimension(mut self, dimension: usize) -> Self {
        self.dense_dimension = dimension;
        self
    }

    /// Enable or disable reranking by default.
    pub fn with_reranking(mut self, enabled: bool) -> Self {
        self.use_reranking = enabled;
        self
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection_name: "semantics".to_string(),
            dense_dimension: datachat_embeddings::DEFAULT_DIMENSION,
            score_threshold: 0.2,
            rank_constant: crate::fusion::DEFAULT_RANK_CONSTANT,
            rerank_oversample: 3,
            use_reranking: true,
            qdrant: QdrantConfig::default(),
            rerank: RerankConfig::default(),
        }
    }
}

/// Connection settings for Qdrant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// Base URL of the REST API.
    pub url: String,

    /// API key, sent as the `api-key` header.
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
        }
    }
}

/// Configuration for the reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Rerank model name.
    pub model: String,

    /// Default number of results kept after reranking.
    pub top_k: usize,

    /// Base URL of the rerank API.
    pub base_url: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: "rerank-v3.5".to_string(),
            top_k: 10,
            base_url: "https://api.cohere.com".to_string(),
        }
    }
}
