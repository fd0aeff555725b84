//! Qdrant backend over the REST API.

use async_trait::async_trait;
use datachat_embeddings::SparseVector;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::QdrantConfig;
use crate::descriptor::TableDescriptor;
use crate::error::{Result, RetrievalError};
use crate::fusion::DEFAULT_RANK_CONSTANT;
use crate::index::{DENSE_VECTOR, IndexPoint, SPARSE_VECTOR, ScoredPoint, VectorIndex};

/// Vector index stored in a Qdrant collection.
///
/// The collection has a cosine dense space named `dense` and a sparse space
/// named `sparse`; payloads are serialised [`TableDescriptor`]s.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    rank_constant: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<QdrantPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<TableDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantIndex {
    /// Create an index client for `collection`.
    pub fn new(config: &QdrantConfig, collection: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection: collection.into(),
            rank_constant: DEFAULT_RANK_CONSTANT,
        }
    }

    /// Override the fusion smoothing constant.
    pub fn with_rank_constant(mut self, rank_constant: u32) -> Self {
        self.rank_constant = rank_constant;
        self
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn url(&self, path: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, path)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| RetrievalError::Index(format!("qdrant unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Index(format!(
                "qdrant returned {status}: {text}"
            )));
        }

        Ok(response)
    }

    async fn query(
        &self,
        query: serde_json::Value,
        using: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let body = json!({
            "query": query,
            "using": using,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });

        let response = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/query"))
                    .json(&body),
            )
            .await?;
        let parsed: QueryResponse = response.json().await?;

        debug!(
            "qdrant {using} query returned {} points",
            parsed.result.points.len()
        );

        Ok(parsed
            .result
            .points
            .into_iter()
            .map(|point| ScoredPoint {
                id: match point.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                score: point.score,
                payload: point.payload.unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        "qdrant"
    }

    fn rank_constant(&self) -> u32 {
        self.rank_constant
    }

    async fn recreate_collection(&self, dense_dimension: usize) -> Result<()> {
        // A missing collection answers 404, which is fine here.
        let delete = self
            .request(reqwest::Method::DELETE, self.url(""))
            .send()
            .await
            .map_err(|e| RetrievalError::Index(format!("qdrant unreachable: {e}")))?;
        debug!("Dropped collection {}: {}", self.collection, delete.status());

        let body = json!({
            "vectors": {
                DENSE_VECTOR: { "size": dense_dimension, "distance": "Cosine" }
            },
            "sparse_vectors": {
                SPARSE_VECTOR: {}
            }
        });
        self.send(self.request(reqwest::Method::PUT, self.url("")).json(&body))
            .await?;

        info!(
            "Created collection {} (dense dim {dense_dimension})",
            self.collection
        );
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points: Vec<serde_json::Value> = points
            .into_iter()
            .map(|point| -> Result<serde_json::Value> {
                Ok(json!({
                    "id": point.id,
                    "vector": {
                        DENSE_VECTOR: point.dense,
                        SPARSE_VECTOR: {
                            "indices": point.sparse.indices,
                            "values": point.sparse.values,
                        }
                    },
                    "payload": serde_json::to_value(&point.payload)?,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        self.send(
            self.request(reqwest::Method::PUT, self.url("/points?wait=true"))
                .json(&json!({ "points": points })),
        )
        .await?;

        debug!("Upserted {count} points into {}", self.collection);
        Ok(())
    }

    async fn query_dense(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        self.query(json!(vector), DENSE_VECTOR, limit, score_threshold)
            .await
    }

    async fn query_sparse(
        &self,
        vector: &SparseVector,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        let query = json!({ "indices": vector.indices, "values": vector.values });
        self.query(query, SPARSE_VECTOR, limit, score_threshold)
            .await
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/count"))
                    .json(&json!({ "exact": true })),
            )
            .await?;
        let parsed: CountResponse = response.json().await?;
        Ok(parsed.result.count)
    }
}
