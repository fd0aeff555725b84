//! Cross-encoder reranking of fused candidates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RerankConfig;
use crate::descriptor::TableDescriptor;
use crate::error::RerankError;

const MAX_COLUMNS: usize = 10;
const MAX_FOREIGN_KEYS: usize = 5;

/// One reranked document: its index in the input list and its relevance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
    pub index: usize,
    pub relevance_score: f32,
}

/// Reorders documents by relevance to a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Return at most `top_k` results, most relevant first. Every `index`
    /// refers to a position in `documents`.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, RerankError>;
}

/// Flatten a descriptor into the text a reranker scores.
///
/// Only the first ten columns and the first five foreign keys are included.
pub fn searchable_text(descriptor: &TableDescriptor) -> String {
    let mut parts = vec![
        format!("Table: {}", descriptor.table_name),
        format!("Schema: {}", descriptor.schema_name),
    ];

    if !descriptor.description.is_empty() {
        parts.push(format!("Description: {}", descriptor.description));
    }

    if !descriptor.columns.is_empty() {
        let columns: Vec<String> = descriptor
            .columns
            .iter()
            .take(MAX_COLUMNS)
            .map(|c| {
                if c.description.is_empty() {
                    format!("{} ({})", c.column_name, c.data_type)
                } else {
                    format!("{} ({}): {}", c.column_name, c.data_type, c.description)
                }
            })
            .collect();
        parts.push(format!("Columns: {}", columns.join(", ")));
    }

    if !descriptor.primary_key.is_empty() {
        parts.push(format!("Primary Keys: {}", descriptor.primary_key.join(", ")));
    }

    if !descriptor.foreign_keys.is_empty() {
        let keys: Vec<String> = descriptor
            .foreign_keys
            .iter()
            .take(MAX_FOREIGN_KEYS)
            .map(|fk| format!("{} -> {}", fk.column, fk.references.table))
            .collect();
        parts.push(format!("Foreign Keys: {}", keys.join(", ")));
    }

    parts.join(" | ")
}

/// Cohere rerank API client.
pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    default_top_k: usize,
}

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    results: Vec<RerankResult>,
}

impl CohereReranker {
    /// Create a reranker with an explicit key.
    ///
    /// A missing or blank key fails here, not on the first call.
    pub fn new(api_key: Option<String>, config: &RerankConfig) -> Result<Self, RerankError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RerankError::MissingCredentials(
                    "set COHERE_API_KEY or pass an API key".to_string(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_top_k: config.top_k,
        })
    }

    /// Create a reranker using `COHERE_API_KEY`.
    pub fn from_env(config: &RerankConfig) -> Result<Self, RerankError> {
        Self::new(std::env::var("COHERE_API_KEY").ok(), config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let top_n = if top_k == 0 { self.default_top_k } else { top_k }.min(documents.len());

        debug!(
            "Reranking {} documents with {} (top {top_n})",
            documents.len(),
            self.model
        );

        let response = self
            .client
            .post(format!("{}/v2/rerank", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&CohereRequest {
                model: &self.model,
                query,
                documents,
                top_n,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RerankError::ApiRequest(format!("{status}: {text}")));
        }

        let parsed: CohereResponse = response.json().await?;

        if let Some(bad) = parsed.results.iter().find(|r| r.index >= documents.len()) {
            return Err(RerankError::InvalidResponse(format!(
                "result index {} out of range for {} documents",
                bad.index,
                documents.len()
            )));
        }

        Ok(parsed.results)
    }
}

/// How much reranking moved results relative to the fused order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RerankStats {
    /// Number of reranked results compared.
    pub compared: usize,

    /// Mean absolute change in position.
    pub average_rank_change: f64,

    /// Results that moved up.
    pub improved: usize,

    /// Results that moved down.
    pub worsened: usize,
}

impl RerankStats {
    /// Compare reranked results against their original positions.
    ///
    /// `results[i].index` is the original (0-based) position of the document
    /// that ended up at position `i`.
    pub fn from_results(results: &[RerankResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }

        let mut total_change = 0usize;
        let mut improved = 0;
        let mut worsened = 0;

        for (new_position, result) in results.iter().enumerate() {
            total_change += new_position.abs_diff(result.index);
            if new_position < result.index {
                improved += 1;
            } else if new_position > result.index {
                worsened += 1;
            }
        }

        Self {
            compared: results.len(),
            average_rank_change: total_change as f64 / results.len() as f64,
            improved,
            worsened,
        }
    }
}
