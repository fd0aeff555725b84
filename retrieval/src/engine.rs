//! Hybrid retrieval engine implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use datachat_embeddings::HybridEmbedder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::context::{RetrievalTimings, SemanticContext, organize};
use crate::descriptor::{SemanticsDocument, TableDescriptor};
use crate::error::{Result, RetrievalError};
use crate::fusion::FusedPoint;
use crate::index::{IndexPoint, VectorIndex};
use crate::rerank::{RerankStats, Reranker, searchable_text};

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub descriptor: TableDescriptor,

    /// Reciprocal rank fusion score.
    pub fusion_score: f64,

    /// Cross-encoder relevance, when reranking ran.
    pub rerank_score: Option<f32>,

    /// 1-based position in the final ordering.
    pub rank: usize,

    pub reranking_applied: bool,
}

/// Outcome of indexing a semantics document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub collection: String,
    pub schemas: usize,
    pub tables: usize,
    pub indexes: usize,
    pub points: usize,
}

/// Hybrid dense/sparse retrieval over table descriptors.
///
/// This is the entry point for table lookup. It coordinates:
/// - Embedding queries and descriptors into both vector spaces
/// - Fused search against the vector index
/// - Optional reranking, which falls back to fused order on failure
pub struct HybridRetrieval {
    embedder: HybridEmbedder,
    index: Arc<dyn VectorIndex>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl HybridRetrieval {
    /// Create an engine without a reranker.
    pub fn new(
        embedder: HybridEmbedder,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker: None,
            config,
        }
    }

    /// Attach a reranker.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Embed every descriptor and replace the collection's contents.
    ///
    /// All descriptors are embedded with one dense and one sparse batch call
    /// and written with a single upsert.
    pub async fn index_tables(&self, document: &SemanticsDocument) -> Result<IndexReport> {
        let descriptors = document.descriptors();
        info!(
            "Indexing {} tables from {} schemas into {}",
            descriptors.len(),
            document.schema_count(),
            self.config.collection_name
        );

        let texts: Vec<String> = descriptors.iter().map(|d| d.index_text()).collect();
        let (dense, sparse) = self.embedder.embed_batch(&texts).await?;

        if let Some(bad) = dense
            .iter()
            .find(|v| v.len() != self.config.dense_dimension)
        {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.config.dense_dimension,
                actual: bad.len(),
            });
        }

        self.index
            .recreate_collection(self.config.dense_dimension)
            .await?;

        let points: Vec<IndexPoint> = descriptors
            .into_iter()
            .zip(dense)
            .zip(sparse)
            .map(|((descriptor, dense), sparse)| IndexPoint::for_descriptor(descriptor, dense, sparse))
            .collect();
        let count = points.len();

        self.index.upsert(points).await?;

        info!("Indexed {count} points");

        Ok(IndexReport {
            collection: self.config.collection_name.clone(),
            schemas: document.schema_count(),
            tables: document.table_count(),
            indexes: document.index_count(),
            points: count,
        })
    }

    /// Return up to `k` tables ranked by relevance to `query`.
    ///
    /// `use_reranking` overrides the configured default. Reranking only runs
    /// when it is requested and a reranker was attached; in that case the
    /// fused candidate pool is `k * rerank_oversample`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        use_reranking: Option<bool>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let requested = use_reranking.unwrap_or(self.config.use_reranking);
        let reranker = if requested {
            self.reranker.as_ref()
        } else {
            None
        };

        let limit = match reranker {
            Some(_) => k.saturating_mul(self.config.rerank_oversample.max(1)),
            None => k,
        };

        debug!("Searching {query:?} (k={k}, limit={limit})");

        let (dense, sparse) = self.embedder.embed_query(query).await?;
        let fused = self
            .index
            .fused_search(&dense, &sparse, limit, self.config.score_threshold)
            .await?;

        let Some(reranker) = reranker else {
            return Ok(fused_hits(fused, k));
        };

        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = fused.iter().map(|p| searchable_text(&p.payload)).collect();

        match reranker.rerank(query, &documents, k).await {
            Ok(results) => {
                let stats = RerankStats::from_results(&results);
                debug!(
                    "Reranked {} candidates with {}: avg rank change {:.2}",
                    stats.compared,
                    reranker.name(),
                    stats.average_rank_change
                );

                let mut seen = HashSet::new();
                let hits = results
                    .into_iter()
                    .filter(|r| r.index < fused.len() && seen.insert(r.index))
                    .take(k)
                    .enumerate()
                    .map(|(position, result)| {
                        let point = &fused[result.index];
                        SearchHit {
                            descriptor: point.payload.clone(),
                            fusion_score: point.score,
                            rerank_score: Some(result.relevance_score),
                            rank: position + 1,
                            reranking_applied: true,
                        }
                    })
                    .collect();
                Ok(hits)
            }
            Err(e) => {
                warn!("Reranking failed, using fused order: {e}");
                Ok(fused_hits(fused, k))
            }
        }
    }

    /// Search with `top_k * 2` candidates and organise them into a context.
    pub async fn semantic_context(&self, question: &str, top_k: usize) -> Result<SemanticContext> {
        let started = Instant::now();
        let hits = self.search(question, top_k.saturating_mul(2), None).await?;
        let search_ms = started.elapsed().as_millis() as u64;

        let organize_started = Instant::now();
        let mut context = organize(&hits, top_k);
        let organize_ms = organize_started.elapsed().as_millis() as u64;

        let reranked_hits = hits.iter().filter(|h| h.reranking_applied).count();
        context.timings = Some(RetrievalTimings {
            search_ms,
            organize_ms,
            total_ms: started.elapsed().as_millis() as u64,
            reranking_applied: reranked_hits > 0,
            reranked_hits,
        });

        debug!(
            "Semantic context: {} selected of {} seen",
            context.selected.len(),
            context.all_tables.len()
        );

        Ok(context)
    }
}

fn fused_hits(fused: Vec<FusedPoint>, k: usize) -> Vec<SearchHit> {
    fused
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(position, point)| SearchHit {
            descriptor: point.payload,
            fusion_score: point.score,
            rerank_score: None,
            rank: position + 1,
            reranking_applied: false,
        })
        .collect()
}
