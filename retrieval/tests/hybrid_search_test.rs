//! Integration tests for indexing and hybrid search.
//!
//! These run the full engine against the in-memory index with a local
//! dense provider, so no network is involved.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use datachat_embeddings::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, LexicalSparseEncoder, normalize,
};
use datachat_retrieval::index::point_id;
use datachat_retrieval::{
    FusedPoint, HybridEmbedder, HybridRetrieval, InMemoryIndex, IndexPoint, RerankError,
    RerankResult, Reranker, RetrievalConfig, ScoredPoint, SemanticsDocument, SparseVector,
    VectorIndex,
};
use pretty_assertions::assert_eq;

const DIMENSION: usize = 256;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn document() -> SemanticsDocument {
    let json = std::fs::read_to_string(fixtures_dir().join("semantics.json")).unwrap();
    SemanticsDocument::from_json(&json).unwrap()
}

/// Dense provider that folds the lexical vector into a fixed number of
/// dimensions, so related texts land close together.
#[derive(Default)]
struct FoldingProvider {
    single_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl FoldingProvider {
    fn fold(text: &str) -> Vec<f32> {
        let sparse = LexicalSparseEncoder::new().encode(text);
        let mut dense = vec![0.0; DIMENSION];
        for (index, value) in sparse.indices.iter().zip(&sparse.values) {
            dense[*index as usize % DIMENSION] += value;
        }
        normalize(&mut dense);
        dense
    }

    fn response(text: &str) -> EmbeddingResponse {
        EmbeddingResponse {
            embedding: Self::fold(text),
            model: "folding".to_string(),
            dimension: DIMENSION,
            tokens_used: None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FoldingProvider {
    fn name(&self) -> &str {
        "folding"
    }

    fn default_model(&self) -> &str {
        "folding"
    }

    fn default_dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> datachat_embeddings::Result<EmbeddingResponse> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::response(&request.text))
    }

    async fn embed_batch(
        &self,
        requests: Vec<EmbeddingRequest>,
    ) -> datachat_embeddings::Result<Vec<EmbeddingResponse>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(requests.iter().map(|r| Self::response(&r.text)).collect())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Wraps the in-memory index and records every fused-search limit.
struct RecordingIndex {
    inner: InMemoryIndex,
    limits: Mutex<Vec<usize>>,
}

impl RecordingIndex {
    fn new() -> Self {
        Self {
            inner: InMemoryIndex::new(),
            limits: Mutex::new(Vec::new()),
        }
    }

    fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    fn name(&self) -> &str {
        "recording"
    }

    async fn recreate_collection(&self, dense_dimension: usize) -> datachat_retrieval::Result<()> {
        self.inner.recreate_collection(dense_dimension).await
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> datachat_retrieval::Result<()> {
        self.inner.upsert(points).await
    }

    async fn query_dense(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> datachat_retrieval::Result<Vec<ScoredPoint>> {
        self.inner.query_dense(vector, limit, score_threshold).await
    }

    async fn query_sparse(
        &self,
        vector: &SparseVector,
        limit: usize,
        score_threshold: f32,
    ) -> datachat_retrieval::Result<Vec<ScoredPoint>> {
        self.inner.query_sparse(vector, limit, score_threshold).await
    }

    async fn count(&self) -> datachat_retrieval::Result<usize> {
        self.inner.count().await
    }

    async fn fused_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
        score_threshold: f32,
    ) -> datachat_retrieval::Result<Vec<FusedPoint>> {
        self.limits.lock().unwrap().push(limit);
        self.inner
            .fused_search(dense, sparse, limit, score_threshold)
            .await
    }
}

struct FailingReranker {
    calls: AtomicUsize,
}

#[async_trait]
impl Reranker for FailingReranker {
    fn name(&self) -> &str {
        "failing"
    }

    async fn rerank(
        &self,
        _query: &str,
        _documents: &[String],
        _top_k: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RerankError::ApiRequest("503: unavailable".to_string()))
    }
}

/// Returns candidates in reverse order.
struct ReversingReranker;

#[async_trait]
impl Reranker for ReversingReranker {
    fn name(&self) -> &str {
        "reversing"
    }

    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        Ok((0..documents.len())
            .rev()
            .take(top_k)
            .enumerate()
            .map(|(position, index)| RerankResult {
                index,
                relevance_score: 1.0 - position as f32 * 0.1,
            })
            .collect())
    }
}

fn config() -> RetrievalConfig {
    RetrievalConfig::default().with_dense_dimension(DIMENSION)
}

fn embedder(provider: Arc<FoldingProvider>) -> HybridEmbedder {
    HybridEmbedder::new(provider, Arc::new(LexicalSparseEncoder::new()))
}

fn table_names(hits: &[datachat_retrieval::SearchHit]) -> Vec<String> {
    hits.iter()
        .map(|h| h.descriptor.table_name.clone())
        .collect()
}

#[tokio::test]
async fn test_index_then_search_round_trip() {
    let engine = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        Arc::new(InMemoryIndex::new()),
        config(),
    );
    engine.index_tables(&document()).await.unwrap();

    let hits = engine
        .search("product catalog list price", 3, None)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].descriptor.qualified_name(), "sales.products");
    assert_eq!(hits[0].rank, 1);
    assert!(!hits[0].reranking_applied);
    assert!(hits.len() <= 3);
}

#[tokio::test]
async fn test_one_point_per_table_with_both_vectors() {
    let provider = Arc::new(FoldingProvider::default());
    let index = Arc::new(InMemoryIndex::new());
    let engine = HybridRetrieval::new(embedder(provider.clone()), index.clone(), config());
    let document = document();

    let report = engine.index_tables(&document).await.unwrap();

    assert_eq!(report.schemas, 2);
    assert_eq!(report.tables, 4);
    assert_eq!(report.indexes, 1);
    assert_eq!(report.points, 4);
    assert_eq!(index.count().await.unwrap(), 4);

    for descriptor in document.descriptors() {
        let point = index.get(&point_id(&descriptor)).await.unwrap();
        assert_eq!(point.dense.len(), DIMENSION);
        assert!(!point.sparse.is_empty());
        assert_eq!(point.payload, descriptor);
    }

    // One batched dense call for the whole document.
    assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.single_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reindexing_replaces_points() {
    let index = Arc::new(InMemoryIndex::new());
    let engine = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        index.clone(),
        config(),
    );

    engine.index_tables(&document()).await.unwrap();
    engine.index_tables(&document()).await.unwrap();

    assert_eq!(index.count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_broken_reranker_falls_back_to_fused_order() {
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    let reranker = Arc::new(FailingReranker {
        calls: AtomicUsize::new(0),
    });
    let engine = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        index.clone(),
        config(),
    )
    .with_reranker(reranker.clone());
    engine.index_tables(&document()).await.unwrap();

    let plain = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        index,
        config(),
    );

    let query = "customer orders by region";
    let reranked = engine.search(query, 2, Some(true)).await.unwrap();
    let fused = plain.search(query, 2, Some(false)).await.unwrap();

    assert_eq!(reranker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(table_names(&reranked), table_names(&fused));
    assert_eq!(reranked.len(), 2);
    assert!(reranked.iter().all(|h| !h.reranking_applied));
    assert!(reranked.iter().all(|h| h.rerank_score.is_none()));
}

#[tokio::test]
async fn test_oversampling_only_when_reranking_applies() {
    let index = Arc::new(RecordingIndex::new());
    let with_reranker = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        index.clone(),
        config(),
    )
    .with_reranker(Arc::new(ReversingReranker));
    with_reranker.index_tables(&document()).await.unwrap();

    let without_reranker = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        index.clone(),
        config(),
    );

    with_reranker.search("orders", 2, None).await.unwrap();
    with_reranker.search("orders", 2, Some(false)).await.unwrap();
    without_reranker.search("orders", 2, Some(true)).await.unwrap();

    assert_eq!(index.limits(), vec![6, 2, 2]);
}

#[tokio::test]
async fn test_reranked_order_is_returned() {
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    let engine = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        index.clone(),
        config(),
    )
    .with_reranker(Arc::new(ReversingReranker));
    engine.index_tables(&document()).await.unwrap();

    let query = "customer orders by region";
    let fused = engine.search(query, 12, Some(false)).await.unwrap();
    let reranked = engine.search(query, 2, Some(true)).await.unwrap();

    assert_eq!(reranked.len(), 2.min(fused.len()));
    assert_eq!(
        reranked[0].descriptor,
        fused[fused.len() - 1].descriptor
    );
    assert_eq!(
        reranked.iter().map(|h| h.rank).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(reranked.iter().all(|h| h.reranking_applied));
    assert_eq!(reranked[0].rerank_score, Some(1.0));
}

#[tokio::test]
async fn test_search_is_deterministic() {
    let engine = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        Arc::new(InMemoryIndex::new()),
        config(),
    );
    engine.index_tables(&document()).await.unwrap();

    let first = engine
        .search("customer signup date and ticket severity", 4, None)
        .await
        .unwrap();
    for _ in 0..5 {
        let again = engine
            .search("customer signup date and ticket severity", 4, None)
            .await
            .unwrap();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn test_semantic_context_from_search() {
    let engine = HybridRetrieval::new(
        embedder(Arc::new(FoldingProvider::default())),
        Arc::new(InMemoryIndex::new()),
        config(),
    );
    engine.index_tables(&document()).await.unwrap();

    let context = engine
        .semantic_context("product catalog list price", 1)
        .await
        .unwrap();

    assert_eq!(context.selected, vec!["products".to_string()]);
    assert!(context.tables.contains_key("products"));
    assert!(context.all_tables.contains("products"));
    assert!(context.timings.is_some());
}
