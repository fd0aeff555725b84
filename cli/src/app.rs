//! Builds the retrieval engine and workflow from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use datachat_embeddings::{DEFAULT_DIMENSION, HybridEmbedder, LexicalSparseEncoder, OpenAIProvider};
use datachat_retrieval::{CohereReranker, HybridRetrieval, QdrantIndex};
use datachat_workflow::{
    ExecutionFailure, InMemorySessionStore, OpenAiChatModel, Row, SqlExecutor, Workflow,
};
use tracing::{info, warn};

use crate::config::AppConfig;

/// Build the retrieval engine, optionally against another collection.
pub fn retrieval(config: &AppConfig, collection: Option<&str>) -> HybridRetrieval {
    let mut retrieval_config = config.retrieval.clone();
    if let Some(collection) = collection {
        retrieval_config.collection_name = collection.to_string();
    }

    let mut provider = OpenAIProvider::new().with_model(config.embedding.model.as_str());
    if let Some(url) = &config.embedding.base_url {
        provider = provider.with_base_url(url.as_str());
    }
    if retrieval_config.dense_dimension != DEFAULT_DIMENSION {
        provider = provider.with_dimensions(retrieval_config.dense_dimension);
    }

    let embedder = HybridEmbedder::new(Arc::new(provider), Arc::new(LexicalSparseEncoder::new()));
    let index = QdrantIndex::new(&retrieval_config.qdrant, retrieval_config.collection_name.as_str())
        .with_rank_constant(retrieval_config.rank_constant);

    let reranker = if retrieval_config.use_reranking {
        match CohereReranker::from_env(&retrieval_config.rerank) {
            Ok(reranker) => Some(reranker),
            Err(e) => {
                warn!("Reranking disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    let engine = HybridRetrieval::new(embedder, Arc::new(index), retrieval_config);
    match reranker {
        Some(reranker) => engine.with_reranker(Arc::new(reranker)),
        None => engine,
    }
}

/// Build a workflow over the engine, a chat model, and the configured database.
pub fn workflow(config: &AppConfig, retrieval: HybridRetrieval) -> Workflow {
    let mut llm = OpenAiChatModel::new()
        .with_model(config.llm.model.as_str())
        .with_temperature(config.llm.temperature);
    if let Some(url) = &config.llm.base_url {
        llm = llm.with_base_url(url.as_str());
    }

    Workflow::new(
        Arc::new(llm),
        Arc::new(retrieval),
        executor(config),
        Arc::new(InMemorySessionStore::new()),
    )
    .with_config(config.workflow.clone())
}

#[cfg(feature = "postgres")]
fn executor(config: &AppConfig) -> Arc<dyn SqlExecutor> {
    match &config.database.url {
        Some(url) => {
            info!("Executing SQL against Postgres");
            Arc::new(datachat_workflow::PostgresExecutor::new(url.as_str()))
        }
        None => Arc::new(NoDatabase),
    }
}

#[cfg(not(feature = "postgres"))]
fn executor(config: &AppConfig) -> Arc<dyn SqlExecutor> {
    if config.database.url.is_some() {
        info!("DATABASE_URL is set but this build has no postgres support");
    }
    Arc::new(NoDatabase)
}

/// Stand-in executor when no database is available.
///
/// Every execution fails as a connectivity problem, so questions that need
/// data end in the no-answer outcome.
struct NoDatabase;

#[async_trait]
impl SqlExecutor for NoDatabase {
    async fn execute(&self, _sql: &str) -> Result<Vec<Row>, ExecutionFailure> {
        Err(ExecutionFailure::connectivity("no database configured"))
    }
}
