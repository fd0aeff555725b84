//! Table retrieval as seen by the workflow.

use async_trait::async_trait;
use datachat_retrieval::{HybridRetrieval, RetrievalError, SemanticContext};

/// Finds the tables relevant to a question.
#[async_trait]
pub trait TableRetriever: Send + Sync {
    async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<SemanticContext, RetrievalError>;
}

#[async_trait]
impl TableRetriever for HybridRetrieval {
    async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<SemanticContext, RetrievalError> {
        self.semantic_context(question, top_k).await
    }
}
