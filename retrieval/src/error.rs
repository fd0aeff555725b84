//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] datachat_embeddings::EmbeddingError),

    /// Vector index rejected a request or returned an error status.
    #[error("index error: {0}")]
    Index(String),

    /// Stored vectors do not match the collection's dense dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Indexing input was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a reranker.
#[derive(Error, Debug)]
pub enum RerankError {
    /// No API key was available when the reranker was constructed.
    #[error("rerank credentials missing: {0}")]
    MissingCredentials(String),

    /// API request failed.
    #[error("rerank request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid rerank response: {0}")]
    InvalidResponse(String),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
