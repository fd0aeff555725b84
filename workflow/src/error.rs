//! Error types for the conversation workflow.

use thiserror::Error;

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors that end a workflow run.
///
/// SQL execution failures and retrieval failures are not here: the first
/// drive the repair loop and the second degrade to an empty context.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A generation step that has no fallback failed.
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    /// Session log could not be read or written.
    #[error("session store error: {0}")]
    Session(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a language model backend.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key configured.
    #[error("language model not configured")]
    NotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limited.
    #[error("rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
