//! SQL execution interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One result row, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Class of an execution failure.
///
/// The workflow routes every class the same way; the class is kept so the
/// repair step and the final answer can report what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The database could not be reached.
    Connectivity,

    /// The database rejected the query.
    Validity,

    /// Anything else.
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Validity => "validity",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified execution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct ExecutionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connectivity, message)
    }

    pub fn validity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validity, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

/// Runs SQL against the relational store.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one statement and return its rows. An empty result is `Ok`.
    async fn execute(&self, sql: &str) -> std::result::Result<Vec<Row>, ExecutionFailure>;
}
