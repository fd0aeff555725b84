//! Workflow configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Tables kept in the semantic context.
    pub retrieval_top_k: usize,

    /// History messages given to intent classification and SQL generation.
    pub history_window: usize,

    /// History messages given to summary and visualization.
    pub summary_window: usize,

    /// Session messages loaded as history before a run.
    pub session_history_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            retrieval_top_k: 10,
            history_window: 6,
            summary_window: 1,
            session_history_limit: 10,
        }
    }
}
