//! Conversation state carried through one workflow run.

use datachat_retrieval::SemanticContext;
use serde::{Deserialize, Serialize};

use crate::executor::{ErrorKind, Row};

/// Number of repairs allowed before giving up.
pub const MAX_REPAIR_ATTEMPTS: u32 = 3;

/// Cap on recorded execution errors: one per execution attempt.
pub const MAX_ERROR_HISTORY: usize = MAX_REPAIR_ATTEMPTS as usize + 1;

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Greetings and small talk.
    General,

    /// Questions about what the assistant can do.
    Help,

    /// Anything answered from data.
    DataQuery,
}

impl Intent {
    /// Parse a classifier label. Unknown labels are treated as data queries.
    pub fn parse(label: &str) -> Self {
        let label = label
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
            .to_lowercase();

        match label.as_str() {
            "general" => Intent::General,
            "help" => Intent::Help,
            _ => Intent::DataQuery,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One recorded execution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything one question accumulates on its way to an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub question: String,

    /// Rolling history window fed to the generation steps.
    pub history: Vec<HistoryMessage>,

    pub intent: Option<Intent>,
    pub semantic_context: SemanticContext,
    pub sql_query: Option<String>,
    pub query_result: Option<Vec<Row>>,
    pub has_sql_error: bool,
    pub error_message: Option<String>,

    /// Oldest first, at most [`MAX_ERROR_HISTORY`] entries.
    pub error_history: Vec<ErrorRecord>,

    /// Only ever incremented by the repair step.
    pub retry_count: u32,

    pub final_answer: Option<String>,
    pub visualization: Option<serde_json::Value>,
    pub follow_up_questions: Option<Vec<String>>,
    pub needs_clarification: bool,
}

impl ConversationState {
    pub fn new(
        conversation_id: impl Into<String>,
        question: impl Into<String>,
        history: Vec<HistoryMessage>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            question: question.into(),
            history,
            ..Self::default()
        }
    }

    /// The last `n` history messages.
    pub fn history_window(&self, n: usize) -> &[HistoryMessage] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Record an execution failure, dropping the oldest entries past the cap.
    pub fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error_history.push(ErrorRecord {
            kind,
            message: message.into(),
        });
        if self.error_history.len() > MAX_ERROR_HISTORY {
            let excess = self.error_history.len() - MAX_ERROR_HISTORY;
            self.error_history.drain(..excess);
        }
    }

    /// Rows of the last successful execution, empty when there are none.
    pub fn rows(&self) -> &[Row] {
        self.query_result.as_deref().unwrap_or(&[])
    }

    /// Query result as prompt text.
    pub fn query_result_text(&self) -> String {
        match &self.query_result {
            Some(rows) => serde_json::to_string(rows).unwrap_or_default(),
            None => String::new(),
        }
    }
}
