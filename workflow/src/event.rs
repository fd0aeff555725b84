//! Events emitted by a streaming workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::machine::Node;
use crate::state::{ConversationState, ErrorRecord};

/// Payload of a `final_answer` event. Absent outputs are omitted.
#[derive(Serialize)]
struct FinalAnswerData<'a> {
    final_answer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql_query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visualization_data: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    follow_up_questions: Option<&'a [String]>,
    error_history: &'a [ErrorRecord],
    retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    NodeUpdate,
    FinalAnswer,
    Error,
}

/// One event of a streamed run.
///
/// A run yields one `node_update` per completed node followed by exactly one
/// `final_answer` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

impl StreamEvent {
    pub fn node_update(conversation_id: &str, node: Node) -> Self {
        Self {
            event_type: StreamEventType::NodeUpdate,
            data: json!({
                "node": node.name(),
                "message": node.progress_message(),
            }),
            timestamp: Utc::now(),
            conversation_id: conversation_id.to_string(),
            node_name: Some(node.name().to_string()),
        }
    }

    pub fn final_answer(state: &ConversationState) -> Self {
        Self {
            event_type: StreamEventType::FinalAnswer,
            data: serde_json::to_value(FinalAnswerData {
                final_answer: state.final_answer.as_deref().unwrap_or_default(),
                sql_query: state.sql_query.as_deref(),
                visualization_data: state.visualization.as_ref(),
                follow_up_questions: state.follow_up_questions.as_deref(),
                error_history: &state.error_history,
                retry_count: state.retry_count,
            })
            .unwrap_or_default(),
            timestamp: Utc::now(),
            conversation_id: state.conversation_id.clone(),
            node_name: None,
        }
    }

    pub fn error(conversation_id: &str, message: impl Into<String>) -> Self {
        Self {
            event_type: StreamEventType::Error,
            data: json!({ "error": message.into() }),
            timestamp: Utc::now(),
            conversation_id: conversation_id.to_string(),
            node_name: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.event_type, StreamEventType::NodeUpdate)
    }

    /// Server-sent-events frame for this event.
    pub fn to_sse(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("data: {payload}\n\n")
    }
}
