//! Conversation session log.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::state::{HistoryMessage, Role};

/// Default retention for a conversation after its last message.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Set on assistant messages that carry generated SQL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            sql_query: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            sql_query: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql_query = Some(sql.into());
        self
    }
}

impl From<SessionMessage> for HistoryMessage {
    fn from(message: SessionMessage) -> Self {
        HistoryMessage {
            role: message.role,
            content: message.content,
        }
    }
}

/// Append-only message log keyed by conversation id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, conversation_id: &str, message: SessionMessage) -> Result<()>;

    /// The most recent `limit` messages, oldest first.
    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<SessionMessage>>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;

    async fn len(&self, conversation_id: &str) -> Result<usize>;
}

#[derive(Debug)]
struct Conversation {
    messages: Vec<SessionMessage>,
    expires_at: DateTime<Utc>,
}

/// Session store held in process memory.
///
/// A conversation expires once its retention window passes without a new
/// message; every append pushes the window forward.
#[derive(Debug)]
pub struct InMemorySessionStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    retention: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_retention(Duration::hours(DEFAULT_RETENTION_HOURS))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            retention,
        }
    }

    async fn live_messages(&self, conversation_id: &str) -> Vec<SessionMessage> {
        let mut conversations = self.conversations.write().await;
        let expired = match conversations.get(conversation_id) {
            Some(conversation) => conversation.expires_at <= Utc::now(),
            None => return Vec::new(),
        };

        if expired {
            debug!("Conversation {conversation_id} expired");
            conversations.remove(conversation_id);
            return Vec::new();
        }

        conversations
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, conversation_id: &str, message: SessionMessage) -> Result<()> {
        let now = Utc::now();
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation {
                messages: Vec::new(),
                expires_at: now,
            });

        if conversation.expires_at <= now {
            conversation.messages.clear();
        }
        conversation.messages.push(message);
        conversation.expires_at = now + self.retention;
        Ok(())
    }

    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<SessionMessage>> {
        let messages = self.live_messages(conversation_id).await;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }

    async fn len(&self, conversation_id: &str) -> Result<usize> {
        Ok(self.live_messages(conversation_id).await.len())
    }
}
