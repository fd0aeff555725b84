//! # Conversation Workflow
//!
//! Turns a natural-language question into an answer by routing on intent,
//! retrieving table metadata, generating SQL and repairing it when execution
//! fails.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Workflow                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │   Language   │  │    Table     │  │     SQL      │          │
//! │  │    Model     │  │  Retriever   │  │   Executor   │          │
//! │  └──────────────┘  └──────────────┘  └──────────────┘          │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           ▼                                     │
//! │        Node::next(state) ─► run node ─► StreamEvent             │
//! │                           │                                     │
//! │                           ▼                                     │
//! │                    Session Store                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use datachat_workflow::{InMemorySessionStore, OpenAiChatModel, Workflow};
//!
//! let workflow = Workflow::new(llm, retriever, executor, Arc::new(InMemorySessionStore::new()));
//! let mut events = std::pin::pin!(workflow.run_stream("revenue by region", "conv-1"));
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod llm;
pub mod machine;
pub mod output;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod prompts;
pub mod retriever;
pub mod session;
pub mod state;
pub mod workflow;

pub use config::WorkflowConfig;
pub use error::{LlmError, Result, WorkflowError};
pub use event::{StreamEvent, StreamEventType};
pub use executor::{ErrorKind, ExecutionFailure, Row, SqlExecutor};
pub use llm::{GenerationRequest, GenerationStep, LanguageModel, OpenAiChatModel};
pub use machine::Node;
pub use output::{parse_follow_ups, parse_json_or, strip_code_fence};
#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;
pub use prompts::{HELP_TEXT, NO_ANSWER_TEXT};
pub use retriever::TableRetriever;
pub use session::{InMemorySessionStore, SessionMessage, SessionStore};
pub use state::{
    ConversationState, ErrorRecord, HistoryMessage, Intent, MAX_ERROR_HISTORY,
    MAX_REPAIR_ATTEMPTS, Role,
};
pub use workflow::Workflow;
