//! Workflow nodes and the transition function between them.
//!
//! ```text
//! IntentClassify ──► Greeting ─────────────────────────────► End
//!        │     └───► Help ─────────────────────────────────► End
//!        ▼
//!    Retrieve ──► GenerateSql ──► Execute ──► Summarize ──► Visualize ──► FollowUps ──► End
//!                                  ▲   │
//!                                  │   ▼
//!                                 Repair ──► NoAnswer ──► End
//! ```

use serde::Serialize;

use crate::state::{ConversationState, Intent, MAX_REPAIR_ATTEMPTS};

/// A step of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    IntentClassify,
    Greeting,
    Help,
    Retrieve,
    GenerateSql,
    Execute,
    Repair,
    Summarize,
    Visualize,
    FollowUps,
    NoAnswer,
    End,
}

impl Node {
    /// Stable name used in logs and stream events.
    pub fn name(&self) -> &'static str {
        match self {
            Node::IntentClassify => "intent_classification",
            Node::Greeting => "greeting",
            Node::Help => "help",
            Node::Retrieve => "retrieve",
            Node::GenerateSql => "text_to_sql",
            Node::Execute => "execute_sql",
            Node::Repair => "repair",
            Node::Summarize => "summarizer",
            Node::Visualize => "visualization",
            Node::FollowUps => "follow_up_questions",
            Node::NoAnswer => "no_answer",
            Node::End => "end",
        }
    }

    /// Progress text shown to the user once the node has run.
    pub fn progress_message(&self) -> &'static str {
        match self {
            Node::IntentClassify => "Understanding what you need...",
            Node::Greeting => "Saying hello...",
            Node::Help => "Gathering helpful information...",
            Node::Retrieve => "Finding the most relevant information for you...",
            Node::GenerateSql => "Figuring out the best way to answer your question...",
            Node::Execute => "Processing your request...",
            Node::Repair => "Fixing the query and trying again...",
            Node::Summarize => "Summarizing the key points...",
            Node::Visualize => "Creating a visual overview...",
            Node::FollowUps => "Thinking of helpful next steps...",
            Node::NoAnswer => "Sorry, I couldn't find a clear answer this time.",
            Node::End => "Done.",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::End)
    }

    /// The node to run after this one, given the state it produced.
    pub fn next(self, state: &ConversationState) -> Node {
        match self {
            Node::IntentClassify => match state.intent {
                Some(Intent::General) => Node::Greeting,
                Some(Intent::Help) => Node::Help,
                Some(Intent::DataQuery) | None => Node::Retrieve,
            },
            Node::Retrieve => Node::GenerateSql,
            Node::GenerateSql => Node::Execute,
            Node::Execute => {
                if !state.has_sql_error {
                    Node::Summarize
                } else if state.retry_count < MAX_REPAIR_ATTEMPTS {
                    Node::Repair
                } else {
                    Node::NoAnswer
                }
            }
            // The repair step has already counted itself.
            Node::Repair => {
                if state.retry_count < MAX_REPAIR_ATTEMPTS {
                    Node::Execute
                } else {
                    Node::NoAnswer
                }
            }
            Node::Summarize => Node::Visualize,
            Node::Visualize => Node::FollowUps,
            Node::FollowUps | Node::Greeting | Node::Help | Node::NoAnswer | Node::End => {
                Node::End
            }
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
