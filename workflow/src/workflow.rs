//! Workflow driver: runs nodes until the machine reaches `End`.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde_json::{Value, json};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::WorkflowConfig;
use crate::error::Result;
use crate::event::StreamEvent;
use crate::executor::{ExecutionFailure, SqlExecutor};
use crate::llm::{GenerationRequest, GenerationStep, LanguageModel};
use crate::machine::Node;
use crate::output::{parse_follow_ups, parse_json_or, strip_code_fence};
use crate::prompts::{HELP_TEXT, NO_ANSWER_TEXT};
use crate::retriever::TableRetriever;
use crate::session::{SessionMessage, SessionStore};
use crate::state::{ConversationState, HistoryMessage, Intent};

/// Answers questions by driving the node machine over injected collaborators.
pub struct Workflow {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn TableRetriever>,
    executor: Arc<dyn SqlExecutor>,
    sessions: Arc<dyn SessionStore>,
    config: WorkflowConfig,
}

impl Workflow {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn TableRetriever>,
        executor: Arc<dyn SqlExecutor>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            llm,
            retriever,
            executor,
            sessions,
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run to completion and return the final state.
    pub async fn run(&self, question: &str, conversation_id: &str) -> Result<ConversationState> {
        let mut state = self.prepare(question, conversation_id).await;
        let mut node = Node::IntentClassify;

        while !node.is_terminal() {
            self.run_node(node, &mut state).await?;
            node = node.next(&state);
        }

        info!(
            "Conversation {} finished with {} repairs",
            state.conversation_id, state.retry_count
        );
        Ok(state)
    }

    /// Run while yielding one event per completed node, then one
    /// `final_answer` or `error` event.
    ///
    /// Nothing runs until the stream is polled, and dropping the stream
    /// stops the run before its next node.
    pub fn run_stream<'a>(
        &'a self,
        question: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> impl Stream<Item = StreamEvent> + Send + 'a {
        let question = question.into();
        let conversation_id = conversation_id.into();

        stream! {
            let mut state = self.prepare(&question, &conversation_id).await;

            let mut node = Node::IntentClassify;
            while !node.is_terminal() {
                if let Err(e) = self.run_node(node, &mut state).await {
                    warn!("Node {node} failed: {e}");
                    yield StreamEvent::error(&conversation_id, e.to_string());
                    return;
                }
                yield StreamEvent::node_update(&conversation_id, node);
                node = node.next(&state);
            }

            yield StreamEvent::final_answer(&state);
        }
    }

    /// Load recent history and log the new question.
    ///
    /// The session log is best effort: a store failure costs history, not
    /// the run.
    async fn prepare(&self, question: &str, conversation_id: &str) -> ConversationState {
        let history: Vec<HistoryMessage> = match self
            .sessions
            .recent(conversation_id, self.config.session_history_limit)
            .await
        {
            Ok(messages) => messages.into_iter().map(HistoryMessage::from).collect(),
            Err(e) => {
                warn!("Failed to load history for {conversation_id}: {e}");
                Vec::new()
            }
        };

        if let Err(e) = self
            .sessions
            .append(conversation_id, SessionMessage::user(question))
            .await
        {
            warn!("Failed to log question: {e}");
        }

        debug!(
            "Starting conversation {conversation_id} with {} history messages",
            history.len()
        );

        ConversationState::new(conversation_id, question, history)
    }

    async fn run_node(&self, node: Node, state: &mut ConversationState) -> Result<()> {
        let span = info_span!("node", name = node.name(), retry = state.retry_count);
        async {
            match node {
                Node::IntentClassify => self.classify_intent(state).await,
                Node::Greeting => self.greet(state).await,
                Node::Help => {
                    state.final_answer = Some(HELP_TEXT.to_string());
                    Ok(())
                }
                Node::Retrieve => {
                    self.retrieve(state).await;
                    Ok(())
                }
                Node::GenerateSql => self.generate_sql(state).await,
                Node::Execute => {
                    self.execute(state).await;
                    Ok(())
                }
                Node::Repair => self.repair(state).await,
                Node::Summarize => {
                    self.summarize(state).await;
                    Ok(())
                }
                Node::Visualize => {
                    self.visualize(state).await;
                    Ok(())
                }
                Node::FollowUps => {
                    self.follow_ups(state).await;
                    Ok(())
                }
                Node::NoAnswer => {
                    state.final_answer = Some(NO_ANSWER_TEXT.to_string());
                    Ok(())
                }
                Node::End => Ok(()),
            }
        }
        .instrument(span)
        .await
    }

    async fn classify_intent(&self, state: &mut ConversationState) -> Result<()> {
        let request = GenerationRequest::new(GenerationStep::Intent)
            .with_input("question", state.question.as_str())
            .with_json("history", &state.history_window(self.config.history_window));

        let label = self.llm.generate(request).await?;
        let intent = Intent::parse(&label);
        debug!("Classified {label:?} as {intent:?}");
        state.intent = Some(intent);
        Ok(())
    }

    async fn greet(&self, state: &mut ConversationState) -> Result<()> {
        let request = GenerationRequest::new(GenerationStep::Greeting)
            .with_input("question", state.question.as_str());
        let answer = self.llm.generate(request).await?;
        state.final_answer = Some(answer.trim().to_string());
        Ok(())
    }

    async fn retrieve(&self, state: &mut ConversationState) {
        match self
            .retriever
            .retrieve(&state.question, self.config.retrieval_top_k)
            .await
        {
            Ok(context) => {
                debug!("Retrieved tables: {:?}", context.selected);
                state.semantic_context = context;
            }
            Err(e) => {
                warn!("Retrieval failed, continuing without table context: {e}");
                state.semantic_context = Default::default();
            }
        }
    }

    async fn generate_sql(&self, state: &mut ConversationState) -> Result<()> {
        let request = GenerationRequest::new(GenerationStep::TextToSql)
            .with_input("question", state.question.as_str())
            .with_input("semantic_info", state.semantic_context.to_prompt_json())
            .with_json("selected_tables", &state.semantic_context.selected)
            .with_json("history", &state.history_window(self.config.history_window));

        let text = self.llm.generate(request).await?;
        let sql = strip_code_fence(&text).to_string();
        debug!("Generated SQL: {sql}");

        state.history = vec![
            HistoryMessage::user(state.question.clone()),
            HistoryMessage::assistant(sql.clone()),
        ];

        if !sql.is_empty() {
            let message = SessionMessage::assistant(sql.clone()).with_sql(sql.clone());
            if let Err(e) = self.sessions.append(&state.conversation_id, message).await {
                warn!("Failed to log generated SQL: {e}");
            }
        }

        state.sql_query = Some(sql);
        Ok(())
    }

    async fn execute(&self, state: &mut ConversationState) {
        let outcome = match state.sql_query.as_deref().map(str::trim) {
            Some(sql) if !sql.is_empty() => self.executor.execute(sql).await,
            _ => Err(ExecutionFailure::validity("no SQL query was generated")),
        };

        match outcome {
            Ok(rows) => {
                debug!("Execution returned {} rows", rows.len());
                state.query_result = Some(rows);
                state.has_sql_error = false;
                state.error_message = None;
                state.needs_clarification = false;
            }
            Err(failure) => {
                warn!(
                    "Execution failed (attempt {}): {failure}",
                    state.retry_count + 1
                );
                state.has_sql_error = true;
                state.needs_clarification = true;
                state.error_message = Some(failure.message.clone());
                state.record_error(failure.kind, failure.message);
            }
        }
    }

    async fn repair(&self, state: &mut ConversationState) -> Result<()> {
        state.retry_count += 1;

        let request = GenerationRequest::new(GenerationStep::Repair)
            .with_input("question", state.question.as_str())
            .with_input("sql_query", state.sql_query.clone().unwrap_or_default())
            .with_input("error_message", state.error_message.clone().unwrap_or_default())
            .with_input("semantic_info", state.semantic_context.to_prompt_json())
            .with_json("previous_errors", &state.error_history);

        let text = self.llm.generate(request).await?;
        let sql = strip_code_fence(&text).to_string();
        info!("Repair {} produced new SQL", state.retry_count);

        state.sql_query = Some(sql);
        state.has_sql_error = false;
        Ok(())
    }

    async fn summarize(&self, state: &mut ConversationState) {
        let request = GenerationRequest::new(GenerationStep::Summarize)
            .with_input("question", state.question.as_str())
            .with_json("history", &state.history_window(self.config.summary_window))
            .with_input("query_result", state.query_result_text());

        let answer = match self.llm.generate(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => placeholder_summary(state.rows().len()),
            Err(e) => {
                warn!("Summary generation failed: {e}");
                placeholder_summary(state.rows().len())
            }
        };

        state.history.clear();
        if let Err(e) = self
            .sessions
            .append(&state.conversation_id, SessionMessage::assistant(answer.clone()))
            .await
        {
            warn!("Failed to log answer: {e}");
        }
        state.final_answer = Some(answer);
    }

    async fn visualize(&self, state: &mut ConversationState) {
        if state.rows().is_empty() {
            state.visualization = Some(json!({"title": {"text": "No data to visualize"}}));
            return;
        }

        let request = GenerationRequest::new(GenerationStep::Visualize)
            .with_input("question", state.question.as_str())
            .with_input("sql_query", state.sql_query.clone().unwrap_or_default())
            .with_input("query_result", state.query_result_text())
            .with_json("history", &state.history_window(self.config.summary_window));

        let chart = match self.llm.generate(request).await {
            Ok(text) => match parse_json_or(&text, json!({})) {
                Value::Null => json!({}),
                value => value,
            },
            Err(e) => {
                warn!("Visualization generation failed: {e}");
                json!({})
            }
        };
        state.visualization = Some(chart);
    }

    async fn follow_ups(&self, state: &mut ConversationState) {
        let request = GenerationRequest::new(GenerationStep::FollowUps)
            .with_input("question", state.question.as_str())
            .with_json("history", &state.history)
            .with_input("semantic_info", state.semantic_context.to_prompt_json())
            .with_input("query_result", state.query_result_text());

        let questions = match self.llm.generate(request).await {
            Ok(text) => parse_follow_ups(&text).unwrap_or_else(|| {
                warn!("Follow-up questions were not valid JSON");
                Vec::new()
            }),
            Err(e) => {
                warn!("Follow-up generation failed: {e}");
                Vec::new()
            }
        };
        state.follow_up_questions = Some(questions);
    }
}

fn placeholder_summary(rows: usize) -> String {
    format!("The query returned {rows} row(s).")
}
