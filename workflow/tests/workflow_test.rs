//! End-to-end scenarios for the conversation workflow.
//!
//! Every collaborator is a scripted fake, so these tests pin down routing,
//! retry bookkeeping, and the event stream without any network access.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use datachat_retrieval::{RetrievalError, SemanticContext, TableDescriptor};
use datachat_workflow::Result as WorkflowResult;
use datachat_workflow::{
    ConversationState, ErrorKind, ExecutionFailure, GenerationRequest, GenerationStep,
    InMemorySessionStore, LanguageModel, LlmError, NO_ANSWER_TEXT, Role, Row,
    SessionMessage, SessionStore, SqlExecutor, StreamEvent, StreamEventType, TableRetriever,
    Workflow, WorkflowError,
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<HashMap<GenerationStep, VecDeque<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    fn respond(self, step: GenerationStep, text: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(text.to_string());
        self
    }

    fn requests_for(&self, step: GenerationStep) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.step == step)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let step = request.step;
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .get_mut(&step)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| LlmError::ApiRequest(format!("no scripted response for {step:?}")))
    }
}

struct FakeRetriever {
    context: Option<SemanticContext>,
}

impl FakeRetriever {
    fn with_orders() -> Self {
        let descriptor = TableDescriptor::new("sales", "orders", "Customer orders");
        let mut context = SemanticContext::default();
        context
            .tables
            .insert("orders".to_string(), descriptor);
        context.selected.push("orders".to_string());
        context.all_tables.insert("orders".to_string());
        Self {
            context: Some(context),
        }
    }

    fn broken() -> Self {
        Self { context: None }
    }
}

#[async_trait]
impl TableRetriever for FakeRetriever {
    async fn retrieve(
        &self,
        _question: &str,
        _top_k: usize,
    ) -> Result<SemanticContext, RetrievalError> {
        self.context
            .clone()
            .ok_or_else(|| RetrievalError::Index("qdrant unreachable".to_string()))
    }
}

#[derive(Default)]
struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<Vec<Row>, ExecutionFailure>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn then(self, outcome: Result<Vec<Row>, ExecutionFailure>) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionFailure> {
        self.calls.lock().unwrap().push(sql.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionFailure::unexpected("no scripted outcome")))
    }
}

fn total_row(total: i64) -> Row {
    let mut row = Row::new();
    row.insert("total".to_string(), json!(total));
    row
}

/// Session store whose reads succeed and whose writes always fail.
struct ReadOnlyStore;

#[async_trait]
impl SessionStore for ReadOnlyStore {
    async fn append(&self, _conversation_id: &str, _message: SessionMessage) -> WorkflowResult<()> {
        Err(WorkflowError::Session("store write timed out".to_string()))
    }

    async fn recent(&self, _conversation_id: &str, _limit: usize) -> WorkflowResult<Vec<SessionMessage>> {
        Ok(Vec::new())
    }

    async fn clear(&self, _conversation_id: &str) -> WorkflowResult<()> {
        Ok(())
    }

    async fn len(&self, _conversation_id: &str) -> WorkflowResult<usize> {
        Ok(0)
    }
}

struct Harness {
    model: Arc<ScriptedModel>,
    executor: Arc<ScriptedExecutor>,
    sessions: Arc<InMemorySessionStore>,
    workflow: Workflow,
}

fn harness(model: ScriptedModel, retriever: FakeRetriever, executor: ScriptedExecutor) -> Harness {
    let model = Arc::new(model);
    let executor = Arc::new(executor);
    let sessions = Arc::new(InMemorySessionStore::new());
    let workflow = Workflow::new(
        model.clone(),
        Arc::new(retriever),
        executor.clone(),
        sessions.clone(),
    );
    Harness {
        model,
        executor,
        sessions,
        workflow,
    }
}

fn data_model() -> ScriptedModel {
    ScriptedModel::default().respond(GenerationStep::Intent, "system_query")
}

fn node_names(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.node_name.clone())
        .collect()
}

#[tokio::test]
async fn test_greeting_answers_without_sql() {
    let h = harness(
        ScriptedModel::default()
            .respond(GenerationStep::Intent, "general")
            .respond(GenerationStep::Greeting, "Hello! Ask me about your data."),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default(),
    );

    let events: Vec<StreamEvent> = h.workflow.run_stream("hi", "c1").collect().await;

    assert_eq!(node_names(&events), vec!["intent_classification", "greeting"]);
    let last = events.last().unwrap();
    assert_eq!(last.event_type, StreamEventType::FinalAnswer);
    assert_eq!(last.data["final_answer"], "Hello! Ask me about your data.");
    assert!(last.data.get("sql_query").is_none());
    assert!(last.data.get("visualization_data").is_none());
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn test_help_returns_fixed_text() {
    let h = harness(
        ScriptedModel::default().respond(GenerationStep::Intent, "help"),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default(),
    );

    let state = h.workflow.run("what can you do?", "c1").await.unwrap();

    assert_eq!(state.final_answer.as_deref(), Some(datachat_workflow::HELP_TEXT));
    assert!(h.model.requests_for(GenerationStep::Greeting).is_empty());
}

#[tokio::test]
async fn test_single_validity_repair() {
    let h = harness(
        data_model()
            .respond(GenerationStep::TextToSql, "```sql\nSELECT totl FROM orders\n```")
            .respond(GenerationStep::Repair, "SELECT total FROM orders")
            .respond(GenerationStep::Summarize, "The total is 42.")
            .respond(
                GenerationStep::Visualize,
                r#"{"title": {"text": "Total"}, "series": [{"type": "bar", "data": [42]}]}"#,
            )
            .respond(
                GenerationStep::FollowUps,
                r#"{"follow_up_questions": ["By month?", "By region?", "Top customers?"]}"#,
            ),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default()
            .then(Err(ExecutionFailure::validity(
                "column \"totl\" does not exist",
            )))
            .then(Ok(vec![total_row(42)])),
    );

    let state = h.workflow.run("what is the order total?", "c1").await.unwrap();

    assert_eq!(
        h.executor.calls(),
        vec!["SELECT totl FROM orders", "SELECT total FROM orders"]
    );
    assert_eq!(state.retry_count, 1);
    assert_eq!(state.error_history.len(), 1);
    assert_eq!(state.error_history[0].kind, ErrorKind::Validity);
    assert!(!state.has_sql_error);
    assert_eq!(state.final_answer.as_deref(), Some("The total is 42."));
    assert_eq!(state.visualization.as_ref().unwrap()["title"]["text"], "Total");
    assert_eq!(state.follow_up_questions.as_ref().unwrap().len(), 3);

    let repair = &h.model.requests_for(GenerationStep::Repair)[0];
    assert_eq!(repair.input_text("sql_query"), "SELECT totl FROM orders");
    assert_eq!(
        repair.input_text("error_message"),
        "column \"totl\" does not exist"
    );
    assert!(repair.input_text("previous_errors").contains("validity"));
    assert!(repair.input_text("semantic_info").contains("orders"));

    // Question, generated SQL, and the answer are logged.
    let log = h.sessions.recent("c1", 10).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[1].sql_query.as_deref(), Some("SELECT totl FROM orders"));
    assert_eq!(log[2].content, "The total is 42.");
}

#[tokio::test]
async fn test_three_failures_end_in_no_answer() {
    let h = harness(
        data_model()
            .respond(GenerationStep::TextToSql, "SELECT a FROM orders")
            .respond(GenerationStep::Repair, "SELECT b FROM orders")
            .respond(GenerationStep::Repair, "SELECT c FROM orders")
            .respond(GenerationStep::Repair, "SELECT d FROM orders"),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default()
            .then(Err(ExecutionFailure::validity("bad a")))
            .then(Err(ExecutionFailure::connectivity("connection reset")))
            .then(Err(ExecutionFailure::validity("bad c"))),
    );

    let events: Vec<StreamEvent> = h
        .workflow
        .run_stream("show me something impossible", "c1")
        .collect()
        .await;

    assert_eq!(
        node_names(&events),
        vec![
            "intent_classification",
            "retrieve",
            "text_to_sql",
            "execute_sql",
            "repair",
            "execute_sql",
            "repair",
            "execute_sql",
            "repair",
            "no_answer",
        ]
    );

    let last = events.last().unwrap();
    assert_eq!(last.event_type, StreamEventType::FinalAnswer);
    assert_eq!(last.data["final_answer"], NO_ANSWER_TEXT);
    assert_eq!(last.data["retry_count"], 3);
    assert_eq!(last.data["error_history"].as_array().unwrap().len(), 3);
    assert_eq!(last.data["error_history"][1]["kind"], "connectivity");
    assert_eq!(h.executor.calls().len(), 3);
    assert!(h.model.requests_for(GenerationStep::Summarize).is_empty());
}

#[tokio::test]
async fn test_empty_result_is_well_formed() {
    let h = harness(
        data_model()
            .respond(GenerationStep::TextToSql, "SELECT * FROM orders WHERE false")
            .respond(GenerationStep::FollowUps, r#"["Try last year?"]"#),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default().then(Ok(Vec::new())),
    );

    let state = h.workflow.run("orders from the future", "c1").await.unwrap();

    // Summary generation is unscripted, so the placeholder is used.
    assert_eq!(
        state.final_answer.as_deref(),
        Some("The query returned 0 row(s).")
    );
    assert_eq!(
        state.visualization,
        Some(json!({"title": {"text": "No data to visualize"}}))
    );
    assert!(h.model.requests_for(GenerationStep::Visualize).is_empty());
    assert_eq!(
        state.follow_up_questions,
        Some(vec!["Try last year?".to_string()])
    );
    assert_eq!(state.retry_count, 0);
}

#[tokio::test]
async fn test_retrieval_failure_degrades_to_empty_context() {
    let h = harness(
        data_model()
            .respond(GenerationStep::TextToSql, "SELECT 1")
            .respond(GenerationStep::Summarize, "One.")
            .respond(GenerationStep::Visualize, "{}")
            .respond(GenerationStep::FollowUps, "[]"),
        FakeRetriever::broken(),
        ScriptedExecutor::default().then(Ok(vec![total_row(1)])),
    );

    let state = h.workflow.run("how many?", "c1").await.unwrap();

    assert!(state.semantic_context.is_empty());
    let generate = &h.model.requests_for(GenerationStep::TextToSql)[0];
    assert_eq!(generate.inputs["semantic_info"], json!({}));
    assert_eq!(generate.inputs["selected_tables"], json!([]));
    assert_eq!(state.final_answer.as_deref(), Some("One."));
}

#[tokio::test]
async fn test_stream_orders_nodes_then_one_final_event() {
    let h = harness(
        data_model()
            .respond(GenerationStep::TextToSql, "SELECT total FROM orders")
            .respond(GenerationStep::Summarize, "42.")
            .respond(GenerationStep::Visualize, "```json\n{\"title\": {\"text\": \"T\"}}\n```")
            .respond(GenerationStep::FollowUps, r#"{"follow_up_questions": []}"#),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default().then(Ok(vec![total_row(42)])),
    );

    let events: Vec<StreamEvent> = h.workflow.run_stream("total?", "c9").collect().await;

    assert_eq!(
        node_names(&events),
        vec![
            "intent_classification",
            "retrieve",
            "text_to_sql",
            "execute_sql",
            "summarizer",
            "visualization",
            "follow_up_questions",
        ]
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());
    assert!(events.iter().all(|e| e.conversation_id == "c9"));

    let last = events.last().unwrap();
    assert_eq!(last.data["visualization_data"]["title"]["text"], "T");
    assert_eq!(last.data["sql_query"], "SELECT total FROM orders");
}

#[tokio::test]
async fn test_follow_up_parse_failure_gives_empty_list() {
    let h = harness(
        data_model()
            .respond(GenerationStep::TextToSql, "SELECT total FROM orders")
            .respond(GenerationStep::Summarize, "42.")
            .respond(GenerationStep::Visualize, "a bar chart would be nice")
            .respond(GenerationStep::FollowUps, "1. By month? 2. By region?"),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default().then(Ok(vec![total_row(42)])),
    );

    let state = h.workflow.run("total?", "c1").await.unwrap();

    assert_eq!(state.follow_up_questions, Some(Vec::new()));
    assert_eq!(state.visualization, Some(json!({})));
}

#[tokio::test]
async fn test_intent_failure_ends_stream_with_error() {
    let h = harness(
        ScriptedModel::default(),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default(),
    );

    let events: Vec<StreamEvent> = h.workflow.run_stream("hello?", "c1").collect().await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, StreamEventType::Error);
    assert!(
        events[0].data["error"]
            .as_str()
            .unwrap()
            .contains("no scripted response")
    );
    assert!(h.workflow.run("hello?", "c1").await.is_err());
}

#[tokio::test]
async fn test_history_is_loaded_from_session_log() {
    let h = harness(
        ScriptedModel::default()
            .respond(GenerationStep::Intent, "general")
            .respond(GenerationStep::Greeting, "Hi!")
            .respond(GenerationStep::Intent, "general")
            .respond(GenerationStep::Greeting, "Hi again!"),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default(),
    );

    h.workflow.run("hello", "c1").await.unwrap();
    let second: ConversationState = h.workflow.run("hello again", "c1").await.unwrap();

    // Greetings are not logged as answers; only the user turn is.
    assert_eq!(second.history.len(), 1);
    assert_eq!(second.history[0].content, "hello");

    let intents = h.model.requests_for(GenerationStep::Intent);
    assert_eq!(intents[0].inputs["history"], json!([]));
    assert_eq!(intents[1].inputs["history"][0]["content"], "hello");
    assert_eq!(h.sessions.len("c1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_session_write_failure_keeps_the_answer() {
    let workflow = Workflow::new(
        Arc::new(
            data_model()
                .respond(GenerationStep::TextToSql, "SELECT total FROM orders")
                .respond(GenerationStep::Summarize, "The answer is 1.")
                .respond(GenerationStep::Visualize, "{}")
                .respond(GenerationStep::FollowUps, "[]"),
        ),
        Arc::new(FakeRetriever::with_orders()),
        Arc::new(ScriptedExecutor::default().then(Ok(vec![total_row(1)]))),
        Arc::new(ReadOnlyStore),
    );

    let events: Vec<StreamEvent> = workflow.run_stream("total?", "c1").collect().await;

    assert_eq!(
        node_names(&events),
        vec![
            "intent_classification",
            "retrieve",
            "text_to_sql",
            "execute_sql",
            "summarizer",
            "visualization",
            "follow_up_questions",
        ]
    );
    let last = events.last().unwrap();
    assert_eq!(last.event_type, StreamEventType::FinalAnswer);
    assert_eq!(last.data["final_answer"], "The answer is 1.");
    assert_eq!(last.data["sql_query"], "SELECT total FROM orders");
}

#[tokio::test]
async fn test_dropping_stream_stops_the_run() {
    let h = harness(
        data_model().respond(GenerationStep::TextToSql, "SELECT 1"),
        FakeRetriever::with_orders(),
        ScriptedExecutor::default().then(Ok(Vec::new())),
    );

    {
        let stream = h.workflow.run_stream("count?", "c1");
        let mut stream = std::pin::pin!(stream);
        let first = stream.next().await.unwrap();
        assert_eq!(first.node_name.as_deref(), Some("intent_classification"));
    }

    assert!(h.model.requests_for(GenerationStep::TextToSql).is_empty());
    assert!(h.executor.calls().is_empty());
}
