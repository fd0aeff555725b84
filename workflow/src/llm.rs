//! Language model capability used by the generation steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::LlmError;
use crate::prompts;

/// Which step a generation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStep {
    Intent,
    Greeting,
    TextToSql,
    Repair,
    Summarize,
    Visualize,
    FollowUps,
}

impl GenerationStep {
    pub fn name(&self) -> &'static str {
        match self {
            GenerationStep::Intent => "intent",
            GenerationStep::Greeting => "greeting",
            GenerationStep::TextToSql => "text_to_sql",
            GenerationStep::Repair => "repair",
            GenerationStep::Summarize => "summarize",
            GenerationStep::Visualize => "visualize",
            GenerationStep::FollowUps => "follow_ups",
        }
    }
}

/// A step plus its named inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub step: GenerationStep,
    pub inputs: Map<String, Value>,
}

impl GenerationRequest {
    pub fn new(step: GenerationStep) -> Self {
        Self {
            step,
            inputs: Map::new(),
        }
    }

    /// Add a named input.
    pub fn with_input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.to_string(), value.into());
        self
    }

    /// Add a named input from any serializable value.
    pub fn with_json<T: Serialize>(self, key: &str, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.with_input(key, value)
    }

    /// Input as text, empty when absent.
    pub fn input_text(&self, key: &str) -> String {
        match self.inputs.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Prompt text for this request.
    pub fn render(&self) -> String {
        prompts::render(self.step, &self.inputs)
    }
}

/// Turns a generation request into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError>;
}

/// OpenAI-compatible `/chat/completions` backend.
pub struct OpenAiChatModel {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatModel {
    /// Create a model reading `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for OpenAiChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;

        debug!("Generating {} with {}", request.step.name(), self.model);

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": request.render()}],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiRequest(format!("API error: {error_text}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("no message content in response".to_string()))
    }
}
