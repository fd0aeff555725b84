//! Process configuration: an optional TOML file plus environment overrides.

use std::path::Path;

use anyhow::{Context, Result};
use datachat_retrieval::RetrievalConfig;
use datachat_workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};

/// Everything the binary needs to wire the crates together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retrieval: RetrievalConfig,
    pub workflow: WorkflowConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
}

/// Dense embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            base_url: None,
        }
    }
}

/// Chat model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string.
    pub url: Option<String>,
}

impl AppConfig {
    /// Read the file if one is given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay secrets and endpoints from the environment.
    ///
    /// `lookup` returns the value of a variable, or `None` when unset.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATACHAT_QDRANT_URL") {
            self.retrieval.qdrant.url = url;
        }
        if let Some(key) = lookup("DATACHAT_QDRANT_API_KEY") {
            self.retrieval.qdrant.api_key = Some(key);
        }
        if let Some(collection) = lookup("DATACHAT_COLLECTION") {
            self.retrieval.collection_name = collection;
        }
        if let Some(model) = lookup("DATACHAT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
    }
}
