//! Organising search hits into the context handed to query generation.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::descriptor::TableDescriptor;
use crate::engine::SearchHit;

/// Tables relevant to a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticContext {
    /// Table name to descriptor, in relevance order.
    pub tables: IndexMap<String, TableDescriptor>,

    /// Table names in relevance order.
    pub selected: Vec<String>,

    /// Every table name seen in the hits, including those cut by `top_k`.
    pub all_tables: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<RetrievalTimings>,
}

impl SemanticContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Descriptors as a JSON object for prompt rendering.
    pub fn to_prompt_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.tables).unwrap_or_default()
    }
}

/// Wall-clock cost of one retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTimings {
    pub search_ms: u64,
    pub organize_ms: u64,
    pub total_ms: u64,
    pub reranking_applied: bool,
    pub reranked_hits: usize,
}

/// Build a [`SemanticContext`] from ranked hits.
///
/// The first `top_k` hits populate `tables` and `selected`; the first
/// occurrence of a name wins. Hits without a table name are skipped.
pub fn organize(hits: &[SearchHit], top_k: usize) -> SemanticContext {
    let mut context = SemanticContext::default();

    for (position, hit) in hits.iter().enumerate() {
        let name = &hit.descriptor.table_name;
        if name.is_empty() {
            continue;
        }

        context.all_tables.insert(name.clone());

        if position < top_k && !context.tables.contains_key(name) {
            context.tables.insert(name.clone(), hit.descriptor.clone());
            context.selected.push(name.clone());
        }
    }

    context
}
