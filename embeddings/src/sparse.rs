//! Sparse (lexical) embeddings.
//!
//! A sparse vector carries one weight per distinct term, keyed by a hashed
//! term index. Dot products between two normalised sparse vectors measure
//! term overlap the way BM25-style retrieval does, which complements the
//! dense space on identifiers such as table and column names.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Number of hash buckets for term indices (2^20).
const INDEX_SPACE: u32 = 1 << 20;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "were", "what", "which", "with",
];

/// A sparse vector as parallel index/value arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Term indices, strictly ascending.
    pub indices: Vec<u32>,

    /// Weight per index.
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Number of non-zero entries.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the vector has no entries.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Trait for sparse embedding generation.
#[async_trait]
pub trait SparseEmbedder: Send + Sync {
    /// Get the name of this embedder.
    fn name(&self) -> &str;

    /// Encode a single text.
    async fn embed_sparse(&self, text: &str) -> Result<SparseVector>;

    /// Encode many texts in one call, preserving input order.
    async fn embed_sparse_batch(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_sparse(text).await?);
        }
        Ok(vectors)
    }
}

/// Local term-frequency encoder with hashed term indices.
#[derive(Debug, Clone, Default)]
pub struct LexicalSparseEncoder;

impl LexicalSparseEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self
    }

    /// Encode text synchronously.
    pub fn encode(&self, text: &str) -> SparseVector {
        let mut term_counts: BTreeMap<&str, u32> = BTreeMap::new();
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
        {
            if token.contains('_') {
                for part in token.split('_').filter(|p| !p.is_empty()) {
                    count_term(&mut term_counts, part);
                }
            }
            count_term(&mut term_counts, token.trim_matches('_'));
        }

        let mut weights: BTreeMap<u32, f32> = BTreeMap::new();
        for (term, count) in term_counts {
            let weight = 1.0 + (count as f32).ln();
            *weights.entry(term_index(term)).or_default() += weight;
        }

        let magnitude: f32 = weights.values().map(|w| w * w).sum::<f32>().sqrt();
        if magnitude == 0.0 {
            return SparseVector::default();
        }

        let (indices, values) = weights
            .into_iter()
            .map(|(index, weight)| (index, weight / magnitude))
            .unzip();

        SparseVector { indices, values }
    }
}

#[async_trait]
impl SparseEmbedder for LexicalSparseEncoder {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector> {
        Ok(self.encode(text))
    }

    async fn embed_sparse_batch(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

fn count_term<'a>(counts: &mut BTreeMap<&'a str, u32>, term: &'a str) {
    if term.is_empty() || STOP_WORDS.contains(&term) {
        return;
    }
    *counts.entry(term).or_default() += 1;
}

/// FNV-1a hash of a term folded into the index space.
fn term_index(term: &str) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in term.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % u64::from(INDEX_SPACE)) as u32
}
