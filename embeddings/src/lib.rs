//! # Embeddings
//!
//! This crate turns table-metadata text into the two vector representations
//! used by hybrid retrieval.
//!
//! ## Features
//!
//! - **Dense Embeddings**: Semantic vectors from an embedding API
//! - **Sparse Embeddings**: Lexical term-weight vectors computed locally
//! - **Hybrid Embedder**: One call site producing both, batched for indexing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ─────┐                         │
//! │                                        ├──► HybridEmbedder      │
//! │  SparseEmbedder ─────► SparseVector ──┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod hybrid;
pub mod provider;
pub mod similarity;
pub mod sparse;

pub use error::{EmbeddingError, Result};
pub use hybrid::HybridEmbedder;
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::{cosine_similarity, dot_product, normalize, sparse_dot};
pub use sparse::{LexicalSparseEncoder, SparseEmbedder, SparseVector};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings produced by the default model.
pub const DEFAULT_DIMENSION: usize = 3072; // text-embedding-3-large
