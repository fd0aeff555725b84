//! # Retrieval Engine
//!
//! Hybrid retrieval over table-metadata descriptors:
//!
//! - **Descriptors**: One structured metadata unit per relational table
//! - **Vector Index**: Dense and sparse named spaces, fused with RRF
//! - **Reranking**: Optional cross-encoder pass that fails soft
//! - **Semantic Context**: The table map handed to query generation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Hybrid Retrieval Engine                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │    Hybrid    │  │    Vector    │  │   Reranker   │          │
//! │  │   Embedder   │  │    Index     │  │  (optional)  │          │
//! │  └──────────────┘  └──────────────┘  └──────────────┘          │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │    search    │                               │
//! │                  └──────────────┘                               │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │   Semantic   │                               │
//! │                  │   Context    │                               │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use datachat_retrieval::{HybridRetrieval, InMemoryIndex, RetrievalConfig};
//!
//! let engine = HybridRetrieval::new(embedder, Arc::new(InMemoryIndex::new()), RetrievalConfig::default());
//! engine.index_tables(&document).await?;
//! let hits = engine.search("monthly revenue by region", 10, None).await?;
//! ```

pub mod config;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod index;
pub mod memory;
pub mod qdrant;
pub mod rerank;

pub use config::{QdrantConfig, RerankConfig, RetrievalConfig};
pub use context::{RetrievalTimings, SemanticContext, organize};
pub use descriptor::{
    ColumnSummary, ForeignKey, ForeignKeyTarget, IndexSummary, SchemaEntry, SemanticsDocument,
    TableDescriptor,
};
pub use engine::{HybridRetrieval, IndexReport, SearchHit};
pub use error::{RerankError, Result, RetrievalError};
pub use fusion::{DEFAULT_RANK_CONSTANT, FusedPoint, reciprocal_rank_fusion};
pub use index::{IndexPoint, ScoredPoint, VectorIndex};
pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;
pub use rerank::{CohereReranker, RerankResult, RerankStats, Reranker, searchable_text};

// Re-export from dependencies for convenience
pub use datachat_embeddings::{HybridEmbedder, SparseVector};
