//! Vector Domain Library
//!
//! Embedding generation, namespace-scoped similarity search and bulk
//! re-indexing for knowledge-base chunks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ RetrievalService │   │ KnowledgeLinkage │   │ MigrationRunner  │
//! └───────┬──────────┘   └──┬────────────┬──┘   └────────┬─────────┘
//!         │                 │            │               │
//! ┌───────▼──────────┐      │   ┌────────▼───────┐       │
//! │EmbeddingProvider │◄─────┘   │ VectorRefStore │       │
//! │    (trait)       │          │    (trait)     │       │
//! └───────┬──────────┘          └────────────────┘       │
//!         │            ┌─────────────────────────────────▼┐
//! ┌───────▼──────────┐ │       SimilarityIndex (trait)    │
//! │  OpenAIProvider  │ ├───────────┬───────────┬──────────┤
//! │DeterministicProv.│ │ InMemory  │ PgVector  │  Qdrant  │
//! └──────────────────┘ └───────────┴───────────┴──────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use domain_vector::{
//!     Chunk, DeterministicProvider, InMemoryIndex, InMemoryVectorRefStore, KnowledgeLinkage,
//!     RetrievalService,
//! };
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(DeterministicProvider::new(256)?);
//! let index = Arc::new(InMemoryIndex::new());
//! let linkage = KnowledgeLinkage::new(
//!     provider.clone(),
//!     index.clone(),
//!     Arc::new(InMemoryVectorRefStore::new()),
//! );
//!
//! let kb = Uuid::new_v4();
//! let chunk = Chunk::new(
//!     Uuid::new_v4(),
//!     Uuid::new_v4(),
//!     kb,
//!     Uuid::new_v4(),
//!     0,
//!     "Refunds are issued within five days.",
//! )?;
//! linkage.embed_and_link(&chunk).await?;
//!
//! let _hits = RetrievalService::new(provider, index)
//!     .search(kb, "refund timing", 5, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod index;
pub mod linkage;
pub mod migrate;
pub mod models;
pub mod qdrant;
pub mod refs;
pub mod service;

// Re-export commonly used types
pub use embedding::{
    DeterministicProvider, EmbeddingProvider, EmbeddingRetryPolicy, OpenAIConfig, OpenAIProvider,
};
pub use error::{VectorError, VectorResult};
pub use index::{
    ChunkCatalog, InMemoryChunkCatalog, InMemoryIndex, PgChunkCatalog, PgVectorIndex,
    SimilarityIndex,
};
pub use linkage::{KnowledgeLinkage, LinkOutcome};
pub use migrate::{MigrationReport, MigrationRunner};
pub use models::{
    Chunk, ChunkId, EmbeddingModel, IndexBackend, NamespaceInfo, Payload, PayloadValue,
    QueryFilter, ScoredRecord, UpsertReport, VectorRecord, VectorRef,
    namespace_for_knowledge_base,
};
pub use qdrant::{QdrantConfig, QdrantIndex};
pub use refs::{InMemoryVectorRefStore, PgVectorRefStore, VectorRefStore};
pub use service::RetrievalService;
