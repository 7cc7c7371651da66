//! Retrieval side of the pipeline.
//!
//! - `VectorStore` backends (in-memory, SQLite) with course-scoped cosine search
//! - `EmbeddingService` with zero-vector degradation
//! - knowledge nodes, documents and the query audit log
//! - `ContextRetriever`, which assembles a `ContextBundle` per query

pub mod audit;
pub mod documents;
pub mod embedding;
pub mod knowledge;
pub mod memory;
pub mod retriever;
pub mod sqlite;
pub mod store;
pub mod vector_math;

pub use audit::{InMemoryQueryLog, QueryLog, QueryType, RagQuery};
pub use documents::{Document, DocumentStore, DocumentType, InMemoryDocumentStore};
pub use embedding::EmbeddingService;
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeNode, KnowledgeStore, NodeDefaults};
pub use memory::InMemoryVectorStore;
pub use retriever::{ContextBundle, ContextRetriever, RetrievalOptions};
pub use sqlite::{
    open_pool, SqliteDocumentStore, SqliteKnowledgeStore, SqliteQueryLog, SqliteVectorStore,
};
pub use store::{Chunk, ChunkType, ScoredChunk, SearchQuery, VectorStore};
