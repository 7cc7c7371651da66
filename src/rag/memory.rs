use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{check_dimension, Chunk, ScoredChunk, SearchQuery, VectorStore};
use super::vector_math::rank_candidates;
use crate::core::errors::ApiError;

/// Lock-guarded in-process store. Used by tests and by deployments that do
/// not need chunks to outlive the process.
pub struct InMemoryVectorStore {
    dimension: usize,
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            chunks: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, chunk: Chunk) -> Result<(), ApiError> {
        check_dimension(&chunk, self.dimension)?;
        self.chunks.write().await.insert(chunk.id.clone(), chunk);
        Ok(())
    }

    async fn upsert_batch(&self, chunks: Vec<Chunk>) -> Result<(), ApiError> {
        for chunk in &chunks {
            check_dimension(chunk, self.dimension)?;
        }
        let mut guard = self.chunks.write().await;
        for chunk in chunks {
            guard.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn search(&self, query: SearchQuery<'_>) -> Result<Vec<ScoredChunk>, ApiError> {
        let candidates: Vec<Chunk> = self
            .chunks
            .read()
            .await
            .values()
            .filter(|chunk| query.admits(chunk))
            .cloned()
            .collect();

        Ok(rank_candidates(
            query.embedding,
            candidates,
            query.similarity_threshold,
            query.top_k,
        )
        .into_iter()
        .map(|(chunk, similarity)| ScoredChunk { chunk, similarity })
        .collect())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, ApiError> {
        Ok(self.chunks.read().await.get(chunk_id).cloned())
    }

    async fn list_for_course(&self, course_id: &str) -> Result<Vec<Chunk>, ApiError> {
        let mut chunks: Vec<Chunk> = self
            .chunks
            .read()
            .await
            .values()
            .filter(|chunk| chunk.course_id == course_id)
            .cloned()
            .collect();
        chunks.sort_by(|a, b| {
            a.source_title
                .cmp(&b.source_title)
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(chunks)
    }

    async fn delete_by_parent(&self, parent_document_id: &str) -> Result<usize, ApiError> {
        let mut guard = self.chunks.write().await;
        let before = guard.len();
        guard.retain(|_, chunk| chunk.parent_document_id.as_deref() != Some(parent_document_id));
        Ok(before - guard.len())
    }

    async fn delete_by_course(&self, course_id: &str) -> Result<usize, ApiError> {
        let mut guard = self.chunks.write().await;
        let before = guard.len();
        guard.retain(|_, chunk| chunk.course_id != course_id);
        Ok(before - guard.len())
    }

    async fn count(&self, course_id: Option<&str>) -> Result<usize, ApiError> {
        let guard = self.chunks.read().await;
        Ok(match course_id {
            Some(course_id) => guard.values().filter(|c| c.course_id == course_id).count(),
            None => guard.len(),
        })
    }
}
