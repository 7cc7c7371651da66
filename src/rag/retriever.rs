//! Assembles everything generation needs for one query.
//!
//! Every sub-fetch carries its own timeout and degrades to an empty field on
//! failure; a bundle is always returned.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::embedding::EmbeddingService;
use super::knowledge::{KnowledgeNode, KnowledgeStore};
use super::store::{ChunkType, ScoredChunk, SearchQuery, VectorStore};
use super::vector_math::is_zero_vector;
use crate::core::config::RetrievalSettings;
use crate::core::errors::ApiError;
use crate::directory::{Course, CourseDirectory, StoredPlan, StudyContext};

#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub query_text: String,
    pub query_embedding: Vec<f32>,
    pub study_context: Option<StudyContext>,
    pub course: Option<Course>,
    pub relevant_chunks: Vec<ScoredChunk>,
    pub knowledge_nodes: Vec<KnowledgeNode>,
    pub existing_plans: Vec<StoredPlan>,
    /// Fields that could not be fetched.
    pub degraded: Vec<&'static str>,
}

impl ContextBundle {
    /// Bundle with no retrieved context, for queries outside any course.
    pub fn empty(query_text: &str, query_embedding: Vec<f32>) -> Self {
        Self {
            query_text: query_text.to_string(),
            query_embedding,
            ..Self::default()
        }
    }

    pub fn retrieved_chunk_ids(&self) -> Vec<String> {
        self.relevant_chunks
            .iter()
            .map(|hit| hit.chunk.id.clone())
            .collect()
    }

    /// Topics of the retrieved chunks in rank order, de-duplicated.
    pub fn chunk_topics(&self) -> Vec<String> {
        crate::text::dedupe_preserving_order(
            self.relevant_chunks
                .iter()
                .flat_map(|hit| hit.chunk.topics.iter().cloned()),
        )
    }
}

/// Per-call overrides of the configured search parameters.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub chunk_types: Option<Vec<ChunkType>>,
}

#[derive(Clone)]
pub struct ContextRetriever {
    embedder: EmbeddingService,
    store: Arc<dyn VectorStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    directory: Arc<dyn CourseDirectory>,
    settings: RetrievalSettings,
}

impl ContextRetriever {
    pub fn new(
        embedder: EmbeddingService,
        store: Arc<dyn VectorStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        directory: Arc<dyn CourseDirectory>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            knowledge,
            directory,
            settings,
        }
    }

    pub fn embedder(&self) -> &EmbeddingService {
        &self.embedder
    }

    pub async fn retrieve(&self, user_id: &str, course_id: &str, query_text: &str) -> ContextBundle {
        self.retrieve_with(user_id, course_id, query_text, &RetrievalOptions::default())
            .await
    }

    pub async fn retrieve_with(
        &self,
        user_id: &str,
        course_id: &str,
        query_text: &str,
        options: &RetrievalOptions,
    ) -> ContextBundle {
        let query_embedding = self.embedder.embed(query_text).await;
        let mut bundle = ContextBundle::empty(query_text, query_embedding);
        let timeout = self.settings.timeout;

        let (study_context, course, chunks, nodes, plans) = tokio::join!(
            fetch("study_context", timeout, self.directory.study_context(user_id, course_id)),
            fetch("course", timeout, self.directory.course(course_id)),
            fetch(
                "relevant_chunks",
                timeout,
                self.search(course_id, &bundle.query_text, &bundle.query_embedding, options)
            ),
            fetch("knowledge_nodes", timeout, self.knowledge.list_for_course(course_id)),
            fetch(
                "existing_plans",
                timeout,
                self.directory
                    .recent_plans(user_id, course_id, self.settings.recent_plans)
            ),
        );

        let mut degraded = Vec::new();
        bundle.study_context = study_context.unwrap_or_else(|field| {
            degraded.push(field);
            None
        });
        bundle.course = course.unwrap_or_else(|field| {
            degraded.push(field);
            None
        });
        bundle.relevant_chunks = chunks.unwrap_or_else(|field| {
            degraded.push(field);
            Vec::new()
        });
        bundle.knowledge_nodes = nodes.unwrap_or_else(|field| {
            degraded.push(field);
            Vec::new()
        });
        bundle.existing_plans = plans.unwrap_or_else(|field| {
            degraded.push(field);
            Vec::new()
        });
        bundle.degraded = degraded;

        tracing::info!(
            user_id,
            course_id,
            chunks = bundle.relevant_chunks.len(),
            nodes = bundle.knowledge_nodes.len(),
            degraded = ?bundle.degraded,
            "Retrieved context"
        );
        bundle
    }

    async fn search(
        &self,
        course_id: &str,
        query_text: &str,
        embedding: &[f32],
        options: &RetrievalOptions,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let top_k = options.top_k.unwrap_or(self.settings.top_k);
        let threshold = options
            .similarity_threshold
            .or(self.settings.similarity_threshold);

        if is_zero_vector(embedding) {
            tracing::debug!(course_id, "Query embedding unavailable, ranking by keyword overlap");
            return self
                .keyword_search(course_id, query_text, options.chunk_types.as_deref(), top_k)
                .await;
        }

        let mut query = SearchQuery::new(embedding, course_id, top_k).with_threshold(threshold);
        if let Some(types) = options.chunk_types.as_deref() {
            query = query.with_chunk_types(types);
        }
        self.store.search(query).await
    }

    /// Share of query words found in each chunk; chunks without any are
    /// left out.
    async fn keyword_search(
        &self,
        course_id: &str,
        query_text: &str,
        chunk_types: Option<&[ChunkType]>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let terms = keywords(query_text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = self
            .store
            .list_for_course(course_id)
            .await?
            .into_iter()
            .filter(|chunk| chunk_types.map_or(true, |types| types.contains(&chunk.chunk_type)))
            .filter_map(|chunk| {
                let words = keywords(&chunk.content);
                let hits = terms.iter().filter(|term| words.contains(*term)).count();
                (hits > 0).then(|| ScoredChunk {
                    similarity: hits as f32 / terms.len() as f32,
                    chunk,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Runs one sub-fetch under `timeout`; `Err` carries the field name.
async fn fetch<T, F>(field: &'static str, timeout: Duration, fut: F) -> Result<T, &'static str>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::warn!(field, "Context fetch failed: {}", err);
            Err(field)
        }
        Err(_) => {
            tracing::warn!(field, ?timeout, "Context fetch timed out");
            Err(field)
        }
    }
}
