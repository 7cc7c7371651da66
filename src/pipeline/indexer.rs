//! Text → chunks → embeddings → vector store → knowledge nodes.

use std::sync::Arc;

use crate::core::config::ChunkingSettings;
use crate::core::errors::ApiError;
use crate::ingest::{ChunkDraft, SemanticChunker, TopicExtractor};
use crate::rag::knowledge::MIN_TOPIC_CHARS;
use crate::rag::{
    Chunk, ChunkType, Document, DocumentStore, EmbeddingService, KnowledgeStore, NodeDefaults,
    VectorStore,
};
use crate::text::{char_len, dedupe_preserving_order};

/// Knowledge nodes created for every topic of an indexed chunk.
#[derive(Debug, Clone, Copy)]
pub struct NodeTemplate {
    pub source_type: &'static str,
    /// Leads the node description, as in "Quiz content about Graphs".
    pub label: &'static str,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct IndexPlan {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Overrides the per-chunk classification.
    pub chunk_type: Option<ChunkType>,
    /// Chunks are tagged with those of these titles they mention; untagged
    /// chunks keep their extracted topics.
    pub tag_titles: Option<Vec<String>>,
    pub nodes: Option<NodeTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOutcome {
    pub chunk_ids: Vec<String>,
    pub zero_vectors: usize,
    /// Non-fatal problems, already logged.
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct Indexer {
    chunker: SemanticChunker,
    topics: TopicExtractor,
    embedder: EmbeddingService,
    vectors: Arc<dyn VectorStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    documents: Arc<dyn DocumentStore>,
    settings: ChunkingSettings,
}

impl Indexer {
    pub fn new(
        settings: ChunkingSettings,
        topics: TopicExtractor,
        embedder: EmbeddingService,
        vectors: Arc<dyn VectorStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            chunker: SemanticChunker::from_settings(&settings),
            topics,
            embedder,
            vectors,
            knowledge,
            documents,
            settings,
        }
    }

    pub fn settings(&self) -> &ChunkingSettings {
        &self.settings
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Plan for general uploads: configured size and overlap, no nodes.
    pub fn default_plan(&self) -> IndexPlan {
        IndexPlan {
            chunk_size: self.settings.target_size,
            overlap: self.settings.overlap,
            chunk_type: None,
            tag_titles: None,
            nodes: None,
        }
    }

    /// Plan for course files: the larger course-file size.
    pub fn course_plan(&self, chunk_type: ChunkType, nodes: NodeTemplate) -> IndexPlan {
        IndexPlan {
            chunk_size: self.settings.course_file_size,
            overlap: self.settings.overlap,
            chunk_type: Some(chunk_type),
            tag_titles: None,
            nodes: Some(nodes),
        }
    }

    /// Chunks shorter than `min_chunk_chars` after trimming are dropped and
    /// the survivors renumbered in document order.
    pub fn drafts(&self, text: &str, plan: &IndexPlan) -> Vec<ChunkDraft> {
        let mut drafts: Vec<ChunkDraft> = self
            .chunker
            .chunk(text, plan.chunk_size, plan.overlap)
            .into_iter()
            .filter(|draft| char_len(draft.content.trim()) >= self.settings.min_chunk_chars)
            .collect();
        for (index, draft) in drafts.iter_mut().enumerate() {
            draft.chunk_index = index;
        }
        drafts
    }

    /// Stores the document record, then indexes `text` under it.
    pub async fn index_document(
        &self,
        document: Document,
        text: &str,
        plan: &IndexPlan,
    ) -> Result<IndexOutcome, ApiError> {
        let course_id = document
            .course_id()
            .ok_or_else(|| ApiError::BadRequest(format!("document {} has no course", document.id)))?
            .to_string();
        let document_id = document.id.clone();
        let title = document.title.clone();
        self.documents.insert(document).await?;
        self.index_text(&document_id, &title, &course_id, text, plan).await
    }

    /// Writes every chunk of `text` in one batch. A store failure aborts
    /// with nothing written; knowledge-node failures are reported only.
    pub async fn index_text(
        &self,
        document_id: &str,
        title: &str,
        course_id: &str,
        text: &str,
        plan: &IndexPlan,
    ) -> Result<IndexOutcome, ApiError> {
        let drafts = self.drafts(text, plan);
        if drafts.is_empty() {
            tracing::warn!(document_id, "Document produced no chunks");
            return Ok(IndexOutcome::default());
        }

        let contents: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&contents).await;
        let zero_vectors = embeddings
            .iter()
            .filter(|v| v.iter().all(|x| *x == 0.0))
            .count();

        let mut chunks = Vec::with_capacity(drafts.len());
        for (draft, embedding) in drafts.into_iter().zip(embeddings) {
            let topics = self.chunk_topics(&draft, plan).await;
            let analysis = draft.analysis;
            chunks.push(Chunk {
                id: format!("{document_id}_chunk_{}", draft.chunk_index),
                parent_document_id: Some(document_id.to_string()),
                resource_id: None,
                course_id: course_id.to_string(),
                source_title: title.to_string(),
                content: draft.content,
                chunk_index: draft.chunk_index,
                chunk_type: plan.chunk_type.unwrap_or(analysis.chunk_type),
                embedding,
                word_count: analysis.word_count,
                difficulty_level: analysis.difficulty_level,
                topics,
                learning_objectives: analysis.learning_objectives,
                estimated_study_time: Some(analysis.estimated_study_time),
            });
        }

        let links: Vec<(String, Vec<String>)> = chunks
            .iter()
            .map(|c| (c.id.clone(), c.topics.clone()))
            .collect();
        let chunk_ids: Vec<String> = links.iter().map(|(id, _)| id.clone()).collect();
        self.vectors.upsert_batch(chunks).await?;

        let mut errors = Vec::new();
        if zero_vectors > 0 {
            errors.push(format!("{zero_vectors} chunk(s) stored without an embedding"));
        }
        if let Some(template) = plan.nodes {
            for (chunk_id, topics) in &links {
                for topic in topics {
                    if let Err(err) = self.link_topic(template, course_id, chunk_id, topic).await {
                        tracing::warn!(chunk_id = %chunk_id, topic = %topic, "Knowledge node update failed: {}", err);
                        errors.push(format!("knowledge node for {topic}: {err}"));
                    }
                }
            }
        }

        tracing::info!(
            document_id,
            course_id,
            chunks = chunk_ids.len(),
            zero_vectors,
            "Indexed document"
        );
        Ok(IndexOutcome {
            chunk_ids,
            zero_vectors,
            errors,
        })
    }

    async fn chunk_topics(&self, draft: &ChunkDraft, plan: &IndexPlan) -> Vec<String> {
        if let Some(titles) = &plan.tag_titles {
            let mentioned = crate::generation::syllabus::topics_mentioned_in(titles, &draft.content);
            if !mentioned.is_empty() {
                return mentioned;
            }
        }
        let extracted = self.topics.extract(&draft.content).await;
        if extracted.is_empty() {
            return draft.analysis.topics.clone();
        }
        dedupe_preserving_order(extracted)
    }

    async fn link_topic(
        &self,
        template: NodeTemplate,
        course_id: &str,
        chunk_id: &str,
        topic: &str,
    ) -> Result<(), ApiError> {
        let topic = topic.trim();
        if char_len(topic) < MIN_TOPIC_CHARS {
            return Ok(());
        }
        let defaults = NodeDefaults::new(
            template.source_type,
            format!("{} content about {topic}", template.label),
            template.confidence,
        );
        let node = self.knowledge.get_or_create(topic, course_id, defaults).await?;
        self.knowledge.link_chunk(&node.id, chunk_id).await
    }

    /// Removes a document's chunks and their knowledge links. The document
    /// record itself is kept.
    pub async fn clear_document(&self, document_id: &str, course_id: &str) -> Result<usize, ApiError> {
        let chunk_ids: Vec<String> = self
            .vectors
            .list_for_course(course_id)
            .await?
            .into_iter()
            .filter(|c| c.parent_document_id.as_deref() == Some(document_id))
            .map(|c| c.id)
            .collect();
        let removed = self.vectors.delete_by_parent(document_id).await?;
        self.knowledge.unlink_chunks(&chunk_ids).await?;
        Ok(removed)
    }
}
