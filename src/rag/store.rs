//! Chunk records and the `VectorStore` trait.
//!
//! Every search is scoped to a single course. Implementations rank by
//! cosine similarity through [`super::vector_math::rank_candidates`] so the
//! ordering of equal scores is the same for every backend.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::vector_math::Rankable;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Syllabus,
    Assignment,
    QuizInfo,
    LectureNotes,
    Textbook,
    ResearchPaper,
    VideoTranscript,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Text => "text",
            ChunkType::Syllabus => "syllabus",
            ChunkType::Assignment => "assignment",
            ChunkType::QuizInfo => "quiz_info",
            ChunkType::LectureNotes => "lecture_notes",
            ChunkType::Textbook => "textbook",
            ChunkType::ResearchPaper => "research_paper",
            ChunkType::VideoTranscript => "video_transcript",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(ChunkType::Text),
            "syllabus" => Ok(ChunkType::Syllabus),
            "assignment" => Ok(ChunkType::Assignment),
            "quiz_info" => Ok(ChunkType::QuizInfo),
            "lecture_notes" => Ok(ChunkType::LectureNotes),
            "textbook" => Ok(ChunkType::Textbook),
            "research_paper" => Ok(ChunkType::ResearchPaper),
            "video_transcript" => Ok(ChunkType::VideoTranscript),
            other => Err(ApiError::BadRequest(format!("unknown chunk type: {other}"))),
        }
    }
}

/// An embedded span of a document or resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// `None` when the chunk hangs directly off a resource.
    pub parent_document_id: Option<String>,
    pub resource_id: Option<String>,
    pub course_id: String,
    /// Title of the owning document, shown in citations.
    pub source_title: String,
    pub content: String,
    pub chunk_index: usize,
    pub chunk_type: ChunkType,
    pub embedding: Vec<f32>,
    pub word_count: usize,
    pub difficulty_level: u8,
    pub topics: Vec<String>,
    pub learning_objectives: Vec<String>,
    /// Minutes.
    pub estimated_study_time: Option<f32>,
}

impl Rankable for Chunk {
    fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct SearchQuery<'a> {
    pub embedding: &'a [f32],
    pub course_id: &'a str,
    pub chunk_types: Option<&'a [ChunkType]>,
    pub top_k: usize,
    pub similarity_threshold: Option<f32>,
}

impl<'a> SearchQuery<'a> {
    pub fn new(embedding: &'a [f32], course_id: &'a str, top_k: usize) -> Self {
        Self {
            embedding,
            course_id,
            chunk_types: None,
            top_k,
            similarity_threshold: None,
        }
    }

    pub fn with_chunk_types(mut self, chunk_types: &'a [ChunkType]) -> Self {
        self.chunk_types = Some(chunk_types);
        self
    }

    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub(crate) fn admits(&self, chunk: &Chunk) -> bool {
        chunk.course_id == self.course_id
            && self
                .chunk_types
                .map_or(true, |types| types.contains(&chunk.chunk_type))
    }
}

/// Persistence for embedded chunks.
///
/// Writes are whole-record: a chunk is stored with its embedding or not at
/// all, and `upsert_batch` is all-or-nothing.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Deployment-fixed embedding dimension.
    fn dimension(&self) -> usize;

    async fn upsert(&self, chunk: Chunk) -> Result<(), ApiError>;

    async fn upsert_batch(&self, chunks: Vec<Chunk>) -> Result<(), ApiError>;

    /// Ranked by similarity descending, then `chunk_index` ascending.
    async fn search(&self, query: SearchQuery<'_>) -> Result<Vec<ScoredChunk>, ApiError>;

    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, ApiError>;

    /// All chunks of a course in insertion-independent order
    /// (`source_title`, then `chunk_index`).
    async fn list_for_course(&self, course_id: &str) -> Result<Vec<Chunk>, ApiError>;

    async fn delete_by_parent(&self, parent_document_id: &str) -> Result<usize, ApiError>;

    async fn delete_by_course(&self, course_id: &str) -> Result<usize, ApiError>;

    async fn count(&self, course_id: Option<&str>) -> Result<usize, ApiError>;
}

/// Rejects embeddings that do not match the store's dimension.
pub(crate) fn check_dimension(chunk: &Chunk, dimension: usize) -> Result<(), ApiError> {
    if chunk.embedding.len() != dimension {
        return Err(ApiError::BadRequest(format!(
            "chunk {} has embedding dimension {}, expected {}",
            chunk.id,
            chunk.embedding.len(),
            dimension
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_chunk(id: &str, course_id: &str, chunk_index: usize, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        parent_document_id: Some(format!("doc-{course_id}")),
        resource_id: None,
        course_id: course_id.to_string(),
        source_title: "Lecture 1".to_string(),
        content: format!("content of {id}"),
        chunk_index,
        chunk_type: ChunkType::Text,
        embedding,
        word_count: 3,
        difficulty_level: 2,
        topics: vec!["Sorting".to_string()],
        learning_objectives: Vec::new(),
        estimated_study_time: Some(5.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_type_names_round_trip() {
        for name in ["text", "syllabus", "quiz_info", "lecture_notes", "video_transcript"] {
            let parsed: ChunkType = name.parse().unwrap();
            assert_eq!(parsed.as_str(), name);
        }
        assert!("slides".parse::<ChunkType>().is_err());
    }

    #[test]
    fn search_query_admits_only_matching_course_and_types() {
        let embedding = [1.0, 0.0];
        let types = [ChunkType::Syllabus];
        let query = SearchQuery::new(&embedding, "course-a", 5).with_chunk_types(&types);

        let mut chunk = sample_chunk("c1", "course-a", 0, vec![1.0, 0.0]);
        assert!(!query.admits(&chunk));
        chunk.chunk_type = ChunkType::Syllabus;
        assert!(query.admits(&chunk));
        chunk.course_id = "course-b".to_string();
        assert!(!query.admits(&chunk));
    }
}
