//! Indexing for the three kinds of course file: quizzes, assignments and
//! syllabi.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::indexer::{IndexPlan, Indexer, NodeTemplate};
use crate::core::errors::IngestionError;
use crate::generation::{AssignmentDetails, GenerationEngine, SyllabusTopics};
use crate::rag::{ChunkType, Document, DocumentType};
use crate::text::char_len;

/// Extracted text shorter than this is not indexed.
pub const MIN_COURSE_FILE_CHARS: usize = 100;

const QUIZ_NODES: NodeTemplate = NodeTemplate {
    source_type: "quiz",
    label: "Quiz",
    confidence: 0.8,
};
const ASSIGNMENT_NODES: NodeTemplate = NodeTemplate {
    source_type: "assignment",
    label: "Assignment",
    confidence: 0.8,
};
const SYLLABUS_NODES: NodeTemplate = NodeTemplate {
    source_type: "syllabus",
    label: "Syllabus",
    confidence: 0.9,
};

/// A course upload after text extraction.
#[derive(Debug, Clone)]
pub struct CourseFile {
    pub course_id: String,
    pub course_name: String,
    pub title: String,
    pub text: String,
    pub file_type: String,
    pub original_filename: String,
    /// Where the upload can be read again.
    pub source_reference: String,
}

impl CourseFile {
    fn document(&self, title: String, document_type: DocumentType) -> Document {
        Document::new(title, &self.text, document_type, self.source_reference.clone())
            .with_metadata("course_id", self.course_id.clone())
            .with_metadata("course_name", self.course_name.clone())
            .with_metadata("file_type", self.file_type.clone())
            .with_metadata("original_filename", self.original_filename.clone())
    }

    fn require_content(&self) -> Result<(), IngestionError> {
        let chars = char_len(self.text.trim());
        if chars < MIN_COURSE_FILE_CHARS {
            tracing::warn!(
                course_id = %self.course_id,
                file = %self.original_filename,
                chars,
                "Course file has too little text to index"
            );
            return Err(IngestionError::InsufficientContent {
                chars,
                required: MIN_COURSE_FILE_CHARS,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CourseFileReport {
    pub document_id: String,
    pub chunks_created: usize,
    pub assignment: Option<AssignmentDetails>,
    pub syllabus: Option<SyllabusTopics>,
    pub errors: Vec<String>,
}

/// Plan that re-indexes a stored document the way it was first indexed.
pub fn reindex_plan(indexer: &Indexer, document: &Document) -> IndexPlan {
    let mut plan = match document.document_type {
        DocumentType::Quiz => indexer.course_plan(ChunkType::QuizInfo, QUIZ_NODES),
        DocumentType::Assignment => indexer.course_plan(ChunkType::Assignment, ASSIGNMENT_NODES),
        DocumentType::Syllabus => indexer.course_plan(ChunkType::Syllabus, SYLLABUS_NODES),
        _ => return indexer.default_plan(),
    };
    if let Some(Value::Array(topics)) = document.metadata.get("topics") {
        plan.tag_titles = Some(
            topics
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        );
    }
    plan
}

#[async_trait]
pub trait CourseContentProcessor: Send + Sync {
    async fn process_course_quiz(&self, file: &CourseFile) -> Result<CourseFileReport, IngestionError>;

    async fn process_course_assignment(
        &self,
        file: &CourseFile,
    ) -> Result<CourseFileReport, IngestionError>;

    async fn process_course_syllabus(
        &self,
        file: &CourseFile,
    ) -> Result<CourseFileReport, IngestionError>;
}

pub struct StandardCourseProcessor {
    indexer: Indexer,
    generator: GenerationEngine,
}

impl StandardCourseProcessor {
    pub fn new(indexer: Indexer, generator: GenerationEngine) -> Self {
        Self { indexer, generator }
    }
}

#[async_trait]
impl CourseContentProcessor for StandardCourseProcessor {
    async fn process_course_quiz(&self, file: &CourseFile) -> Result<CourseFileReport, IngestionError> {
        file.require_content()?;
        let document = file.document(format!("Quiz: {}", file.title), DocumentType::Quiz);
        let document_id = document.id.clone();
        let plan = self.indexer.course_plan(ChunkType::QuizInfo, QUIZ_NODES);
        let outcome = self.indexer.index_document(document, &file.text, &plan).await?;

        Ok(CourseFileReport {
            document_id,
            chunks_created: outcome.chunk_ids.len(),
            errors: outcome.errors,
            ..CourseFileReport::default()
        })
    }

    async fn process_course_assignment(
        &self,
        file: &CourseFile,
    ) -> Result<CourseFileReport, IngestionError> {
        file.require_content()?;
        let mut errors = Vec::new();
        let details = match self.generator.extract_assignment_details(&file.text).await {
            Ok(details) => Some(details),
            Err(err) => {
                tracing::warn!(file = %file.original_filename, "Assignment details unavailable: {}", err);
                errors.push(format!("assignment details: {err}"));
                None
            }
        };

        let title = details
            .as_ref()
            .and_then(|d| d.title.clone())
            .unwrap_or_else(|| file.title.clone());
        let mut document = file.document(format!("Assignment: {title}"), DocumentType::Assignment);
        if let Some(details) = &details {
            document = document
                .with_metadata("assignment_type", details.assignment_type.as_str())
                .with_metadata(
                    "due_date",
                    details.due_date.format("%Y-%m-%d %H:%M").to_string(),
                )
                .with_metadata("difficulty_level", details.difficulty_level);
        }
        let document_id = document.id.clone();
        let plan = self.indexer.course_plan(ChunkType::Assignment, ASSIGNMENT_NODES);
        let outcome = self.indexer.index_document(document, &file.text, &plan).await?;
        errors.extend(outcome.errors);

        Ok(CourseFileReport {
            document_id,
            chunks_created: outcome.chunk_ids.len(),
            assignment: details,
            syllabus: None,
            errors,
        })
    }

    async fn process_course_syllabus(
        &self,
        file: &CourseFile,
    ) -> Result<CourseFileReport, IngestionError> {
        file.require_content()?;
        let topics = self.generator.extract_syllabus_topics(&file.text).await;
        let titles = topics.titles();

        let document = file
            .document(format!("Syllabus: {}", file.course_name), DocumentType::Syllabus)
            .with_metadata("topics", json!(titles))
            .with_metadata("summary", topics.summary.clone());
        let document_id = document.id.clone();
        let mut plan = self.indexer.course_plan(ChunkType::Syllabus, SYLLABUS_NODES);
        plan.tag_titles = Some(titles);
        let outcome = self.indexer.index_document(document, &file.text, &plan).await?;

        tracing::info!(
            course_id = %file.course_id,
            topics = topics.topics.len(),
            from_llm = topics.from_llm,
            "Processed course syllabus"
        );
        Ok(CourseFileReport {
            document_id,
            chunks_created: outcome.chunk_ids.len(),
            assignment: None,
            syllabus: Some(topics),
            errors: outcome.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::config::{ChunkingSettings, EmbeddingSettings, LlmSettings};
    use crate::ingest::TopicExtractor;
    use crate::llm::testing::{EmbedMode, ScriptedProvider};
    use crate::rag::{
        EmbeddingService, InMemoryDocumentStore, InMemoryKnowledgeStore, InMemoryVectorStore,
    };

    const DIM: usize = 8;

    fn processor(provider: ScriptedProvider) -> (StandardCourseProcessor, Indexer) {
        let provider = Arc::new(provider);
        let embedding = EmbeddingSettings {
            dimension: DIM,
            ..EmbeddingSettings::default()
        };
        let indexer = Indexer::new(
            ChunkingSettings::default(),
            TopicExtractor::offline(),
            EmbeddingService::new(provider.clone(), &embedding),
            Arc::new(InMemoryVectorStore::new(DIM)),
            Arc::new(InMemoryKnowledgeStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
        );
        let generator = GenerationEngine::new(provider, LlmSettings::default());
        (StandardCourseProcessor::new(indexer.clone(), generator), indexer)
    }

    fn course_file(text: &str) -> CourseFile {
        CourseFile {
            course_id: "cs101".to_string(),
            course_name: "Algorithms".to_string(),
            title: "Week 3".to_string(),
            text: text.to_string(),
            file_type: "txt".to_string(),
            original_filename: "week3.txt".to_string(),
            source_reference: "uploads/week3.txt".to_string(),
        }
    }

    const SYLLABUS: &str = "This course covers Graph Traversal and Dynamic Programming in depth. \
        Weeks one to four introduce graph traversal with breadth first and depth first search. \
        Weeks five to eight cover dynamic programming, memoization and tabulation techniques.";

    #[tokio::test]
    async fn short_files_are_refused() {
        let (processor, indexer) = processor(ScriptedProvider::new(EmbedMode::Hashed(DIM)));
        let err = processor
            .process_course_quiz(&course_file("Quiz 1: two questions."))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestionError::InsufficientContent { required: 100, .. }
        ));
        assert_eq!(indexer.vectors().count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn quiz_files_become_quiz_chunks_and_nodes() {
        let text = "Quiz 2 covers Chapter 4: Binary Search Trees and balancing. \
            Expect questions on rotations, insertion and deletion in balanced trees.";
        let (processor, indexer) = processor(ScriptedProvider::new(EmbedMode::Hashed(DIM)));

        let report = processor.process_course_quiz(&course_file(text)).await.unwrap();

        assert_eq!(report.chunks_created, 1);
        let document = indexer.documents().get(&report.document_id).await.unwrap().unwrap();
        assert_eq!(document.title, "Quiz: Week 3");
        assert_eq!(document.metadata["original_filename"], "week3.txt");
        assert_eq!(document.metadata["course_name"], "Algorithms");
        let nodes = indexer.knowledge().list_for_course("cs101").await.unwrap();
        assert!(nodes
            .iter()
            .any(|n| n.description == "Quiz content about Binary Search Trees and balancing"));
        assert!(nodes.iter().all(|n| n.confidence_score == 0.8));
    }

    #[tokio::test]
    async fn assignment_details_title_the_document() {
        let reply = r#"{"title": "Heap Lab", "assignment_type": "lab", "due_date": "2026-11-02"}"#;
        let (processor, indexer) =
            processor(ScriptedProvider::new(EmbedMode::Hashed(DIM)).with_reply(reply));
        let text = "Implement a binary heap with insert and extract-min operations. \
            Submit your code with tests and a short write-up of the running time analysis.";

        let report = processor
            .process_course_assignment(&course_file(text))
            .await
            .unwrap();

        let details = report.assignment.unwrap();
        assert_eq!(details.title.as_deref(), Some("Heap Lab"));
        let document = indexer.documents().get(&report.document_id).await.unwrap().unwrap();
        assert_eq!(document.title, "Assignment: Heap Lab");
        assert_eq!(document.metadata["due_date"], "2026-11-02 23:59");
        assert_eq!(document.metadata["assignment_type"], "lab");
    }

    #[tokio::test]
    async fn assignment_is_indexed_even_when_details_fail() {
        let (processor, _) = processor(ScriptedProvider::new(EmbedMode::Hashed(DIM)));
        let text = "Implement a binary heap with insert and extract-min operations. \
            Submit your code with tests and a short write-up of the running time analysis.";

        let report = processor
            .process_course_assignment(&course_file(text))
            .await
            .unwrap();

        assert!(report.assignment.is_none());
        assert_eq!(report.chunks_created, 1);
        assert!(report.errors[0].starts_with("assignment details"));
    }

    #[tokio::test]
    async fn syllabus_chunks_are_tagged_with_extracted_topics() {
        let reply = r#"{"topics": ["Graph Traversal", "Dynamic Programming"], "summary": "Algorithms."}"#;
        let (processor, indexer) =
            processor(ScriptedProvider::new(EmbedMode::Hashed(DIM)).with_reply(reply));

        let report = processor
            .process_course_syllabus(&course_file(SYLLABUS))
            .await
            .unwrap();

        assert!(report.syllabus.as_ref().unwrap().from_llm);
        let chunks = indexer.vectors().list_for_course("cs101").await.unwrap();
        assert_eq!(chunks[0].chunk_type, ChunkType::Syllabus);
        assert_eq!(chunks[0].topics, vec!["Graph Traversal", "Dynamic Programming"]);
        let document = indexer.documents().get(&report.document_id).await.unwrap().unwrap();
        assert_eq!(document.title, "Syllabus: Algorithms");

        let nodes = indexer.knowledge().list_for_course("cs101").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.confidence_score == 0.9));
        assert!(nodes
            .iter()
            .any(|n| n.description == "Syllabus content about Dynamic Programming"));
    }
}
