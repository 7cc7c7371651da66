//! Entry points the application calls: document ingestion, study plans,
//! question answering and chat.

pub mod chat;
pub mod course;
pub mod indexer;


use std::path::Path;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use crate::core::config::ChatSettings;
use crate::core::errors::{ApiError, GenerationError};
use crate::directory::CourseDirectory;
use crate::generation::prompt::compose_plan_request;
use crate::generation::{fallback_plan, Answer, GenerationEngine, PlanPreferences, StudyPlan};
use crate::ingest::{FileStore, FileType, TextExtractor};
use crate::rag::{
    ContextBundle, ContextRetriever, Document, DocumentType, QueryLog, QueryType, RagQuery,
};
use crate::security::{ChatSecurityGuard, RateLimiter};

pub use chat::{ChatOutcome, ChatTurn};
pub use course::{
    CourseContentProcessor, CourseFile, CourseFileReport, StandardCourseProcessor,
    MIN_COURSE_FILE_CHARS,
};
pub use indexer::{IndexOutcome, IndexPlan, Indexer, NodeTemplate};

/// An uploaded file as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub file_type: FileType,
    pub title: Option<String>,
}

impl SourceFile {
    /// File type from the extension, title from the file stem.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            file_type: FileType::from_path(Path::new(&path)),
            path,
            title: None,
        }
    }

    pub fn with_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn file_name(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
            .to_string()
    }

    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| {
            Path::new(&self.path)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(&self.path)
                .to_string()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub document_id: Option<String>,
    pub chunks_created: usize,
    pub errors: Vec<String>,
}

impl IngestionReport {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

impl From<CourseFileReport> for IngestionReport {
    fn from(report: CourseFileReport) -> Self {
        Self {
            document_id: Some(report.document_id),
            chunks_created: report.chunks_created,
            errors: report.errors,
        }
    }
}

/// Collaborators of a [`RagPipeline`].
pub struct PipelineParts {
    pub files: Arc<dyn FileStore>,
    pub indexer: Indexer,
    pub processor: Arc<dyn CourseContentProcessor>,
    pub retriever: ContextRetriever,
    pub generator: GenerationEngine,
    pub directory: Arc<dyn CourseDirectory>,
    pub audit: Arc<dyn QueryLog>,
    pub rate_limiter: Arc<RateLimiter>,
    pub chat: ChatSettings,
}

pub struct RagPipeline {
    files: Arc<dyn FileStore>,
    extractor: TextExtractor,
    indexer: Indexer,
    processor: Arc<dyn CourseContentProcessor>,
    retriever: ContextRetriever,
    generator: GenerationEngine,
    directory: Arc<dyn CourseDirectory>,
    audit: Arc<dyn QueryLog>,
    guard: ChatSecurityGuard,
    rate_limiter: Arc<RateLimiter>,
    chat: ChatSettings,
}

impl RagPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            files: parts.files,
            extractor: TextExtractor::new(),
            indexer: parts.indexer,
            processor: parts.processor,
            retriever: parts.retriever,
            generator: parts.generator,
            directory: parts.directory,
            audit: parts.audit,
            guard: ChatSecurityGuard::new(),
            rate_limiter: parts.rate_limiter,
            chat: parts.chat,
        }
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Extracts, chunks, embeds and stores one upload. Quizzes, assignments
    /// and syllabi go through the course processor. Never fails: problems
    /// are listed in the report.
    pub async fn process_document(
        &self,
        file: &SourceFile,
        course_id: &str,
        document_type: DocumentType,
    ) -> IngestionReport {
        let text = self
            .extractor
            .extract_file(self.files.as_ref(), &file.path, file.file_type.clone())
            .await;
        if text.trim().is_empty() {
            tracing::warn!(path = %file.path, course_id, "No text extracted from upload");
            return IngestionReport::failed(format!("no text extracted from {}", file.path));
        }

        if document_type.title_prefix().is_some() {
            let course_file = CourseFile {
                course_id: course_id.to_string(),
                course_name: self.course_name(course_id).await,
                title: file.display_title(),
                text,
                file_type: file.file_type.as_str().to_string(),
                original_filename: file.file_name(),
                source_reference: file.path.clone(),
            };
            let result = match document_type {
                DocumentType::Quiz => self.processor.process_course_quiz(&course_file).await,
                DocumentType::Assignment => {
                    self.processor.process_course_assignment(&course_file).await
                }
                _ => self.processor.process_course_syllabus(&course_file).await,
            };
            return match result {
                Ok(report) => report.into(),
                Err(err) => IngestionReport::failed(err.to_string()),
            };
        }

        let document = Document::new(file.display_title(), &text, document_type, file.path.clone())
            .with_metadata("course_id", course_id)
            .with_metadata("file_type", file.file_type.as_str())
            .with_metadata("original_filename", file.file_name());
        let document_id = document.id.clone();
        let plan = self.indexer.default_plan();
        match self.indexer.index_document(document, &text, &plan).await {
            Ok(outcome) => IngestionReport {
                document_id: Some(document_id),
                chunks_created: outcome.chunk_ids.len(),
                errors: outcome.errors,
            },
            Err(err) => {
                tracing::error!(path = %file.path, course_id, "Indexing failed: {}", err);
                IngestionReport::failed(format!("indexing failed: {err}"))
            }
        }
    }

    /// One concurrent task per upload; reports come back in input order.
    pub async fn process_documents(
        &self,
        files: &[(SourceFile, DocumentType)],
        course_id: &str,
    ) -> Vec<IngestionReport> {
        join_all(
            files
                .iter()
                .map(|(file, document_type)| self.process_document(file, course_id, *document_type)),
        )
        .await
    }

    /// Drops every chunk of the document, then indexes its source again.
    /// The stored text is used when the source can no longer be read.
    pub async fn reprocess_document(&self, document_id: &str) -> Result<IngestionReport, ApiError> {
        let document = self
            .indexer
            .documents()
            .get(document_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("document {document_id}")))?;
        let course_id = document
            .course_id()
            .ok_or_else(|| ApiError::BadRequest(format!("document {document_id} has no course")))?
            .to_string();

        let removed = self.indexer.clear_document(document_id, &course_id).await?;
        tracing::info!(document_id, removed, "Cleared chunks for reprocessing");

        let file_type = document
            .metadata
            .get("file_type")
            .and_then(|v| v.as_str())
            .map(FileType::parse)
            .unwrap_or_else(|| FileType::from_path(Path::new(&document.source_reference)));
        let mut text = self
            .extractor
            .extract_file(self.files.as_ref(), &document.source_reference, file_type)
            .await;
        if text.trim().is_empty() {
            text = document.full_text.clone();
        }

        let plan = course::reindex_plan(&self.indexer, &document);
        let outcome = self
            .indexer
            .index_text(document_id, &document.title, &course_id, &text, &plan)
            .await?;
        Ok(IngestionReport {
            document_id: Some(document_id.to_string()),
            chunks_created: outcome.chunk_ids.len(),
            errors: outcome.errors,
        })
    }

    /// LLM plan from the retrieved context, or the template plan when
    /// generation fails (`generated_by == "fallback_template"`).
    pub async fn generate_study_plan(
        &self,
        user_id: &str,
        course_id: &str,
        query: &str,
        preferences: &PlanPreferences,
    ) -> StudyPlan {
        let (bundle, course_name, result) = self.plan(user_id, course_id, query, preferences).await;
        let plan = match result {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(user_id, course_id, "Study plan generation failed, using template: {}", err);
                fallback_plan(query, &course_name, preferences, &bundle)
            }
        };
        self.record(user_id, query, QueryType::StudyPlanCreation, &bundle, &plan.title)
            .await;
        plan
    }

    /// Like [`generate_study_plan`](Self::generate_study_plan) without the
    /// template fallback.
    pub async fn try_generate_study_plan(
        &self,
        user_id: &str,
        course_id: &str,
        query: &str,
        preferences: &PlanPreferences,
    ) -> Result<StudyPlan, GenerationError> {
        let (bundle, _, result) = self.plan(user_id, course_id, query, preferences).await;
        let summary = match &result {
            Ok(plan) => plan.title.clone(),
            Err(err) => format!("generation failed: {err}"),
        };
        self.record(user_id, query, QueryType::StudyPlanCreation, &bundle, &summary)
            .await;
        result
    }

    async fn plan(
        &self,
        user_id: &str,
        course_id: &str,
        query: &str,
        preferences: &PlanPreferences,
    ) -> (ContextBundle, String, Result<StudyPlan, GenerationError>) {
        let bundle = self.retriever.retrieve(user_id, course_id, query).await;
        let course_name = bundle
            .course
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| course_id.to_string());
        let request = compose_plan_request(query, &course_name, preferences, &bundle.chunk_topics());
        let result = self.generator.generate_plan(&bundle, &request).await;
        (bundle, course_name, result)
    }

    /// Without a course the question is answered with no retrieved context.
    pub async fn answer_question(
        &self,
        user_id: &str,
        question: &str,
        course_id: Option<&str>,
    ) -> Result<Answer, GenerationError> {
        let bundle = match course_id {
            Some(course_id) => self.retriever.retrieve(user_id, course_id, question).await,
            None => {
                let embedding = self.retriever.embedder().embed(question).await;
                ContextBundle::empty(question, embedding)
            }
        };

        let result = self.generator.answer_question(&bundle, question).await;
        let summary = match &result {
            Ok(answer) => answer.text.clone(),
            Err(err) => format!("generation failed: {err}"),
        };
        self.record(user_id, question, QueryType::QuestionAnswer, &bundle, &summary)
            .await;
        result
    }

    async fn course_name(&self, course_id: &str) -> String {
        match self.directory.course(course_id).await {
            Ok(Some(course)) => course.name,
            Ok(None) => course_id.to_string(),
            Err(err) => {
                tracing::warn!(course_id, "Course lookup failed: {}", err);
                course_id.to_string()
            }
        }
    }

    /// Appends to the query log; a failing log never fails the request.
    async fn record(
        &self,
        user_id: &str,
        query_text: &str,
        query_type: QueryType,
        bundle: &ContextBundle,
        response: &str,
    ) {
        let mut record = RagQuery::new(user_id, query_text, query_type);
        record.query_embedding = bundle.query_embedding.clone();
        record.retrieved_chunk_ids = bundle.retrieved_chunk_ids();
        record.generated_response = response.to_string();
        if let Err(err) = self.audit.append(record).await {
            tracing::warn!(user_id, %query_type, "Failed to record query: {}", err);
        }
    }
}
