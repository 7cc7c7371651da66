use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::core::config::{AppPaths, ConfigService, RagSettings};
use crate::directory::{Course, InMemoryCourseDirectory, StudyContext};
use crate::generation::GenerationEngine;
use crate::ingest::{LocalFileStore, TopicExtractor};
use crate::llm::{LlmProvider, OpenAiCompatibleProvider};
use crate::pipeline::{Indexer, PipelineParts, RagPipeline, StandardCourseProcessor};
use crate::rag::{
    open_pool, ContextRetriever, DocumentStore, EmbeddingService, KnowledgeStore, QueryLog,
    SqliteDocumentStore, SqliteKnowledgeStore, SqliteQueryLog, SqliteVectorStore, VectorStore,
};
use crate::security::RateLimiter;

pub mod error;

use error::InitializationError;

/// Courses and study contexts loaded into the in-process directory.
#[derive(Debug, Default, Deserialize)]
struct DirectoryFixture {
    #[serde(default)]
    courses: Vec<Course>,
    #[serde(default)]
    study_contexts: Vec<StudyContext>,
}

/// Everything the binary needs to serve one command.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: RagSettings,
    pub directory: Arc<InMemoryCourseDirectory>,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    /// Loads configuration, opens the SQLite stores, connects the
    /// OpenAI-compatible provider and seeds the course directory from
    /// `courses.yml` when present.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let provider: Arc<dyn LlmProvider> = Arc::new(
            OpenAiCompatibleProvider::from_settings(&settings.llm)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let pool = open_pool(&paths.db_path)
            .await
            .map_err(|e| InitializationError::Store(e.into()))?;
        let vectors: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::from_pool(pool.clone(), settings.embedding.dimension)
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(
            SqliteKnowledgeStore::new(pool.clone())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );
        let documents: Arc<dyn DocumentStore> = Arc::new(
            SqliteDocumentStore::new(pool.clone())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );
        let audit: Arc<dyn QueryLog> = Arc::new(
            SqliteQueryLog::new(pool)
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );

        let directory = Arc::new(InMemoryCourseDirectory::new());
        let seeded = seed_directory(&directory, &paths.courses_path)
            .await
            .map_err(InitializationError::Directory)?;
        if seeded > 0 {
            tracing::info!(courses = seeded, "Seeded course directory");
        }

        let embedder = EmbeddingService::new(provider.clone(), &settings.embedding);
        let generator = GenerationEngine::new(provider.clone(), settings.llm.clone());

        let indexer = Indexer::new(
            settings.chunking.clone(),
            TopicExtractor::new(provider.clone(), &settings.llm),
            embedder.clone(),
            vectors.clone(),
            knowledge.clone(),
            documents,
        );
        let processor = Arc::new(StandardCourseProcessor::new(
            indexer.clone(),
            generator.clone(),
        ));
        let retriever = ContextRetriever::new(
            embedder,
            vectors,
            knowledge,
            directory.clone(),
            settings.retrieval.clone(),
        );

        let pipeline = Arc::new(RagPipeline::new(PipelineParts {
            files: Arc::new(LocalFileStore::new(paths.uploads_dir.clone())),
            indexer,
            processor,
            retriever,
            generator,
            directory: directory.clone(),
            audit,
            rate_limiter: Arc::new(RateLimiter::new()),
            chat: settings.chat.clone(),
        }));

        Ok(Arc::new(AppState {
            paths,
            config,
            settings,
            directory,
            pipeline,
        }))
    }
}

/// Returns the number of courses loaded. A missing file is not an error.
async fn seed_directory(
    directory: &InMemoryCourseDirectory,
    path: &Path,
) -> anyhow::Result<usize> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let fixture: DirectoryFixture = serde_yaml::from_str(&raw)?;

    let count = fixture.courses.len();
    for course in fixture.courses {
        directory.add_course(course).await;
    }
    for context in fixture.study_contexts {
        directory.set_study_context(context).await;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use crate::directory::CourseDirectory;

    use super::*;

    #[tokio::test]
    async fn directory_fixture_seeds_courses_and_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.yml");
        std::fs::write(
            &path,
            "courses:\n  - id: cs101\n    name: Algorithms\n    code: CS 101\n\
             study_contexts:\n  - user_id: u1\n    course_id: cs101\n    preferred_hours_per_day: 3.0\n    difficulty_progression: mixed\n",
        )
        .unwrap();

        let directory = InMemoryCourseDirectory::new();
        assert_eq!(seed_directory(&directory, &path).await.unwrap(), 1);

        let course = directory.course("cs101").await.unwrap().unwrap();
        assert_eq!(course.code.as_deref(), Some("CS 101"));
        let context = directory.study_context("u1", "cs101").await.unwrap().unwrap();
        assert_eq!(context.preferred_hours_per_day, 3.0);
    }

    #[tokio::test]
    async fn missing_fixture_seeds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let directory = InMemoryCourseDirectory::new();
        let seeded = seed_directory(&directory, &dir.path().join("courses.yml"))
            .await
            .unwrap();
        assert_eq!(seeded, 0);
    }
}
