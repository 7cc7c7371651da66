//! SQLite persistence.
//!
//! Chunk metadata lives in ordinary columns, embeddings in little-endian f32
//! BLOBs. Search loads the course's rows and ranks them by brute-force
//! cosine similarity. Documents, knowledge nodes and the query log share
//! the same database file.

mod audit;
mod documents;
mod knowledge;

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::store::{check_dimension, Chunk, ChunkType, ScoredChunk, SearchQuery, VectorStore};
use super::vector_math::rank_candidates;
use crate::core::errors::ApiError;

pub use audit::SqliteQueryLog;
pub use documents::SqliteDocumentStore;
pub use knowledge::SqliteKnowledgeStore;

const CHUNK_COLUMNS: &str = "id, parent_document_id, resource_id, course_id, source_title,
    content, chunk_index, chunk_type, embedding, word_count, difficulty_level, topics,
    learning_objectives, estimated_study_time";

/// Opens (creating if missing) the database at `db_path`.
pub async fn open_pool(db_path: &Path) -> Result<SqlitePool, ApiError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(ApiError::internal)
}

/// Runs each statement in order against `pool`.
async fn execute_all(pool: &SqlitePool, statements: &[&str]) -> Result<(), ApiError> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(ApiError::internal)?;
    }
    Ok(())
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    dimension: usize,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: &Path, dimension: usize) -> Result<Self, ApiError> {
        Self::from_pool(open_pool(db_path).await?, dimension).await
    }

    pub async fn from_pool(pool: SqlitePool, dimension: usize) -> Result<Self, ApiError> {
        let store = Self { pool, dimension };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                id TEXT PRIMARY KEY,
                parent_document_id TEXT,
                resource_id TEXT,
                course_id TEXT NOT NULL,
                source_title TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                chunk_type TEXT NOT NULL DEFAULT 'text',
                embedding BLOB NOT NULL,
                word_count INTEGER NOT NULL DEFAULT 0,
                difficulty_level INTEGER NOT NULL DEFAULT 1,
                topics TEXT NOT NULL DEFAULT '[]',
                learning_objectives TEXT NOT NULL DEFAULT '[]',
                estimated_study_time REAL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        execute_all(
            &self.pool,
            &[
                "CREATE INDEX IF NOT EXISTS idx_rag_chunks_course ON rag_chunks(course_id)",
                "CREATE INDEX IF NOT EXISTS idx_rag_chunks_parent ON rag_chunks(parent_document_id)",
            ],
        )
        .await
    }

    fn row_to_chunk(row: &SqliteRow) -> Result<Chunk, ApiError> {
        let chunk_type: String = row.get("chunk_type");
        let topics: String = row.get("topics");
        let objectives: String = row.get("learning_objectives");
        let embedding: Vec<u8> = row.get("embedding");
        let chunk_index: i64 = row.get("chunk_index");
        let word_count: i64 = row.get("word_count");
        let difficulty_level: i64 = row.get("difficulty_level");
        let study_time: Option<f64> = row.get("estimated_study_time");

        Ok(Chunk {
            id: row.get("id"),
            parent_document_id: row.get("parent_document_id"),
            resource_id: row.get("resource_id"),
            course_id: row.get("course_id"),
            source_title: row.get("source_title"),
            content: row.get("content"),
            chunk_index: chunk_index.max(0) as usize,
            chunk_type: chunk_type.parse::<ChunkType>()?,
            embedding: deserialize_embedding(&embedding),
            word_count: word_count.max(0) as usize,
            difficulty_level: difficulty_level.clamp(1, 5) as u8,
            topics: serde_json::from_str(&topics).map_err(ApiError::internal)?,
            learning_objectives: serde_json::from_str(&objectives).map_err(ApiError::internal)?,
            estimated_study_time: study_time.map(|v| v as f32),
        })
    }

    async fn insert_in(tx: &mut Transaction<'_, Sqlite>, chunk: &Chunk) -> Result<(), ApiError> {
        let topics = serde_json::to_string(&chunk.topics).map_err(ApiError::internal)?;
        let objectives =
            serde_json::to_string(&chunk.learning_objectives).map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT OR REPLACE INTO rag_chunks (
                id, parent_document_id, resource_id, course_id, source_title, content,
                chunk_index, chunk_type, embedding, word_count, difficulty_level, topics,
                learning_objectives, estimated_study_time
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&chunk.id)
        .bind(&chunk.parent_document_id)
        .bind(&chunk.resource_id)
        .bind(&chunk.course_id)
        .bind(&chunk.source_title)
        .bind(&chunk.content)
        .bind(chunk.chunk_index as i64)
        .bind(chunk.chunk_type.as_str())
        .bind(serialize_embedding(&chunk.embedding))
        .bind(chunk.word_count as i64)
        .bind(chunk.difficulty_level as i64)
        .bind(&topics)
        .bind(&objectives)
        .bind(chunk.estimated_study_time.map(f64::from))
        .execute(&mut **tx)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn fetch_course_rows(&self, course_id: &str) -> Result<Vec<Chunk>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM rag_chunks WHERE course_id = ?1"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(Self::row_to_chunk).collect()
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, chunk: Chunk) -> Result<(), ApiError> {
        self.upsert_batch(vec![chunk]).await
    }

    async fn upsert_batch(&self, chunks: Vec<Chunk>) -> Result<(), ApiError> {
        if chunks.is_empty() {
            return Ok(());
        }
        for chunk in &chunks {
            check_dimension(chunk, self.dimension)?;
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for chunk in &chunks {
            Self::insert_in(&mut tx, chunk).await?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(&self, query: SearchQuery<'_>) -> Result<Vec<ScoredChunk>, ApiError> {
        let candidates: Vec<Chunk> = self
            .fetch_course_rows(query.course_id)
            .await?
            .into_iter()
            .filter(|chunk| query.admits(chunk))
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
        let row = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM rag_chunks WHERE id = ?1"
        ))
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.as_ref().map(Self::row_to_chunk).transpose()
    }

    async fn list_for_course(&self, course_id: &str) -> Result<Vec<Chunk>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM rag_chunks WHERE course_id = ?1
             ORDER BY source_title ASC, chunk_index ASC, id ASC"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn delete_by_parent(&self, parent_document_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM rag_chunks WHERE parent_document_id = ?1")
            .bind(parent_document_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_by_course(&self, course_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM rag_chunks WHERE course_id = ?1")
            .bind(course_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, course_id: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(course_id) = course_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks WHERE course_id = ?1")
                .bind(course_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(count as usize)
    }
}
