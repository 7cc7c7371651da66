use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::execute_all;
use crate::core::errors::ApiError;
use crate::rag::documents::{Document, DocumentStore, DocumentType};

const DOCUMENT_COLUMNS: &str =
    "id, title, full_text, document_type, source_reference, metadata, created_at";

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        execute_all(
            &self.pool,
            &[
                "CREATE TABLE IF NOT EXISTS documents (
                    id TEXT PRIMARY KEY,
                    course_id TEXT,
                    title TEXT NOT NULL,
                    full_text TEXT NOT NULL DEFAULT '',
                    document_type TEXT NOT NULL,
                    source_reference TEXT NOT NULL DEFAULT '',
                    metadata TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_documents_course ON documents(course_id)",
            ],
        )
        .await
    }

    fn row_to_document(row: &SqliteRow) -> Result<Document, ApiError> {
        let document_type: String = row.get("document_type");
        let metadata: String = row.get("metadata");
        let created_at: String = row.get("created_at");

        Ok(Document {
            id: row.get("id"),
            title: row.get("title"),
            full_text: row.get("full_text"),
            document_type: document_type.parse::<DocumentType>()?,
            source_reference: row.get("source_reference"),
            metadata: serde_json::from_str(&metadata).map_err(ApiError::internal)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(ApiError::internal)?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, document: Document) -> Result<(), ApiError> {
        let metadata = serde_json::to_string(&document.metadata).map_err(ApiError::internal)?;
        // Fixed-width timestamps keep text ordering chronological.
        let created_at = document
            .created_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let result = sqlx::query(
            "INSERT OR IGNORE INTO documents (
                id, course_id, title, full_text, document_type, source_reference, metadata,
                created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&document.id)
        .bind(document.course_id())
        .bind(&document.title)
        .bind(&document.full_text)
        .bind(document.document_type.as_str())
        .bind(&document.source_reference)
        .bind(&metadata)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::BadRequest(format!(
                "document {} already exists",
                document.id
            )));
        }
        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<Document>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn delete(&self, document_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_course(&self, course_id: &str) -> Result<Vec<Document>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE course_id = ?1
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(Self::row_to_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::open_pool;

    #[tokio::test]
    async fn documents_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studybud.db");
        let document = Document::new(
            "Syllabus: Algorithms",
            "Sorting, searching and graphs.",
            DocumentType::Syllabus,
            "uploads/syllabus.pdf",
        )
        .with_metadata("course_id", "cs101")
        .with_metadata("topics", serde_json::json!(["Sorting", "Graphs"]));
        let id = document.id.clone();

        {
            let store = SqliteDocumentStore::new(open_pool(&path).await.unwrap())
                .await
                .unwrap();
            store.insert(document.clone()).await.unwrap();
            assert!(store.insert(document.clone()).await.is_err());
        }

        let reopened = SqliteDocumentStore::new(open_pool(&path).await.unwrap())
            .await
            .unwrap();
        let loaded = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.title, document.title);
        assert_eq!(loaded.full_text, document.full_text);
        assert_eq!(loaded.document_type, DocumentType::Syllabus);
        assert_eq!(loaded.source_reference, "uploads/syllabus.pdf");
        assert_eq!(loaded.metadata, document.metadata);
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            document.created_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn listing_is_scoped_and_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteDocumentStore::new(open_pool(&dir.path().join("d.db")).await.unwrap())
            .await
            .unwrap();
        let mut older = Document::new("Quiz: Heaps", "text", DocumentType::Quiz, "q1.pdf")
            .with_metadata("course_id", "cs101");
        older.created_at = older.created_at - chrono::Duration::days(1);
        let newer = Document::new("Notes", "text", DocumentType::Notes, "n1.txt")
            .with_metadata("course_id", "cs101");
        let elsewhere = Document::new("Notes", "text", DocumentType::Notes, "n2.txt")
            .with_metadata("course_id", "cs202");
        let older_id = older.id.clone();

        store.insert(newer).await.unwrap();
        store.insert(older).await.unwrap();
        store.insert(elsewhere).await.unwrap();

        let listed = store.list_for_course("cs101").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older_id);

        assert!(store.delete(&older_id).await.unwrap());
        assert!(!store.delete(&older_id).await.unwrap());
        assert_eq!(store.list_for_course("cs101").await.unwrap().len(), 1);
    }
}
