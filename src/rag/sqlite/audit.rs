use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{deserialize_embedding, execute_all, serialize_embedding};
use crate::core::errors::ApiError;
use crate::rag::audit::{QueryLog, QueryType, RagQuery};

/// Append-only `rag_queries` table; row ids preserve insertion order.
#[derive(Clone)]
pub struct SqliteQueryLog {
    pool: SqlitePool,
}

impl SqliteQueryLog {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let log = Self { pool };
        log.init_schema().await?;
        Ok(log)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        execute_all(
            &self.pool,
            &[
                "CREATE TABLE IF NOT EXISTS rag_queries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    query_text TEXT NOT NULL,
                    query_type TEXT NOT NULL,
                    query_embedding BLOB,
                    retrieved_chunk_ids TEXT NOT NULL DEFAULT '[]',
                    generated_response TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_rag_queries_user ON rag_queries(user_id)",
            ],
        )
        .await
    }

    fn row_to_record(row: &SqliteRow) -> Result<RagQuery, ApiError> {
        let query_type: String = row.get("query_type");
        let embedding: Option<Vec<u8>> = row.get("query_embedding");
        let chunk_ids: String = row.get("retrieved_chunk_ids");
        let created_at: String = row.get("created_at");

        Ok(RagQuery {
            user_id: row.get("user_id"),
            query_text: row.get("query_text"),
            query_type: query_type.parse::<QueryType>()?,
            query_embedding: embedding
                .map(|bytes| deserialize_embedding(&bytes))
                .unwrap_or_default(),
            retrieved_chunk_ids: serde_json::from_str(&chunk_ids).map_err(ApiError::internal)?,
            generated_response: row.get("generated_response"),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(ApiError::internal)?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl QueryLog for SqliteQueryLog {
    async fn append(&self, record: RagQuery) -> Result<(), ApiError> {
        tracing::debug!(
            user_id = %record.user_id,
            query_type = %record.query_type,
            chunks = record.retrieved_chunk_ids.len(),
            "Recording RAG query"
        );
        let chunk_ids =
            serde_json::to_string(&record.retrieved_chunk_ids).map_err(ApiError::internal)?;
        let embedding =
            (!record.query_embedding.is_empty()).then(|| serialize_embedding(&record.query_embedding));

        sqlx::query(
            "INSERT INTO rag_queries (
                user_id, query_text, query_type, query_embedding, retrieved_chunk_ids,
                generated_response, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.user_id)
        .bind(&record.query_text)
        .bind(record.query_type.as_str())
        .bind(embedding)
        .bind(&chunk_ids)
        .bind(&record.generated_response)
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RagQuery>, ApiError> {
        let rows = sqlx::query(
            "SELECT user_id, query_text, query_type, query_embedding, retrieved_chunk_ids,
                    generated_response, created_at
             FROM rag_queries WHERE user_id = ?1 ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::open_pool;

    #[tokio::test]
    async fn query_log_survives_a_reopen_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studybud.db");

        {
            let log = SqliteQueryLog::new(open_pool(&path).await.unwrap())
                .await
                .unwrap();
            let mut plan = RagQuery::new("u1", "plan please", QueryType::StudyPlanCreation);
            plan.query_embedding = vec![0.5, -1.0, 0.25];
            plan.retrieved_chunk_ids = vec!["doc_1_chunk_0".to_string(), "doc_1_chunk_3".to_string()];
            plan.generated_response = "{\"title\": \"Week plan\"}".to_string();
            log.append(plan).await.unwrap();
            log.append(RagQuery::new("u2", "what is a heap", QueryType::QuestionAnswer))
                .await
                .unwrap();
            log.append(RagQuery::new("u1", "hi", QueryType::Chat)).await.unwrap();
        }

        let reopened = SqliteQueryLog::new(open_pool(&path).await.unwrap())
            .await
            .unwrap();
        let records = reopened.list_for_user("u1").await.unwrap();
        let types: Vec<QueryType> = records.iter().map(|r| r.query_type).collect();
        assert_eq!(types, vec![QueryType::StudyPlanCreation, QueryType::Chat]);
        assert_eq!(records[0].query_embedding, vec![0.5, -1.0, 0.25]);
        assert_eq!(records[0].retrieved_chunk_ids.len(), 2);
        assert_eq!(records[0].generated_response, "{\"title\": \"Week plan\"}");
        assert!(records[1].query_embedding.is_empty());
        assert!(reopened.list_for_user("nobody").await.unwrap().is_empty());
    }
}
