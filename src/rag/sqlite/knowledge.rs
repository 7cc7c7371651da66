use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::execute_all;
use crate::core::errors::ApiError;
use crate::rag::knowledge::{prepare_topic, KnowledgeNode, KnowledgeStore, NodeDefaults};

const NODE_COLUMNS: &str = "id, topic, description, confidence_score, difficulty_level,
    prerequisites, estimated_study_hours, source_type";

/// Knowledge nodes with their course and chunk links in side tables.
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        execute_all(
            &self.pool,
            &[
                "CREATE TABLE IF NOT EXISTS knowledge_nodes (
                    id TEXT PRIMARY KEY,
                    topic TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    confidence_score REAL NOT NULL DEFAULT 0,
                    difficulty_level INTEGER NOT NULL DEFAULT 3,
                    prerequisites TEXT NOT NULL DEFAULT '[]',
                    estimated_study_hours REAL NOT NULL DEFAULT 1,
                    source_type TEXT NOT NULL DEFAULT ''
                )",
                "CREATE TABLE IF NOT EXISTS knowledge_node_courses (
                    node_id TEXT NOT NULL REFERENCES knowledge_nodes(id) ON DELETE CASCADE,
                    course_id TEXT NOT NULL,
                    PRIMARY KEY (node_id, course_id)
                )",
                "CREATE TABLE IF NOT EXISTS knowledge_node_chunks (
                    node_id TEXT NOT NULL REFERENCES knowledge_nodes(id) ON DELETE CASCADE,
                    chunk_id TEXT NOT NULL,
                    PRIMARY KEY (node_id, chunk_id)
                )",
                "CREATE INDEX IF NOT EXISTS idx_knowledge_node_courses_course
                 ON knowledge_node_courses(course_id)",
                "CREATE INDEX IF NOT EXISTS idx_knowledge_node_chunks_chunk
                 ON knowledge_node_chunks(chunk_id)",
            ],
        )
        .await
    }

    async fn load(&self, node_id: &str) -> Result<Option<KnowledgeNode>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM knowledge_nodes WHERE id = ?1"
        ))
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<KnowledgeNode, ApiError> {
        let id: String = row.get("id");
        let prerequisites: String = row.get("prerequisites");
        let confidence: f64 = row.get("confidence_score");
        let difficulty: i64 = row.get("difficulty_level");
        let hours: f64 = row.get("estimated_study_hours");

        let course_ids: Vec<String> =
            sqlx::query_scalar("SELECT course_id FROM knowledge_node_courses WHERE node_id = ?1")
                .bind(&id)
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        let chunk_ids: Vec<String> =
            sqlx::query_scalar("SELECT chunk_id FROM knowledge_node_chunks WHERE node_id = ?1")
                .bind(&id)
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(KnowledgeNode {
            id,
            topic: row.get("topic"),
            description: row.get("description"),
            confidence_score: confidence as f32,
            difficulty_level: difficulty.clamp(1, 5) as u8,
            prerequisites: serde_json::from_str(&prerequisites).map_err(ApiError::internal)?,
            estimated_study_hours: hours as f32,
            source_type: row.get("source_type"),
            course_ids: course_ids.into_iter().collect::<BTreeSet<_>>(),
            related_chunk_ids: chunk_ids.into_iter().collect::<BTreeSet<_>>(),
        })
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn get_or_create(
        &self,
        topic: &str,
        course_id: &str,
        defaults: NodeDefaults,
    ) -> Result<KnowledgeNode, ApiError> {
        let (id, topic_display) = prepare_topic(topic)?;
        let confidence = f64::from(defaults.confidence_score.clamp(0.0, 1.0));

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO knowledge_nodes (id, topic, description, source_type)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(&topic_display)
        .bind(&defaults.description)
        .bind(&defaults.source_type)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "UPDATE knowledge_nodes SET confidence_score = MAX(confidence_score, ?2) WHERE id = ?1",
        )
        .bind(&id)
        .bind(confidence)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT OR IGNORE INTO knowledge_node_courses (node_id, course_id) VALUES (?1, ?2)",
        )
        .bind(&id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;

        if inserted.rows_affected() > 0 {
            tracing::debug!(topic = %topic_display, "Creating knowledge node");
        }
        self.load(&id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("knowledge node {id} vanished")))
    }

    async fn link_chunk(&self, node_id: &str, chunk_id: &str) -> Result<(), ApiError> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_nodes WHERE id = ?1")
            .bind(node_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        if exists == 0 {
            return Err(ApiError::NotFound(format!("knowledge node {node_id}")));
        }

        sqlx::query("INSERT OR IGNORE INTO knowledge_node_chunks (node_id, chunk_id) VALUES (?1, ?2)")
            .bind(node_id)
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn unlink_chunks(&self, chunk_ids: &[String]) -> Result<usize, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut removed = 0;
        for chunk_id in chunk_ids {
            let result = sqlx::query("DELETE FROM knowledge_node_chunks WHERE chunk_id = ?1")
                .bind(chunk_id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
            removed += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(removed)
    }

    async fn list_for_course(&self, course_id: &str) -> Result<Vec<KnowledgeNode>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM knowledge_nodes
             WHERE id IN (SELECT node_id FROM knowledge_node_courses WHERE course_id = ?1)
             ORDER BY topic ASC"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(self.hydrate(row).await?);
        }
        Ok(nodes)
    }

    async fn refine_confidence(&self, node_id: &str, confidence: f32) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE knowledge_nodes SET confidence_score = ?2 WHERE id = ?1")
            .bind(node_id)
            .bind(f64::from(confidence.clamp(0.0, 1.0)))
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("knowledge node {node_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::open_pool;

    fn defaults(label: &str, topic: &str, confidence: f32) -> NodeDefaults {
        NodeDefaults::new(
            &label.to_lowercase(),
            format!("{label} content about {topic}"),
            confidence,
        )
    }

    #[tokio::test]
    async fn nodes_merge_and_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studybud.db");

        {
            let store = SqliteKnowledgeStore::new(open_pool(&path).await.unwrap())
                .await
                .unwrap();
            let first = store
                .get_or_create("Binary  Trees", "cs101", defaults("Quiz", "Binary Trees", 0.8))
                .await
                .unwrap();
            let second = store
                .get_or_create("binary trees", "cs201", defaults("Syllabus", "binary trees", 0.9))
                .await
                .unwrap();
            assert_eq!(first.id, second.id);
            assert_eq!(second.topic, "Binary Trees");
            assert_eq!(second.description, "Quiz content about Binary Trees");
            store.link_chunk(&first.id, "doc_1_chunk_0").await.unwrap();
            store.link_chunk(&first.id, "doc_1_chunk_1").await.unwrap();
            assert!(store.link_chunk("kn_missing", "doc_1_chunk_0").await.is_err());
        }

        let reopened = SqliteKnowledgeStore::new(open_pool(&path).await.unwrap())
            .await
            .unwrap();
        let nodes = reopened.list_for_course("cs201").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!((nodes[0].confidence_score - 0.9).abs() < 1e-6);
        assert_eq!(nodes[0].course_ids.len(), 2);
        assert_eq!(nodes[0].related_chunk_ids.len(), 2);
        assert!(reopened.list_for_course("cs999").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlinking_and_refining_update_stored_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteKnowledgeStore::new(open_pool(&dir.path().join("k.db")).await.unwrap())
            .await
            .unwrap();
        let node = store
            .get_or_create("Heaps", "cs101", defaults("Quiz", "Heaps", 0.8))
            .await
            .unwrap();
        store.link_chunk(&node.id, "c1").await.unwrap();
        store.link_chunk(&node.id, "c2").await.unwrap();

        let removed = store.unlink_chunks(&["c1".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        store.refine_confidence(&node.id, 1.7).await.unwrap();
        assert!(store.refine_confidence("kn_missing", 0.5).await.is_err());
        assert!(store.get_or_create(" DP ", "cs101", defaults("Quiz", "DP", 0.8)).await.is_err());

        let listed = store.list_for_course("cs101").await.unwrap();
        assert_eq!(listed[0].related_chunk_ids.len(), 1);
        assert_eq!(listed[0].confidence_score, 1.0);
    }
}
