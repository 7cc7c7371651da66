//! Append-only record of every retrieval + generation invocation.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    StudyPlanCreation,
    QuestionAnswer,
    Chat,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::StudyPlanCreation => "study_plan_creation",
            QueryType::QuestionAnswer => "question_answer",
            QueryType::Chat => "chat",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "study_plan_creation" => Ok(QueryType::StudyPlanCreation),
            "question_answer" => Ok(QueryType::QuestionAnswer),
            "chat" => Ok(QueryType::Chat),
            other => Err(ApiError::BadRequest(format!("unknown query type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagQuery {
    pub user_id: String,
    pub query_text: String,
    pub query_type: QueryType,
    #[serde(skip_serializing)]
    pub query_embedding: Vec<f32>,
    pub retrieved_chunk_ids: Vec<String>,
    pub generated_response: String,
    pub created_at: DateTime<Utc>,
}

impl RagQuery {
    pub fn new(user_id: &str, query_text: &str, query_type: QueryType) -> Self {
        Self {
            user_id: user_id.to_string(),
            query_text: query_text.to_string(),
            query_type,
            query_embedding: Vec::new(),
            retrieved_chunk_ids: Vec::new(),
            generated_response: String::new(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait QueryLog: Send + Sync {
    async fn append(&self, record: RagQuery) -> Result<(), ApiError>;

    /// In insertion order.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RagQuery>, ApiError>;
}

#[derive(Default)]
pub struct InMemoryQueryLog {
    records: RwLock<Vec<RagQuery>>,
}

impl InMemoryQueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl QueryLog for InMemoryQueryLog {
    async fn append(&self, record: RagQuery) -> Result<(), ApiError> {
        tracing::debug!(
            user_id = %record.user_id,
            query_type = %record.query_type,
            chunks = record.retrieved_chunk_ids.len(),
            "Recording RAG query"
        );
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RagQuery>, ApiError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_is_append_only_and_per_user() {
        let log = InMemoryQueryLog::new();
        log.append(RagQuery::new("u1", "plan please", QueryType::StudyPlanCreation))
            .await
            .unwrap();
        log.append(RagQuery::new("u2", "what is a heap", QueryType::QuestionAnswer))
            .await
            .unwrap();
        log.append(RagQuery::new("u1", "hi", QueryType::Chat)).await.unwrap();

        let records = log.list_for_user("u1").await.unwrap();
        let types: Vec<QueryType> = records.iter().map(|r| r.query_type).collect();
        assert_eq!(types, vec![QueryType::StudyPlanCreation, QueryType::Chat]);
        assert_eq!(log.len().await, 3);
    }
}
