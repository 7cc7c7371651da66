use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::core::errors::ApiError;
use crate::text::truncate_chars;

/// Stored document text is capped at this many characters.
pub const MAX_DOCUMENT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Quiz,
    Assignment,
    Syllabus,
    Resource,
    Textbook,
    Paper,
    Notes,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quiz => "quiz",
            DocumentType::Assignment => "assignment",
            DocumentType::Syllabus => "syllabus",
            DocumentType::Resource => "resource",
            DocumentType::Textbook => "textbook",
            DocumentType::Paper => "paper",
            DocumentType::Notes => "notes",
            DocumentType::Other => "other",
        }
    }

    /// Prefix used in document titles, e.g. `Quiz: Midterm 1`.
    pub fn title_prefix(&self) -> Option<&'static str> {
        match self {
            DocumentType::Quiz => Some("Quiz"),
            DocumentType::Assignment => Some("Assignment"),
            DocumentType::Syllabus => Some("Syllabus"),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiz" => Ok(DocumentType::Quiz),
            "assignment" => Ok(DocumentType::Assignment),
            "syllabus" | "course_syllabus" => Ok(DocumentType::Syllabus),
            "resource" => Ok(DocumentType::Resource),
            "textbook" => Ok(DocumentType::Textbook),
            "paper" => Ok(DocumentType::Paper),
            "notes" => Ok(DocumentType::Notes),
            "other" => Ok(DocumentType::Other),
            other => Err(ApiError::BadRequest(format!("unknown document type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub full_text: String,
    pub document_type: DocumentType,
    pub source_reference: String,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// New document with a fresh id; text beyond [`MAX_DOCUMENT_CHARS`] is
    /// dropped.
    pub fn new(
        title: impl Into<String>,
        full_text: &str,
        document_type: DocumentType,
        source_reference: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("doc_{}", uuid::Uuid::new_v4().simple()),
            title: title.into(),
            full_text: truncate_chars(full_text, MAX_DOCUMENT_CHARS).to_string(),
            document_type,
            source_reference: source_reference.into(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn course_id(&self) -> Option<&str> {
        self.metadata.get("course_id").and_then(Value::as_str)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: Document) -> Result<(), ApiError>;

    async fn get(&self, document_id: &str) -> Result<Option<Document>, ApiError>;

    async fn delete(&self, document_id: &str) -> Result<bool, ApiError>;

    /// Oldest first.
    async fn list_for_course(&self, course_id: &str) -> Result<Vec<Document>, ApiError>;
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, document: Document) -> Result<(), ApiError> {
        let mut guard = self.documents.write().await;
        if guard.contains_key(&document.id) {
            return Err(ApiError::BadRequest(format!(
                "document {} already exists",
                document.id
            )));
        }
        guard.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<Document>, ApiError> {
        Ok(self.documents.read().await.get(document_id).cloned())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, ApiError> {
        Ok(self.documents.write().await.remove(document_id).is_some())
    }

    async fn list_for_course(&self, course_id: &str) -> Result<Vec<Document>, ApiError> {
        let mut documents: Vec<Document> = self
            .documents
            .read()
            .await
            .values()
            .filter(|doc| doc.course_id() == Some(course_id))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_text_is_capped() {
        let doc = Document::new("Syllabus: CS101", &"a".repeat(12_000), DocumentType::Syllabus, "");
        assert_eq!(doc.full_text.len(), MAX_DOCUMENT_CHARS);
        assert!(doc.id.starts_with("doc_"));
    }

    #[test]
    fn document_types_parse_legacy_names() {
        assert_eq!("course_syllabus".parse::<DocumentType>().unwrap(), DocumentType::Syllabus);
        assert_eq!("Quiz".parse::<DocumentType>().unwrap(), DocumentType::Quiz);
        assert!("video".parse::<DocumentType>().is_err());
    }

    #[tokio::test]
    async fn store_filters_by_course_metadata() {
        let store = InMemoryDocumentStore::new();
        let doc = Document::new("Quiz: Heaps", "text", DocumentType::Quiz, "uploads/q1.pdf")
            .with_metadata("course_id", "cs101");
        let id = doc.id.clone();
        store.insert(doc.clone()).await.unwrap();
        assert!(store.insert(doc).await.is_err());
        store
            .insert(Document::new("Notes", "text", DocumentType::Notes, "").with_metadata("course_id", "cs201"))
            .await
            .unwrap();

        let listed = store.list_for_course("cs101").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
