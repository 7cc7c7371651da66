//! Deduplicated topic entities linking the chunks that discuss them.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::core::errors::ApiError;
use crate::text::{char_len, collapse_whitespace};

pub const MIN_TOPIC_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeNode {
    pub id: String,
    /// Display form as first seen.
    pub topic: String,
    pub description: String,
    pub confidence_score: f32,
    pub difficulty_level: u8,
    pub prerequisites: Vec<String>,
    pub estimated_study_hours: f32,
    pub source_type: String,
    pub course_ids: BTreeSet<String>,
    pub related_chunk_ids: BTreeSet<String>,
}

/// Values used only when the node does not exist yet.
#[derive(Debug, Clone)]
pub struct NodeDefaults {
    pub description: String,
    pub confidence_score: f32,
    pub source_type: String,
}

impl NodeDefaults {
    pub fn new(source_type: &str, description: String, confidence_score: f32) -> Self {
        Self {
            description,
            confidence_score,
            source_type: source_type.to_string(),
        }
    }
}

/// Case- and whitespace-insensitive identity of a topic.
pub fn normalize_topic(topic: &str) -> String {
    collapse_whitespace(topic).to_lowercase()
}

pub fn node_id(topic: &str) -> String {
    let digest = Sha256::digest(normalize_topic(topic).as_bytes());
    format!("kn_{}", hex::encode(&digest[..8]))
}

/// Node id and display form, or an error for topics under
/// [`MIN_TOPIC_CHARS`].
pub(crate) fn prepare_topic(topic: &str) -> Result<(String, String), ApiError> {
    let topic_display = collapse_whitespace(topic);
    if char_len(&topic_display) < MIN_TOPIC_CHARS {
        return Err(ApiError::BadRequest(format!("topic too short: {topic:?}")));
    }
    Ok((node_id(&topic_display), topic_display))
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Returns the node for `topic`, creating it with `defaults` if absent.
    /// An existing node keeps its description; its confidence becomes the
    /// larger of the two and `course_id` is added to its courses.
    async fn get_or_create(
        &self,
        topic: &str,
        course_id: &str,
        defaults: NodeDefaults,
    ) -> Result<KnowledgeNode, ApiError>;

    async fn link_chunk(&self, node_id: &str, chunk_id: &str) -> Result<(), ApiError>;

    /// Drops references to deleted chunks.
    async fn unlink_chunks(&self, chunk_ids: &[String]) -> Result<usize, ApiError>;

    /// Ordered by topic.
    async fn list_for_course(&self, course_id: &str) -> Result<Vec<KnowledgeNode>, ApiError>;

    async fn refine_confidence(&self, node_id: &str, confidence: f32) -> Result<(), ApiError>;
}

#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    nodes: RwLock<HashMap<String, KnowledgeNode>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn get_or_create(
        &self,
        topic: &str,
        course_id: &str,
        defaults: NodeDefaults,
    ) -> Result<KnowledgeNode, ApiError> {
        let (id, topic_display) = prepare_topic(topic)?;
        let mut guard = self.nodes.write().await;
        let node = guard.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(topic = %topic_display, "Creating knowledge node");
            KnowledgeNode {
                id,
                topic: topic_display,
                description: defaults.description.clone(),
                confidence_score: 0.0,
                difficulty_level: 3,
                prerequisites: Vec::new(),
                estimated_study_hours: 1.0,
                source_type: defaults.source_type.clone(),
                course_ids: BTreeSet::new(),
                related_chunk_ids: BTreeSet::new(),
            }
        });
        node.confidence_score = node
            .confidence_score
            .max(defaults.confidence_score.clamp(0.0, 1.0));
        node.course_ids.insert(course_id.to_string());
        Ok(node.clone())
    }

    async fn link_chunk(&self, node_id: &str, chunk_id: &str) -> Result<(), ApiError> {
        let mut guard = self.nodes.write().await;
        let node = guard
            .get_mut(node_id)
            .ok_or_else(|| ApiError::NotFound(format!("knowledge node {node_id}")))?;
        node.related_chunk_ids.insert(chunk_id.to_string());
        Ok(())
    }

    async fn unlink_chunks(&self, chunk_ids: &[String]) -> Result<usize, ApiError> {
        let mut guard = self.nodes.write().await;
        let mut removed = 0;
        for node in guard.values_mut() {
            for chunk_id in chunk_ids {
                if node.related_chunk_ids.remove(chunk_id) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn list_for_course(&self, course_id: &str) -> Result<Vec<KnowledgeNode>, ApiError> {
        let mut nodes: Vec<KnowledgeNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|node| node.course_ids.contains(course_id))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.topic.cmp(&b.topic));
        Ok(nodes)
    }

    async fn refine_confidence(&self, node_id: &str, confidence: f32) -> Result<(), ApiError> {
        let mut guard = self.nodes.write().await;
        let node = guard
            .get_mut(node_id)
            .ok_or_else(|| ApiError::NotFound(format!("knowledge node {node_id}")))?;
        node.confidence_score = confidence.clamp(0.0, 1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_defaults(topic: &str) -> NodeDefaults {
        NodeDefaults::new("quiz", format!("Quiz content about {topic}"), 0.8)
    }

    #[tokio::test]
    async fn get_or_create_merges_by_normalized_topic() {
        let store = InMemoryKnowledgeStore::new();
        let first = store
            .get_or_create("Binary  Trees", "cs101", quiz_defaults("Binary Trees"))
            .await
            .unwrap();
        let second = store
            .get_or_create(
                "binary trees",
                "cs201",
                NodeDefaults::new("syllabus", "Syllabus content about binary trees".into(), 0.9),
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.topic, "Binary Trees");
        assert_eq!(second.description, "Quiz content about Binary Trees");
        assert_eq!(second.confidence_score, 0.9);
        assert_eq!(second.course_ids.len(), 2);
    }

    #[tokio::test]
    async fn short_topics_are_rejected() {
        let store = InMemoryKnowledgeStore::new();
        assert!(store
            .get_or_create(" DP ", "cs101", quiz_defaults("DP"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn links_are_scoped_and_removable() {
        let store = InMemoryKnowledgeStore::new();
        let node = store
            .get_or_create("Heaps", "cs101", quiz_defaults("Heaps"))
            .await
            .unwrap();
        store.link_chunk(&node.id, "chunk-1").await.unwrap();
        store.link_chunk(&node.id, "chunk-2").await.unwrap();
        assert!(store.link_chunk("kn_missing", "chunk-1").await.is_err());

        assert!(store.list_for_course("cs999").await.unwrap().is_empty());
        let listed = store.list_for_course("cs101").await.unwrap();
        assert_eq!(listed[0].related_chunk_ids.len(), 2);

        let removed = store.unlink_chunks(&["chunk-1".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        store.refine_confidence(&node.id, 1.7).await.unwrap();
        let listed = store.list_for_course("cs101").await.unwrap();
        assert_eq!(listed[0].related_chunk_ids.len(), 1);
        assert_eq!(listed[0].confidence_score, 1.0);
    }
}
