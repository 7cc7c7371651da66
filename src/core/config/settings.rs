use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub plan_temperature: f32,
    pub answer_temperature: f32,
    pub chat_temperature: f32,
    pub max_tokens: u32,
    pub answer_max_tokens: u32,
    pub topic_max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimension: usize,
    /// Input is cut to this many characters before the call.
    pub max_chars: usize,
    pub batch_size: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkingSettings {
    pub target_size: usize,
    pub overlap: usize,
    pub course_file_size: usize,
    pub sentence_group_cap: usize,
    pub min_chunk_chars: usize,
    pub min_paragraph_chars: usize,
    pub min_sentence_chars: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub similarity_threshold: Option<f32>,
    pub timeout: Duration,
    pub recent_plans: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSettings {
    pub max_requests: usize,
    pub window_minutes: u64,
    pub use_rag: bool,
}

/// Typed, defaulted view over the merged YAML configuration.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RagSettings {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub chat: ChatSettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            plan_temperature: 0.7,
            answer_temperature: 0.3,
            chat_temperature: 0.7,
            max_tokens: 2000,
            answer_max_tokens: 1000,
            topic_max_tokens: 200,
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            max_chars: 8000,
            batch_size: 64,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
            course_file_size: 1500,
            sentence_group_cap: 500,
            min_chunk_chars: 50,
            min_paragraph_chars: 50,
            min_sentence_chars: 20,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 15,
            similarity_threshold: None,
            timeout: Duration::from_secs(10),
            recent_plans: 3,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_minutes: 60,
            use_rag: true,
        }
    }
}

impl RagSettings {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        let llm = config.get("llm");
        let embedding = config.get("embedding");
        let chunking = config.get("chunking");
        let retrieval = config.get("retrieval");
        let chat = config.get("chat");

        let llm = LlmSettings {
            base_url: string_or(llm, "base_url", &defaults.llm.base_url),
            model: string_or(llm, "model", &defaults.llm.model),
            api_key: llm
                .and_then(|v| v.get("api_key"))
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            plan_temperature: f32_or(llm, "plan_temperature", defaults.llm.plan_temperature),
            answer_temperature: f32_or(llm, "answer_temperature", defaults.llm.answer_temperature),
            chat_temperature: f32_or(llm, "chat_temperature", defaults.llm.chat_temperature),
            max_tokens: u64_or(llm, "max_tokens", defaults.llm.max_tokens as u64) as u32,
            answer_max_tokens: u64_or(
                llm,
                "answer_max_tokens",
                defaults.llm.answer_max_tokens as u64,
            ) as u32,
            topic_max_tokens: u64_or(llm, "topic_max_tokens", defaults.llm.topic_max_tokens as u64)
                as u32,
            timeout: secs_or(llm, defaults.llm.timeout),
        };

        let embedding = EmbeddingSettings {
            model: string_or(embedding, "model", &defaults.embedding.model),
            dimension: u64_or(embedding, "dimension", defaults.embedding.dimension as u64)
                .max(1) as usize,
            max_chars: u64_or(embedding, "max_chars", defaults.embedding.max_chars as u64) as usize,
            batch_size: u64_or(embedding, "batch_size", defaults.embedding.batch_size as u64)
                .clamp(1, 2048) as usize,
            timeout: secs_or(embedding, defaults.embedding.timeout),
        };

        let target_size =
            u64_or(chunking, "target_size", defaults.chunking.target_size as u64).max(50) as usize;
        let chunking = ChunkingSettings {
            target_size,
            overlap: (u64_or(chunking, "overlap", defaults.chunking.overlap as u64) as usize)
                .min(target_size.saturating_sub(1)),
            course_file_size: u64_or(
                chunking,
                "course_file_size",
                defaults.chunking.course_file_size as u64,
            ) as usize,
            sentence_group_cap: u64_or(
                chunking,
                "sentence_group_cap",
                defaults.chunking.sentence_group_cap as u64,
            ) as usize,
            min_chunk_chars: u64_or(
                chunking,
                "min_chunk_chars",
                defaults.chunking.min_chunk_chars as u64,
            ) as usize,
            min_paragraph_chars: u64_or(
                chunking,
                "min_paragraph_chars",
                defaults.chunking.min_paragraph_chars as u64,
            ) as usize,
            min_sentence_chars: u64_or(
                chunking,
                "min_sentence_chars",
                defaults.chunking.min_sentence_chars as u64,
            ) as usize,
        };

        let retrieval = RetrievalSettings {
            top_k: u64_or(retrieval, "top_k", defaults.retrieval.top_k as u64).clamp(1, 1000)
                as usize,
            similarity_threshold: retrieval
                .and_then(|v| v.get("similarity_threshold"))
                .and_then(|v| v.as_f64())
                .map(|v| v.clamp(-1.0, 1.0) as f32),
            timeout: secs_or(retrieval, defaults.retrieval.timeout),
            recent_plans: u64_or(retrieval, "recent_plans", defaults.retrieval.recent_plans as u64)
                as usize,
        };

        let chat = ChatSettings {
            max_requests: u64_or(chat, "max_requests", defaults.chat.max_requests as u64).max(1)
                as usize,
            window_minutes: u64_or(chat, "window_minutes", defaults.chat.window_minutes).max(1),
            use_rag: chat
                .and_then(|v| v.get("use_rag"))
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.chat.use_rag),
        };

        Self {
            llm,
            embedding,
            chunking,
            retrieval,
            chat,
        }
    }
}

fn string_or(section: Option<&Value>, key: &str, default: &str) -> String {
    section
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn u64_or(section: Option<&Value>, key: &str, default: u64) -> u64 {
    section
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_u64())
        .unwrap_or(default)
}

fn f32_or(section: Option<&Value>, key: &str, default: f32) -> f32 {
    section
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_f64())
        .map(|v| v.clamp(0.0, 2.0) as f32)
        .unwrap_or(default)
}

fn secs_or(section: Option<&Value>, default: Duration) -> Duration {
    section
        .and_then(|v| v.get("timeout_secs"))
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let settings = RagSettings::from_config(&json!({}));
        assert_eq!(settings.embedding.dimension, 1536);
        assert_eq!(settings.embedding.max_chars, 8000);
        assert_eq!(settings.chunking.target_size, 1000);
        assert_eq!(settings.chunking.overlap, 200);
        assert_eq!(settings.chunking.course_file_size, 1500);
        assert_eq!(settings.chunking.sentence_group_cap, 500);
        assert_eq!(settings.retrieval.top_k, 15);
        assert!(settings.retrieval.similarity_threshold.is_none());
        assert_eq!(settings.chat.max_requests, 60);
        assert_eq!(settings.chat.window_minutes, 60);
        assert!(settings.llm.api_key.is_none());
    }

    #[test]
    fn overrides_are_read_per_section() {
        let settings = RagSettings::from_config(&json!({
            "llm": { "model": "local-model", "api_key": "  ", "timeout_secs": 5 },
            "embedding": { "dimension": 8 },
            "chunking": { "target_size": 150, "overlap": 30 },
            "retrieval": { "similarity_threshold": 0.25 },
            "chat": { "max_requests": 3 }
        }));

        assert_eq!(settings.llm.model, "local-model");
        assert!(settings.llm.api_key.is_none());
        assert_eq!(settings.llm.timeout, Duration::from_secs(5));
        assert_eq!(settings.embedding.dimension, 8);
        assert_eq!(settings.chunking.target_size, 150);
        assert_eq!(settings.chunking.overlap, 30);
        assert_eq!(settings.retrieval.similarity_threshold, Some(0.25));
        assert_eq!(settings.chat.max_requests, 3);
    }

    #[test]
    fn overlap_never_reaches_target_size() {
        let settings = RagSettings::from_config(&json!({
            "chunking": { "target_size": 100, "overlap": 400 }
        }));
        assert_eq!(settings.chunking.overlap, 99);
    }
}
