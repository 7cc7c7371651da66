//! One guarded chat exchange.
//!
//! rate limit → validate message → sanitize context → optional course
//! reference material → prompt → LLM → validate response → audit.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::RagPipeline;
use crate::llm::{ChatMessage, ChatRequest};
use crate::rag::{ContextBundle, QueryType, RetrievalOptions};
use crate::security::{Rejection, RejectionReason};

const CHAT_REFERENCE_CHUNKS: usize = 3;
const UNAVAILABLE_MESSAGE: &str =
    "I'm having trouble responding right now. Please try again in a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatOutcome {
    Delivered,
    SecurityBlocked,
    RateLimited {
        #[serde(with = "secs")]
        retry_after: Duration,
    },
    /// The LLM call failed or timed out.
    Unavailable,
}

mod secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub response_text: String,
    /// Course material was placed in the prompt.
    pub rag_enhanced: bool,
    /// The message or the reply was withheld by the guard.
    pub security_blocked: bool,
    pub outcome: ChatOutcome,
}

impl ChatTurn {
    fn blocked(message: &str) -> Self {
        Self {
            response_text: message.to_string(),
            rag_enhanced: false,
            security_blocked: true,
            outcome: ChatOutcome::SecurityBlocked,
        }
    }

    fn unavailable(rag_enhanced: bool) -> Self {
        Self {
            response_text: UNAVAILABLE_MESSAGE.to_string(),
            rag_enhanced,
            security_blocked: false,
            outcome: ChatOutcome::Unavailable,
        }
    }
}

fn rate_limited_message(retry_after: Duration) -> String {
    let minutes = retry_after.as_secs().div_ceil(60).max(1);
    format!(
        "You're sending messages too quickly. Please wait {minutes} minute{} and try again.",
        if minutes == 1 { "" } else { "s" }
    )
}

impl RagPipeline {
    pub async fn chat_turn(&self, user_id: &str, message: &str, course_id: Option<&str>) -> ChatTurn {
        self.chat_turn_with_context(user_id, message, course_id, &Map::new())
            .await
    }

    /// `context` carries caller-supplied fields such as `username`; only
    /// allow-listed keys reach the prompt.
    pub async fn chat_turn_with_context(
        &self,
        user_id: &str,
        message: &str,
        course_id: Option<&str>,
        context: &Map<String, Value>,
    ) -> ChatTurn {
        let mut bundle = ContextBundle::empty(message, Vec::new());
        let turn = self
            .run_chat(user_id, message, course_id, context, &mut bundle)
            .await;
        self.record(user_id, message, QueryType::Chat, &bundle, &turn.response_text)
            .await;
        turn
    }

    async fn run_chat(
        &self,
        user_id: &str,
        message: &str,
        course_id: Option<&str>,
        context: &Map<String, Value>,
        bundle: &mut ContextBundle,
    ) -> ChatTurn {
        if let Err(limited) =
            self.rate_limiter
                .check(user_id, self.chat.max_requests, self.chat.window_minutes)
        {
            return ChatTurn {
                response_text: rate_limited_message(limited.retry_after),
                rag_enhanced: false,
                security_blocked: false,
                outcome: ChatOutcome::RateLimited {
                    retry_after: limited.retry_after,
                },
            };
        }

        if let Err(rejection) = self.guard.validate_message(user_id, message) {
            return ChatTurn::blocked(rejection.user_message);
        }

        let mut merged = context.clone();
        merged.insert("user_id".to_string(), json!(user_id));
        if let Some(course_id) = course_id {
            merged.insert("course_id".to_string(), json!(course_id));
            if let Ok(Some(course)) = self.directory.course(course_id).await {
                merged.insert(
                    "current_course".to_string(),
                    json!({"name": course.name, "code": course.code}),
                );
            }
        }
        let sanitized = self.guard.sanitize_context(&merged);

        let mut reference = Vec::new();
        if let (true, Some(course_id)) = (self.chat.use_rag, course_id) {
            let options = RetrievalOptions {
                top_k: Some(CHAT_REFERENCE_CHUNKS),
                ..RetrievalOptions::default()
            };
            *bundle = self
                .retriever
                .retrieve_with(user_id, course_id, message, &options)
                .await;
            reference = bundle
                .relevant_chunks
                .iter()
                .map(|hit| hit.chunk.content.clone())
                .collect();
        }
        let rag_enhanced = !reference.is_empty();

        let prompt = self.guard.build_prompt(message, &sanitized, &reference);
        let settings = self.generator.settings();
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(settings.chat_temperature)
            .with_max_tokens(settings.answer_max_tokens);

        let reply = match self.generator.complete(request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(user_id, "Chat completion failed: {}", err);
                return ChatTurn::unavailable(rag_enhanced);
            }
        };

        match self.guard.validate_response(&reply) {
            Ok(text) => ChatTurn {
                response_text: text,
                rag_enhanced,
                security_blocked: false,
                outcome: ChatOutcome::Delivered,
            },
            // Nothing came back; that is a generation failure.
            Err(Rejection {
                reason: RejectionReason::EmptyResponse,
                ..
            }) => ChatTurn::unavailable(rag_enhanced),
            Err(rejection) => ChatTurn {
                rag_enhanced,
                ..ChatTurn::blocked(rejection.user_message)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_hint_rounds_up_to_whole_minutes() {
        assert_eq!(
            rate_limited_message(Duration::from_secs(61)),
            "You're sending messages too quickly. Please wait 2 minutes and try again."
        );
        assert_eq!(
            rate_limited_message(Duration::from_secs(5)),
            "You're sending messages too quickly. Please wait 1 minute and try again."
        );
    }

    #[test]
    fn outcomes_serialize_with_a_kind_tag() {
        let limited = ChatOutcome::RateLimited {
            retry_after: Duration::from_secs(90),
        };
        assert_eq!(
            serde_json::to_value(limited).unwrap(),
            json!({"kind": "rate_limited", "retry_after": 90})
        );
        assert_eq!(
            serde_json::to_value(ChatOutcome::Delivered).unwrap(),
            json!({"kind": "delivered"})
        );
    }
}
