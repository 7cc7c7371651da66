use std::sync::Arc;
use std::time::Duration;

use super::analysis::{heuristic_topics, MAX_TOPICS};
use crate::core::config::LlmSettings;
use crate::core::errors::GenerationError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::text::truncate_chars;

const TOPIC_CONTENT_CHARS: usize = 3000;

/// Asks the LLM for a short comma-separated topic list, falling back to the
/// regex heuristics when the call fails or returns nothing usable.
#[derive(Clone)]
pub struct TopicExtractor {
    provider: Option<Arc<dyn LlmProvider>>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl TopicExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: &LlmSettings) -> Self {
        Self {
            provider: Some(provider),
            model: settings.model.clone(),
            max_tokens: settings.topic_max_tokens,
            timeout: settings.timeout,
        }
    }

    /// Heuristics only.
    pub fn offline() -> Self {
        Self {
            provider: None,
            model: String::new(),
            max_tokens: 0,
            timeout: Duration::ZERO,
        }
    }

    pub async fn extract(&self, content: &str) -> Vec<String> {
        match self.extract_with_llm(content).await {
            Ok(topics) if !topics.is_empty() => topics,
            Ok(_) => heuristic_topics(content),
            Err(err) => {
                tracing::debug!("LLM topic extraction unavailable, using heuristics: {}", err);
                heuristic_topics(content)
            }
        }
    }

    async fn extract_with_llm(&self, content: &str) -> Result<Vec<String>, GenerationError> {
        let Some(provider) = &self.provider else {
            return Ok(Vec::new());
        };

        let excerpt = if content.chars().count() > TOPIC_CONTENT_CHARS {
            format!("{}...", truncate_chars(content, TOPIC_CONTENT_CHARS))
        } else {
            content.to_string()
        };

        let prompt = format!(
            "Analyze the following academic content and extract the main topics, concepts, and subjects discussed.\n\
             Focus on:\n\
             - Academic concepts and theories\n\
             - Technical terms and methodologies\n\
             - Key subjects and fields of study\n\
             - Important algorithms, formulas, or principles\n\n\
             Return ONLY a comma-separated list of topics (max {MAX_TOPICS} topics), no explanations.\n\n\
             Content:\n{excerpt}\n\nTopics:"
        );

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(0.3)
            .with_max_tokens(self.max_tokens);

        let reply = tokio::time::timeout(self.timeout, provider.chat(request, &self.model))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
            .map_err(GenerationError::Llm)?;

        Ok(parse_topic_list(&reply))
    }
}

pub fn parse_topic_list(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(|topic| topic.trim().trim_matches(|c| c == '"' || c == '.').trim())
        .filter(|topic| {
            let len = topic.chars().count();
            len > 3 && len < 50
        })
        .map(str::to_string)
        .take(MAX_TOPICS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedProvider;

    fn settings() -> LlmSettings {
        LlmSettings {
            timeout: Duration::from_secs(5),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn parse_filters_length_and_caps_count() {
        let reply = "Graphs, DP, Dynamic Programming, \"Greedy Algorithms\", a, b, c, \
                     Heaps, Tries, Hashing, Sorting, Searching, Recursion";
        let topics = parse_topic_list(reply);
        assert_eq!(topics.len(), 8);
        assert_eq!(topics[0], "Graphs");
        assert_eq!(topics[1], "Dynamic Programming");
        assert_eq!(topics[2], "Greedy Algorithms");
        assert!(!topics.contains(&"DP".to_string()));
    }

    #[tokio::test]
    async fn uses_llm_topics_when_available() {
        let provider = Arc::new(ScriptedProvider::failing().with_reply("Graph Theory, Shortest Paths"));
        let extractor = TopicExtractor::new(provider.clone(), &settings());

        let topics = extractor.extract("Dijkstra computes shortest paths.").await;
        assert_eq!(topics, vec!["Graph Theory", "Shortest Paths"]);

        let request = &provider.requests()[0];
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(200));
    }

    #[tokio::test]
    async fn falls_back_to_heuristics_on_failure() {
        let extractor = TopicExtractor::new(Arc::new(ScriptedProvider::failing()), &settings());
        let content = "We cover the Bellman Ford algorithm in depth.";

        assert_eq!(extractor.extract(content).await, heuristic_topics(content));
        assert_eq!(
            TopicExtractor::offline().extract(content).await,
            heuristic_topics(content)
        );
    }
}
