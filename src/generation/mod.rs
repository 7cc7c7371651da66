//! LLM-backed generation: study plans, answers, assignment details and
//! syllabus topics.
//!
//! Every entry point returns `Result<_, GenerationError>`; callers decide on
//! the fallback (template plan, heuristic topics, default due date).

pub mod answer;
pub mod assignment;
pub mod parse;
pub mod plan;
pub mod prompt;
pub mod syllabus;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::core::config::LlmSettings;
use crate::core::errors::GenerationError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::rag::ContextBundle;
use crate::text::truncate_chars;

pub use answer::{Answer, AnswerSource};
pub use assignment::{AssignmentDetails, AssignmentType};
pub use plan::{fallback_plan, Milestone, PlanPreferences, PlanTopic, Schedule, StudyPlan};
pub use syllabus::{SyllabusTopic, SyllabusTopics, TopicDifficulty};

const EXTRACTION_TEMPERATURE: f32 = 0.3;
const ASSIGNMENT_MAX_TOKENS: u32 = 800;
const SYLLABUS_MAX_TOKENS: u32 = 1500;

#[derive(Clone)]
pub struct GenerationEngine {
    provider: Arc<dyn LlmProvider>,
    settings: LlmSettings,
}

impl GenerationEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// One chat call under the configured timeout.
    pub async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError> {
        let timeout: Duration = self.settings.timeout;
        tokio::time::timeout(timeout, self.provider.chat(request, &self.settings.model))
            .await
            .map_err(|_| GenerationError::Timeout(timeout))?
            .map_err(GenerationError::Llm)
    }

    pub async fn generate_plan(
        &self,
        bundle: &ContextBundle,
        query: &str,
    ) -> Result<StudyPlan, GenerationError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(prompt::PLAN_SYSTEM_PROMPT),
            ChatMessage::user(prompt::build_plan_prompt(bundle, query)),
        ])
        .with_temperature(self.settings.plan_temperature)
        .with_max_tokens(self.settings.max_tokens);

        let reply = self.complete(request).await?;
        let mut plan = parse::parse_plan(&reply).map_err(|err| {
            tracing::error!("Study plan reply could not be parsed: {}", err);
            err
        })?;
        plan.generated_at.get_or_insert_with(chrono::Utc::now);
        Ok(plan)
    }

    pub async fn answer_question(
        &self,
        bundle: &ContextBundle,
        question: &str,
    ) -> Result<Answer, GenerationError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(prompt::TUTOR_SYSTEM_PROMPT),
            ChatMessage::user(prompt::build_answer_prompt(
                bundle,
                question,
                answer::ANSWER_CONTEXT_CHUNKS,
            )),
        ])
        .with_temperature(self.settings.answer_temperature)
        .with_max_tokens(self.settings.answer_max_tokens);

        let reply = self.complete(request).await?;
        Ok(Answer::from_reply(reply, bundle))
    }

    pub async fn extract_assignment_details(
        &self,
        content: &str,
    ) -> Result<AssignmentDetails, GenerationError> {
        let excerpt = truncate_chars(content, assignment::ASSIGNMENT_CONTENT_CHARS);
        let request = ChatRequest::new(vec![ChatMessage::user(assignment::assignment_prompt(
            excerpt,
        ))])
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(ASSIGNMENT_MAX_TOKENS);

        let reply = self.complete(request).await?;
        assignment::parse_assignment_details(&reply, Local::now().naive_local())
    }

    /// LLM extraction with the heuristic fallback applied; never fails.
    pub async fn extract_syllabus_topics(&self, content: &str) -> SyllabusTopics {
        match self.try_extract_syllabus_topics(content).await {
            Ok(topics) => topics,
            Err(err) => {
                tracing::warn!("Syllabus topic extraction failed, using heuristics: {}", err);
                syllabus::simple_syllabus_topics(content)
            }
        }
    }

    pub async fn try_extract_syllabus_topics(
        &self,
        content: &str,
    ) -> Result<SyllabusTopics, GenerationError> {
        let excerpt = truncate_chars(content, syllabus::SYLLABUS_CONTENT_CHARS);
        let request = ChatRequest::new(vec![ChatMessage::user(syllabus::syllabus_prompt(excerpt))])
            .with_temperature(EXTRACTION_TEMPERATURE)
            .with_max_tokens(SYLLABUS_MAX_TOKENS);

        let reply = self.complete(request).await?;
        syllabus::parse_syllabus_topics(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use crate::llm::testing::ScriptedProvider;
    use crate::rag::store::{sample_chunk, ScoredChunk};

    fn engine(provider: ScriptedProvider) -> (GenerationEngine, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let settings = LlmSettings {
            timeout: Duration::from_millis(500),
            ..LlmSettings::default()
        };
        (GenerationEngine::new(provider.clone(), settings), provider)
    }

    #[tokio::test]
    async fn plan_generation_parses_and_patches_output() {
        let reply = r#"Plan follows. {"title": "Graphs Plan", "topics": [{"name": "BFS"}]}"#;
        let (engine, provider) = engine(ScriptedProvider::failing().with_reply(reply));

        let plan = engine
            .generate_plan(&ContextBundle::default(), "graphs")
            .await
            .unwrap();

        assert_eq!(plan.title, "Graphs Plan");
        assert!(plan.topics[0].id.starts_with("topic_1_"));
        assert!(plan.generated_at.is_some());

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(2000));
    }

    #[tokio::test]
    async fn llm_failure_and_prose_replies_are_typed_errors() {
        let (engine, _) = engine(
            ScriptedProvider::failing()
                .with_error(ApiError::ServiceUnavailable)
                .with_reply("Sorry, I cannot help with that."),
        );
        let bundle = ContextBundle::default();

        assert!(matches!(
            engine.generate_plan(&bundle, "q").await,
            Err(GenerationError::Llm(_))
        ));
        assert!(matches!(
            engine.generate_plan(&bundle, "q").await,
            Err(GenerationError::NoStructuredOutput)
        ));
    }

    #[tokio::test]
    async fn answers_use_tutor_settings_and_cite_sources() {
        let (engine, provider) = engine(ScriptedProvider::failing().with_reply("A heap is..."));
        let mut bundle = ContextBundle::empty("what is a heap", Vec::new());
        bundle.relevant_chunks.push(ScoredChunk {
            chunk: sample_chunk("c0", "cs101", 0, vec![1.0]),
            similarity: 0.75,
        });

        let answer = engine.answer_question(&bundle, "what is a heap").await.unwrap();

        assert_eq!(answer.text, "A heap is...");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.confidence, 0.8);
        let request = &provider.requests()[0];
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(1000));
        assert!(request.messages[1].content.contains("Source: Lecture 1"));
    }

    #[tokio::test]
    async fn syllabus_extraction_falls_back_to_heuristics() {
        let (engine, _) = engine(ScriptedProvider::failing());
        let topics = engine
            .extract_syllabus_topics("Nothing structured in this outline at all")
            .await;
        assert!(!topics.from_llm);
        assert_eq!(topics.topics[0].title, "Course Topics");
    }

    #[tokio::test]
    async fn assignment_extraction_truncates_input() {
        let reply = r#"{"title": "HW 3", "assignment_type": "homework"}"#;
        let (engine, provider) = engine(ScriptedProvider::failing().with_reply(reply));
        let content = "z".repeat(5000);

        let details = engine.extract_assignment_details(&content).await.unwrap();

        assert_eq!(details.title.as_deref(), Some("HW 3"));
        assert!(details.due_date_inferred);
        let prompt = &provider.requests()[0].messages[0].content;
        assert!(prompt.contains(&"z".repeat(3000)));
        assert!(!prompt.contains(&"z".repeat(3001)));
    }
}
