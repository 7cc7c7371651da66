use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::parse::parse_json_object;
use crate::core::errors::GenerationError;
use crate::ingest::analysis::heuristic_topics;
use crate::text::{dedupe_preserving_order, truncate_chars};

pub const SYLLABUS_CONTENT_CHARS: usize = 4000;
const MAX_SYLLABUS_TOPICS: usize = 12;
const MAX_FALLBACK_TOPICS: usize = 10;
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicDifficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl TopicDifficulty {
    /// Unknown values become `Intermediate`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "beginner" => TopicDifficulty::Beginner,
            "advanced" => TopicDifficulty::Advanced,
            _ => TopicDifficulty::Intermediate,
        }
    }
}

impl fmt::Display for TopicDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TopicDifficulty::Beginner => "beginner",
            TopicDifficulty::Intermediate => "intermediate",
            TopicDifficulty::Advanced => "advanced",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllabusTopic {
    pub title: String,
    pub description: String,
    pub difficulty: TopicDifficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllabusTopics {
    pub topics: Vec<SyllabusTopic>,
    pub summary: String,
    /// False when the heuristic fallback produced the topics.
    pub from_llm: bool,
}

impl SyllabusTopics {
    pub fn titles(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.title.clone()).collect()
    }
}

pub fn syllabus_prompt(excerpt: &str) -> String {
    format!(
        "Analyze the following course syllabus and extract the main topics, learning objectives, and key concepts.\n\
         Provide a comprehensive list of specific topics that students will study in this course.\n\n\
         Syllabus Content:\n{excerpt}\n\n\
         Extract and return:\n\
         1. Main topics (specific subjects/concepts)\n\
         2. Learning objectives\n\
         3. Key skills to be developed\n\
         4. Important concepts covered\n\n\
         Format as a JSON object with these fields:\n\
         {{\n\
           \"topics\": [\"topic1\", \"topic2\"],\n\
           \"learning_objectives\": [\"objective1\", \"objective2\"],\n\
           \"key_skills\": [\"skill1\", \"skill2\"],\n\
           \"concepts\": [\"concept1\", \"concept2\"],\n\
           \"summary\": \"Brief 2-3 sentence summary of the course\"\n\
         }}"
    )
}

/// Merges the four lists of the reply into at most twelve topics. Entries
/// may be plain strings or `{title, description, difficulty}` objects.
pub fn parse_syllabus_topics(reply: &str) -> Result<SyllabusTopics, GenerationError> {
    let fields = parse_json_object(reply)?;

    let mut entries: Vec<SyllabusTopic> = Vec::new();
    for key in ["topics", "learning_objectives", "key_skills", "concepts"] {
        let Some(Value::Array(items)) = fields.get(key) else {
            continue;
        };
        entries.extend(items.iter().filter_map(topic_from_value));
    }

    let mut seen = std::collections::HashSet::new();
    entries.retain(|topic| seen.insert(topic.title.to_lowercase()));
    entries.truncate(MAX_SYLLABUS_TOPICS);

    if entries.is_empty() {
        return Err(GenerationError::Schema("syllabus reply lists no topics".to_string()));
    }

    Ok(SyllabusTopics {
        topics: entries,
        summary: fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        from_llm: true,
    })
}

fn topic_from_value(value: &Value) -> Option<SyllabusTopic> {
    match value {
        Value::String(name) => {
            let name = name.trim();
            (!name.is_empty()).then(|| SyllabusTopic {
                title: truncate_chars(name, MAX_TITLE_CHARS).to_string(),
                description: format!(
                    "Key learning area covering {} concepts and applications.",
                    name.to_lowercase()
                ),
                difficulty: TopicDifficulty::Intermediate,
            })
        }
        Value::Object(map) => {
            let title = map.get("title").and_then(Value::as_str)?.trim();
            if title.is_empty() {
                return None;
            }
            let description = map
                .get("description")
                .and_then(Value::as_str)
                .map(|d| truncate_chars(d.trim(), MAX_DESCRIPTION_CHARS).to_string())
                .unwrap_or_else(|| {
                    format!(
                        "Key learning area covering {} concepts and applications.",
                        title.to_lowercase()
                    )
                });
            Some(SyllabusTopic {
                title: truncate_chars(title, MAX_TITLE_CHARS).to_string(),
                description,
                difficulty: map
                    .get("difficulty")
                    .and_then(Value::as_str)
                    .map(TopicDifficulty::parse_lenient)
                    .unwrap_or(TopicDifficulty::Intermediate),
            })
        }
        _ => None,
    }
}

/// Heuristic topics, or a single catch-all entry when none are found.
pub fn simple_syllabus_topics(content: &str) -> SyllabusTopics {
    let mut names = dedupe_preserving_order(heuristic_topics(content));
    names.truncate(MAX_FALLBACK_TOPICS);

    let topics: Vec<SyllabusTopic> = if names.is_empty() {
        vec![SyllabusTopic {
            title: "Course Topics".to_string(),
            description: "Main topics covered in this course syllabus.".to_string(),
            difficulty: TopicDifficulty::Intermediate,
        }]
    } else {
        names
            .into_iter()
            .map(|name| SyllabusTopic {
                description: format!(
                    "Key topic covering {} concepts and applications.",
                    name.to_lowercase()
                ),
                title: name,
                difficulty: TopicDifficulty::Intermediate,
            })
            .collect()
    };

    SyllabusTopics {
        summary: format!("Course covers {} main topics", topics.len()),
        topics,
        from_llm: false,
    }
}

/// Extracted titles that occur in `chunk`, case-insensitively, at most five.
pub fn topics_mentioned_in(titles: &[String], chunk: &str) -> Vec<String> {
    let haystack = chunk.to_lowercase();
    titles
        .iter()
        .filter(|title| haystack.contains(&title.to_lowercase()))
        .take(5)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_lists_are_merged_deduplicated_and_capped() {
        let reply = r#"Here you go: {
            "topics": ["Graphs", "Dynamic Programming", " "],
            "learning_objectives": ["graphs", "Prove greedy correctness"],
            "key_skills": [{"title": "Amortized Analysis", "difficulty": "expert"}],
            "concepts": ["C1", "C2", "C3", "C4", "C5", "C6", "C7", "C8", "C9"],
            "summary": "An algorithms course."
        }"#;
        let extracted = parse_syllabus_topics(reply).unwrap();

        assert_eq!(extracted.topics.len(), 12);
        assert_eq!(extracted.topics[0].title, "Graphs");
        assert_eq!(
            extracted.topics[0].description,
            "Key learning area covering graphs concepts and applications."
        );
        assert_eq!(extracted.topics[2].title, "Prove greedy correctness");
        assert_eq!(extracted.topics[3].difficulty, TopicDifficulty::Intermediate);
        assert_eq!(extracted.summary, "An algorithms course.");
        assert!(extracted.from_llm);
    }

    #[test]
    fn empty_reply_lists_are_an_error() {
        assert!(parse_syllabus_topics(r#"{"topics": [], "summary": "x"}"#).is_err());
        assert!(parse_syllabus_topics("no json").is_err());
    }

    #[test]
    fn simple_topics_fall_back_to_a_catch_all_entry() {
        let none = simple_syllabus_topics("plain words only");
        assert_eq!(none.topics.len(), 1);
        assert_eq!(none.topics[0].title, "Course Topics");
        assert_eq!(none.summary, "Course covers 1 main topics");

        let some = simple_syllabus_topics("Chapter 2: Sorting and Searching Methods. Week two.");
        assert!(!some.from_llm);
        assert!(some.topics.iter().any(|t| t.title.contains("Sorting and Searching")));
        assert!(some
            .topics
            .iter()
            .all(|t| t.description.starts_with("Key topic covering")));
    }

    #[test]
    fn mentioned_topics_are_case_insensitive_and_capped() {
        let titles: Vec<String> = ["Graphs", "Heaps", "Tries", "Stacks", "Queues", "Lists", "Sets"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let chunk = "graphs heaps tries stacks queues lists sets";
        assert_eq!(topics_mentioned_in(&titles, chunk).len(), 5);
        assert_eq!(topics_mentioned_in(&titles, "only HEAPS here"), vec!["Heaps"]);
    }
}
