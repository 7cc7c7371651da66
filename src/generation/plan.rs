use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rag::ContextBundle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTopic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: u8,
    #[serde(default)]
    pub estimated_hours: f32,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_topics: Vec<String>,
    #[serde(default)]
    pub week: Option<u32>,
    #[serde(default)]
    pub deliverable: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub total_weeks: Option<f32>,
    #[serde(default)]
    pub hours_per_week: Option<f32>,
    #[serde(default)]
    pub study_sessions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub topics: Vec<PlanTopic>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub estimated_total_hours: f32,
    #[serde(default)]
    pub difficulty_progression: Option<String>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default = "default_generated_by")]
    pub generated_by: String,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

fn default_difficulty() -> u8 {
    3
}

fn default_generated_by() -> String {
    "ai_assistant".to_string()
}

/// What the student asked for alongside the free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanPreferences {
    pub study_hours: u32,
    /// Free-form: `easy`, `moderate`, `hard` or a progression name.
    pub difficulty: String,
    pub target_grade: String,
    pub priority_topics: Vec<String>,
}

impl Default for PlanPreferences {
    fn default() -> Self {
        Self {
            study_hours: 10,
            difficulty: "moderate".to_string(),
            target_grade: "B+".to_string(),
            priority_topics: Vec::new(),
        }
    }
}

const FALLBACK_TOPICS: [&str; 4] = ["Introduction", "Core Concepts", "Practice Problems", "Review"];
const MAX_FALLBACK_TOPICS: usize = 8;

/// Template plan built from whatever topics retrieval produced. Used when
/// LLM generation fails.
pub fn fallback_plan(
    query: &str,
    course_name: &str,
    preferences: &PlanPreferences,
    bundle: &ContextBundle,
) -> StudyPlan {
    let mut names = bundle.chunk_topics();
    names.truncate(MAX_FALLBACK_TOPICS);
    if names.is_empty() {
        names = FALLBACK_TOPICS.iter().map(|t| t.to_string()).collect();
    }

    let hours = preferences.study_hours;
    let hours_per_topic = (hours / names.len() as u32).max(1);
    let difficulty = match preferences.difficulty.to_ascii_lowercase().as_str() {
        "moderate" | "gradual" => 3,
        "easy" => 2,
        _ => 4,
    };

    let topics = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| PlanTopic {
            id: format!("topic_{}", i + 1),
            description: format!("Study {name} thoroughly"),
            name,
            difficulty_level: difficulty,
            estimated_hours: hours_per_topic as f32,
            prerequisites: Vec::new(),
            learning_objectives: Vec::new(),
            completed: false,
        })
        .collect();

    StudyPlan {
        title: format!("Study Plan for {course_name}"),
        description: format!("Study plan for: {query}"),
        topics,
        milestones: Vec::new(),
        schedule: Schedule::default(),
        estimated_total_hours: hours as f32,
        difficulty_progression: None,
        duration_days: Some((hours / 2).max(7)),
        generated_by: "fallback_template".to_string(),
        generated_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::{sample_chunk, ScoredChunk};

    fn bundle_with_topics(topics: &[&[&str]]) -> ContextBundle {
        let mut bundle = ContextBundle::empty("plan", Vec::new());
        for (i, chunk_topics) in topics.iter().enumerate() {
            let mut chunk = sample_chunk(&format!("c{i}"), "cs101", i, vec![1.0]);
            chunk.topics = chunk_topics.iter().map(|t| t.to_string()).collect();
            bundle.relevant_chunks.push(ScoredChunk {
                chunk,
                similarity: 0.9,
            });
        }
        bundle
    }

    #[test]
    fn fallback_uses_retrieved_topics() {
        let bundle = bundle_with_topics(&[&["Graphs", "Trees"], &["graphs", "Heaps"]]);
        let preferences = PlanPreferences {
            study_hours: 9,
            ..PlanPreferences::default()
        };
        let plan = fallback_plan("midterm prep", "Algorithms", &preferences, &bundle);

        let names: Vec<&str> = plan.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Graphs", "Trees", "Heaps"]);
        assert!(plan.topics.iter().all(|t| t.estimated_hours == 3.0));
        assert!(plan.topics.iter().all(|t| t.difficulty_level == 3 && !t.completed));
        assert_eq!(plan.title, "Study Plan for Algorithms");
        assert_eq!(plan.duration_days, Some(7));
        assert_eq!(plan.generated_by, "fallback_template");
    }

    #[test]
    fn fallback_without_topics_uses_template_names() {
        let preferences = PlanPreferences {
            study_hours: 40,
            difficulty: "hard".to_string(),
            ..PlanPreferences::default()
        };
        let plan = fallback_plan("q", "Physics", &preferences, &ContextBundle::default());

        assert_eq!(plan.topics.len(), 4);
        assert_eq!(plan.topics[0].name, "Introduction");
        assert_eq!(plan.topics[0].id, "topic_1");
        assert!(plan.topics.iter().all(|t| t.difficulty_level == 4));
        assert_eq!(plan.duration_days, Some(20));
    }

    #[test]
    fn easy_preference_lowers_difficulty_and_hours_floor_is_one() {
        let preferences = PlanPreferences {
            study_hours: 2,
            difficulty: "easy".to_string(),
            ..PlanPreferences::default()
        };
        let plan = fallback_plan("q", "Art", &preferences, &ContextBundle::default());
        assert!(plan.topics.iter().all(|t| t.difficulty_level == 2));
        assert!(plan.topics.iter().all(|t| t.estimated_hours == 1.0));
    }
}
