//! Prompt templates for plan generation and question answering.

use std::collections::BTreeSet;

use super::plan::PlanPreferences;
use crate::rag::ContextBundle;
use crate::text::{char_len, truncate_chars};

const MAX_PROMPT_CHUNKS: usize = 8;
const MAX_PROMPT_NODES: usize = 10;
const PREVIEW_CHARS: usize = 200;

pub const PLAN_SYSTEM_PROMPT: &str = r#"You are an expert academic advisor who writes personalized study plans from:

1. The student's learning preferences and constraints
2. Course content and requirements
3. The study materials available for the course
4. Deadlines and exam dates
5. A sensible progression of difficulty

Plans must be realistic, sequenced so prerequisites come first, balanced in workload and focused on learning objectives.
Use SPECIFIC TOPIC NAMES taken from the study materials, never generic labels such as "Topic 1" or "Milestone 1".
Milestones must describe concrete learning outcomes drawn from the content.

Respond with a single valid JSON object of exactly this shape:
{
  "title": "Study plan title naming the course content",
  "description": "Short description mentioning key concepts",
  "topics": [
    {
      "id": "unique_topic_id",
      "name": "Topic name from the materials, e.g. 'Binary Trees and Traversal'",
      "description": "What the topic covers",
      "difficulty_level": 1-5,
      "estimated_hours": number,
      "prerequisites": ["prerequisite topic names"],
      "learning_objectives": ["specific learning goals"],
      "completed": false
    }
  ],
  "milestones": [
    {
      "id": "unique_milestone_id",
      "name": "Outcome, e.g. 'Master Binary Tree Operations'",
      "description": "What the student will achieve",
      "target_topics": ["topic names covered"],
      "week": week_number,
      "deliverable": "Concrete outcome",
      "completed": false
    }
  ],
  "schedule": {
    "total_weeks": number,
    "hours_per_week": number,
    "study_sessions": ["recommended sessions"]
  },
  "estimated_total_hours": number,
  "difficulty_progression": "gradual|mixed|front_loaded|back_loaded"
}"#;

pub const TUTOR_SYSTEM_PROMPT: &str = "You are a helpful AI tutor. Answer the student's question using the provided context from their study materials.

Guidelines:
- Use the context to provide accurate, relevant answers
- If the context does not contain enough information, say so honestly
- Cite sources when referencing specific material
- Keep explanations clear and educational
- Encourage further learning";

/// Query text handed to plan generation, carrying the student's
/// preferences and the topics already seen in retrieval.
pub fn compose_plan_request(
    query: &str,
    course_name: &str,
    preferences: &PlanPreferences,
    resource_topics: &[String],
) -> String {
    let topics: Vec<&str> = resource_topics.iter().take(10).map(String::as_str).collect();
    [
        format!("Create a study plan for: {query}"),
        format!("Course: {course_name}"),
        format!("Available study hours: {}", preferences.study_hours),
        format!("Difficulty preference: {}", preferences.difficulty),
        format!("Target grade: {}", preferences.target_grade),
        format!("Priority topics: {}", preferences.priority_topics.join(", ")),
        format!("Available topics from resources: {}", topics.join(", ")),
    ]
    .join("\n")
}

pub fn build_plan_prompt(bundle: &ContextBundle, query: &str) -> String {
    let mut parts = vec![format!("Student Request: {query}"), String::new()];

    parts.push("=== COURSE INFORMATION ===".to_string());
    match &bundle.course {
        Some(course) => {
            parts.push(format!("Course: {}", course.name));
            if let Some(code) = &course.code {
                parts.push(format!("Code: {code}"));
            }
            parts.push(format!(
                "Credits: {}",
                course
                    .credits
                    .map_or_else(|| "Not specified".to_string(), |c| c.to_string())
            ));
            parts.push(format!(
                "Instructor: {}",
                course.instructor.as_deref().unwrap_or("Not specified")
            ));
            parts.push(format!(
                "Duration: {} to {}",
                course
                    .start_date
                    .map_or_else(|| "unknown".to_string(), |d| d.to_string()),
                course
                    .end_date
                    .map_or_else(|| "unknown".to_string(), |d| d.to_string())
            ));
        }
        None => parts.push("Course: Not available".to_string()),
    }

    if let Some(context) = &bundle.study_context {
        parts.extend([
            String::new(),
            "=== STUDENT PREFERENCES ===".to_string(),
            format!(
                "Preferred daily study time: {} hours",
                context.preferred_hours_per_day
            ),
            format!("Difficulty progression: {}", context.difficulty_progression),
            format!(
                "Target grade: {}",
                context.target_grade.as_deref().unwrap_or("Not specified")
            ),
            format!("Learning style: {}", to_json(&context.learning_style)),
            format!(
                "Available study slots: {}",
                to_json(&context.available_study_slots)
            ),
        ]);
        if !context.priority_topics.is_empty() {
            parts.push(format!(
                "Priority topics: {}",
                context.priority_topics.join(", ")
            ));
        }
        if !context.current_knowledge_level.is_empty() {
            parts.push(format!(
                "Current knowledge: {}",
                to_json(&context.current_knowledge_level)
            ));
        }
        if !context.assignments.is_empty() {
            parts.extend([
                String::new(),
                "=== ASSIGNMENTS & DEADLINES ===".to_string(),
                to_json_pretty(&context.assignments),
            ]);
        }
        if !context.quiz_schedule.is_empty() {
            parts.extend([
                String::new(),
                "=== QUIZ/EXAM SCHEDULE ===".to_string(),
                to_json_pretty(&context.quiz_schedule),
            ]);
        }
    }

    if !bundle.relevant_chunks.is_empty() {
        parts.extend([String::new(), "=== RELEVANT STUDY MATERIALS ===".to_string()]);
        for hit in bundle.relevant_chunks.iter().take(MAX_PROMPT_CHUNKS) {
            let chunk = &hit.chunk;
            parts.extend([
                format!("Resource: {}", chunk.source_title),
                format!("Type: {}", chunk.chunk_type),
                format!("Difficulty: {}/5", chunk.difficulty_level),
                format!("Topics: {}", chunk.topics.join(", ")),
                format!("Content Preview: {}", preview(&chunk.content, PREVIEW_CHARS)),
                format!(
                    "Study Time: {} minutes",
                    chunk
                        .estimated_study_time
                        .map_or_else(|| "unknown".to_string(), |m| m.to_string())
                ),
                String::new(),
            ]);
        }
    }

    if !bundle.knowledge_nodes.is_empty() {
        parts.extend([String::new(), "=== COURSE TOPIC STRUCTURE ===".to_string()]);
        for node in bundle.knowledge_nodes.iter().take(MAX_PROMPT_NODES) {
            let prerequisites = if node.prerequisites.is_empty() {
                "None".to_string()
            } else {
                node.prerequisites.join(", ")
            };
            parts.extend([
                format!("Topic: {}", node.topic),
                format!("Difficulty: {}/5", node.difficulty_level),
                format!("Prerequisites: {prerequisites}"),
                format!("Estimated Hours: {}", node.estimated_study_hours),
                String::new(),
            ]);
        }
    }

    let all_topics: BTreeSet<&str> = bundle
        .relevant_chunks
        .iter()
        .flat_map(|hit| hit.chunk.topics.iter().map(String::as_str))
        .chain(bundle.knowledge_nodes.iter().map(|node| node.topic.as_str()))
        .collect();
    let available = if all_topics.is_empty() {
        "Extract from content above".to_string()
    } else {
        all_topics.into_iter().collect::<Vec<_>>().join(", ")
    };

    parts.extend([
        String::new(),
        "=== INSTRUCTIONS ===".to_string(),
        "Create a comprehensive, personalized study plan in JSON format.".to_string(),
        String::new(),
        "IMPORTANT REQUIREMENTS:".to_string(),
        "1. Use SPECIFIC topic names from the study materials above, not generic labels".to_string(),
        "2. Create meaningful milestones that reflect actual learning outcomes".to_string(),
        "3. Reference the actual concepts, algorithms, and theories mentioned in the content"
            .to_string(),
        "4. Ensure topics build on each other logically".to_string(),
        "5. Include concrete, measurable learning objectives".to_string(),
        String::new(),
        format!("Available Topics to Reference: {available}"),
        String::new(),
        "Generate the study plan JSON now:".to_string(),
    ]);

    parts.join("\n")
}

/// Top chunks labeled with their source, separated by blank lines.
pub fn build_answer_prompt(bundle: &ContextBundle, question: &str, max_chunks: usize) -> String {
    let context = bundle
        .relevant_chunks
        .iter()
        .take(max_chunks)
        .map(|hit| format!("Source: {}\n{}", hit.chunk.source_title, hit.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context from study materials:\n{context}\n\n\
         Student's Question: {question}\n\n\
         Please provide a helpful answer based on the context above."
    )
}

/// First `max_chars` characters, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if char_len(text) > max_chars {
        format!("{}...", truncate_chars(text, max_chars))
    } else {
        text.to_string()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn to_json_pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
