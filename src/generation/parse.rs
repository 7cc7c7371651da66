//! Structured-output parsing for LLM replies.
//!
//! The reply is searched greedily for a `{ ... }` block, parsed, patched
//! (missing ids, `completed` flags, loosely typed numbers) and checked
//! against the plan schema before it becomes a typed [`StudyPlan`].

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use super::plan::StudyPlan;
use crate::core::errors::GenerationError;
use crate::text::cached_regex;

/// Everything between the first `{` and the last `}`.
pub fn extract_json_object(text: &str) -> Result<&str, GenerationError> {
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    cached_regex(&OBJECT, r"(?s)\{.*\}")
        .find(text)
        .map(|m| m.as_str())
        .ok_or(GenerationError::NoStructuredOutput)
}

/// Parses the first JSON object in `text`.
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, GenerationError> {
    match serde_json::from_str::<Value>(extract_json_object(text)?)? {
        Value::Object(map) => Ok(map),
        other => Err(GenerationError::Schema(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Deterministic id from list position and name: `{prefix}_{index+1}_{n}`
/// with `n` in `0..10000`.
pub fn synthesize_id(prefix: &str, index: usize, name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 10_000;
    format!("{prefix}_{}_{bucket}", index + 1)
}

pub fn parse_plan(text: &str) -> Result<StudyPlan, GenerationError> {
    let mut plan = parse_json_object(text)?;

    normalize_items(&mut plan, "topics", "topic", normalize_topic);
    normalize_items(&mut plan, "milestones", "milestone", normalize_milestone);
    normalize_plan_fields(&mut plan);

    let value = Value::Object(plan);
    check_schema(&value)?;
    Ok(serde_json::from_value(value)?)
}

fn normalize_items(
    plan: &mut Map<String, Value>,
    key: &str,
    id_prefix: &str,
    normalize: fn(&mut Map<String, Value>),
) {
    let Some(Value::Array(items)) = plan.get_mut(key) else {
        return;
    };
    items.retain(Value::is_object);

    for (index, item) in items.iter_mut().enumerate() {
        let Value::Object(item) = item else {
            continue;
        };

        if !item.contains_key("name") {
            if let Some(title) = item.get("title").cloned() {
                item.insert("name".to_string(), title);
            }
        }
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        item.insert("name".to_string(), Value::String(name.clone()));

        let has_id = item
            .get("id")
            .map(|id| match id {
                Value::String(s) => !s.trim().is_empty(),
                Value::Number(_) => true,
                _ => false,
            })
            .unwrap_or(false);
        if has_id {
            if let Some(Value::Number(n)) = item.get("id") {
                let id = n.to_string();
                item.insert("id".to_string(), Value::String(id));
            }
        } else {
            item.insert(
                "id".to_string(),
                Value::String(synthesize_id(id_prefix, index, &name)),
            );
        }

        if !matches!(item.get("completed"), Some(Value::Bool(_))) {
            item.insert("completed".to_string(), Value::Bool(false));
        }

        normalize(item);
    }
}

fn normalize_topic(topic: &mut Map<String, Value>) {
    match topic.get("difficulty_level").and_then(loose_number) {
        Some(level) => {
            topic.insert(
                "difficulty_level".to_string(),
                json!(level.round().clamp(1.0, 5.0) as u8),
            );
        }
        None => {
            topic.remove("difficulty_level");
        }
    }
    set_number_or_remove(topic, "estimated_hours");
    string_list(topic, "prerequisites");
    string_list(topic, "learning_objectives");
    string_or_remove(topic, "description");
}

fn normalize_milestone(milestone: &mut Map<String, Value>) {
    match milestone.get("week").and_then(loose_number) {
        Some(week) if week >= 0.0 => {
            milestone.insert("week".to_string(), json!(week.round() as u32));
        }
        _ => {
            milestone.remove("week");
        }
    }
    string_list(milestone, "target_topics");
    string_or_remove(milestone, "description");
    string_or_remove(milestone, "deliverable");
}

fn normalize_plan_fields(plan: &mut Map<String, Value>) {
    set_number_or_remove(plan, "estimated_total_hours");
    string_or_remove(plan, "description");
    string_or_remove(plan, "difficulty_progression");
    string_or_remove(plan, "generated_by");
    plan.remove("generated_at");
    match plan.get("duration_days").and_then(loose_number) {
        Some(days) if days >= 0.0 => {
            plan.insert("duration_days".to_string(), json!(days.round() as u32));
        }
        _ => {
            plan.remove("duration_days");
        }
    }

    match plan.get_mut("schedule") {
        Some(Value::Object(schedule)) => {
            set_number_or_remove(schedule, "total_weeks");
            set_number_or_remove(schedule, "hours_per_week");
            match schedule.get("study_sessions").cloned() {
                Some(Value::Array(_)) | None => {}
                Some(other) => {
                    schedule.insert("study_sessions".to_string(), Value::Array(vec![other]));
                }
            }
        }
        Some(_) => {
            plan.remove("schedule");
        }
        None => {}
    }
}

/// Numbers, and strings that hold one.
fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn set_number_or_remove(map: &mut Map<String, Value>, key: &str) {
    match map.get(key).and_then(loose_number) {
        Some(n) => {
            map.insert(key.to_string(), json!(n));
        }
        None => {
            map.remove(key);
        }
    }
}

fn string_or_remove(map: &mut Map<String, Value>, key: &str) {
    if !matches!(map.get(key), Some(Value::String(_))) {
        map.remove(key);
    }
}

fn string_list(map: &mut Map<String, Value>, key: &str) {
    let list: Vec<Value> = match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(|s| Value::String(s.to_string())))
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![Value::String(s.clone())],
        _ => Vec::new(),
    };
    map.insert(key.to_string(), Value::Array(list));
}

fn plan_schema() -> &'static jsonschema::Validator {
    static VALIDATOR: OnceLock<jsonschema::Validator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        let schema = json!({
            "type": "object",
            "required": ["title", "topics"],
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "description": { "type": "string" },
                "topics": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "name", "completed"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "name": { "type": "string", "minLength": 1 },
                            "difficulty_level": { "type": "integer", "minimum": 1, "maximum": 5 },
                            "estimated_hours": { "type": "number", "minimum": 0 },
                            "prerequisites": { "type": "array", "items": { "type": "string" } },
                            "learning_objectives": { "type": "array", "items": { "type": "string" } },
                            "completed": { "type": "boolean" }
                        }
                    }
                },
                "milestones": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "name", "completed"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "name": { "type": "string", "minLength": 1 },
                            "target_topics": { "type": "array", "items": { "type": "string" } },
                            "week": { "type": "integer", "minimum": 0 },
                            "completed": { "type": "boolean" }
                        }
                    }
                },
                "estimated_total_hours": { "type": "number", "minimum": 0 },
                "difficulty_progression": {
                    "enum": ["gradual", "mixed", "front_loaded", "back_loaded"]
                }
            }
        });
        jsonschema::validator_for(&schema).expect("plan schema is valid")
    })
}

/// Logs every violation; only a missing title or topic list is fatal.
fn check_schema(plan: &Value) -> Result<(), GenerationError> {
    let violations: Vec<String> = plan_schema()
        .iter_errors(plan)
        .map(|err| err.to_string())
        .collect();
    if violations.is_empty() {
        return Ok(());
    }
    tracing::warn!(count = violations.len(), "Plan deviates from schema: {:?}", violations);

    let has_title = plan.get("title").map_or(false, Value::is_string);
    let has_topics = plan.get("topics").map_or(false, Value::is_array);
    if has_title && has_topics {
        Ok(())
    } else {
        Err(GenerationError::Schema(violations.join("; ")))
    }
}
