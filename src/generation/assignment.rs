use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::{Map, Value};

use super::parse::parse_json_object;
use crate::core::errors::GenerationError;

pub const ASSIGNMENT_CONTENT_CHARS: usize = 3000;
/// Accepted date-time shapes, space or ISO `T` separated, seconds optional.
const DUE_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Homework,
    Quiz,
    Exam,
    Project,
    Lab,
    Essay,
    Presentation,
    Discussion,
    Other,
}

impl AssignmentType {
    /// Unknown names map to `Homework`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiz" => AssignmentType::Quiz,
            "exam" => AssignmentType::Exam,
            "project" => AssignmentType::Project,
            "lab" => AssignmentType::Lab,
            "essay" => AssignmentType::Essay,
            "presentation" => AssignmentType::Presentation,
            "discussion" => AssignmentType::Discussion,
            "other" => AssignmentType::Other,
            _ => AssignmentType::Homework,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentType::Homework => "homework",
            AssignmentType::Quiz => "quiz",
            AssignmentType::Exam => "exam",
            AssignmentType::Project => "project",
            AssignmentType::Lab => "lab",
            AssignmentType::Essay => "essay",
            AssignmentType::Presentation => "presentation",
            AssignmentType::Discussion => "discussion",
            AssignmentType::Other => "other",
        }
    }
}

impl fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields pulled from an uploaded assignment file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentDetails {
    pub title: Option<String>,
    pub assignment_type: AssignmentType,
    pub description: String,
    /// Always set; defaults to two weeks after processing.
    pub due_date: NaiveDateTime,
    pub due_date_inferred: bool,
    pub estimated_hours: Option<f32>,
    pub weight: Option<f32>,
    pub requirements: Vec<String>,
    pub difficulty_level: u8,
}

pub fn assignment_prompt(excerpt: &str) -> String {
    format!(
        "Analyze the following assignment document and extract key details for creating an assignment entry.\n\n\
         Assignment Content:\n{excerpt}\n\n\
         Extract and return the following information as JSON:\n\
         {{\n\
           \"title\": \"Assignment title/name\",\n\
           \"assignment_type\": \"homework|quiz|exam|project|lab|essay|presentation|discussion|other\",\n\
           \"description\": \"Brief description of requirements\",\n\
           \"due_date\": \"YYYY-MM-DD\" or \"YYYY-MM-DD HH:MM\" (if a specific time is mentioned),\n\
           \"estimated_hours\": number (estimated hours to complete, or null),\n\
           \"weight\": number (percentage weight in final grade, or null),\n\
           \"requirements\": [\"list\", \"of\", \"key\", \"requirements\"],\n\
           \"difficulty_level\": 1-5 (estimated difficulty)\n\
         }}\n\n\
         Important:\n\
         - If no due date is found, use null\n\
         - For assignment_type, choose the most appropriate from the list\n\
         - Extract actual requirements, not generic statements\n\
         - Be conservative with time estimates"
    )
}

/// `now` anchors the default due date.
pub fn parse_assignment_details(
    reply: &str,
    now: NaiveDateTime,
) -> Result<AssignmentDetails, GenerationError> {
    let fields = parse_json_object(reply)?;

    let (due_date, due_date_inferred) = match fields.get("due_date").and_then(Value::as_str) {
        Some(raw) => match parse_due_date(raw) {
            Some(due) => (due, false),
            None => (default_due_date(now), true),
        },
        None => (default_due_date(now), true),
    };

    Ok(AssignmentDetails {
        title: string_field(&fields, "title"),
        assignment_type: fields
            .get("assignment_type")
            .and_then(Value::as_str)
            .map(AssignmentType::parse_lenient)
            .unwrap_or(AssignmentType::Homework),
        description: string_field(&fields, "description").unwrap_or_default(),
        due_date,
        due_date_inferred,
        estimated_hours: number_field(&fields, "estimated_hours"),
        weight: number_field(&fields, "weight"),
        requirements: fields
            .get("requirements")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        difficulty_level: number_field(&fields, "difficulty_level")
            .map(|level| level.round().clamp(1.0, 5.0) as u8)
            .unwrap_or(3),
    })
}

/// `YYYY-MM-DD` gets an end-of-day time; a date with a time is taken as is.
fn parse_due_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.len() == 10 {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(23, 59, 0));
    }
    DUE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

fn default_due_date(now: NaiveDateTime) -> NaiveDateTime {
    let date = (now + Duration::weeks(2)).date();
    date.and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default())
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number_field(fields: &Map<String, Value>, key: &str) -> Option<f32> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64().map(|n| n as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn date_only_due_dates_get_end_of_day() {
        let reply = r#"{"title": "Lab 2", "assignment_type": "lab", "due_date": "2026-03-10",
                        "estimated_hours": 4, "weight": "15", "requirements": ["Implement BFS", ""],
                        "difficulty_level": 7}"#;
        let details = parse_assignment_details(reply, now()).unwrap();

        assert_eq!(details.title.as_deref(), Some("Lab 2"));
        assert_eq!(details.assignment_type, AssignmentType::Lab);
        assert_eq!(details.due_date.to_string(), "2026-03-10 23:59:00");
        assert!(!details.due_date_inferred);
        assert_eq!(details.estimated_hours, Some(4.0));
        assert_eq!(details.weight, Some(15.0));
        assert_eq!(details.requirements, vec!["Implement BFS"]);
        assert_eq!(details.difficulty_level, 5);
    }

    #[test]
    fn missing_or_garbled_due_date_defaults_to_two_weeks() {
        for due in ["null", "\"next Friday\"", "\"2026-13-45\""] {
            let reply = format!(r#"{{"title": "Essay", "due_date": {due}}}"#);
            let details = parse_assignment_details(&reply, now()).unwrap();
            assert_eq!(details.due_date.to_string(), "2026-03-15 23:59:00");
            assert!(details.due_date_inferred);
        }
    }

    #[test]
    fn explicit_time_and_unknown_type() {
        let reply = r#"{"due_date": "2026-04-02 17:00", "assignment_type": "worksheet"}"#;
        let details = parse_assignment_details(reply, now()).unwrap();
        assert_eq!(details.due_date.to_string(), "2026-04-02 17:00:00");
        assert_eq!(details.assignment_type, AssignmentType::Homework);
        assert_eq!(details.difficulty_level, 3);
        assert!(details.title.is_none());
    }

    #[test]
    fn iso_due_dates_with_or_without_seconds() {
        for (due, expected) in [
            ("2026-03-10T14:00", "2026-03-10 14:00:00"),
            ("2026-03-10T14:00:30", "2026-03-10 14:00:30"),
            ("2026-03-10 14:00:30", "2026-03-10 14:00:30"),
        ] {
            let reply = format!(r#"{{"title": "Lab 3", "due_date": "{due}"}}"#);
            let details = parse_assignment_details(&reply, now()).unwrap();
            assert_eq!(details.due_date.to_string(), expected);
            assert!(!details.due_date_inferred);
        }
    }

    #[test]
    fn reply_without_json_is_an_error() {
        assert!(matches!(
            parse_assignment_details("I could not find details.", now()),
            Err(GenerationError::NoStructuredOutput)
        ));
    }
}
