//! Read-only lookups into the course/user directory owned by the
//! surrounding application.

mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub use memory::InMemoryCourseDirectory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub credits: Option<u32>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Course {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: None,
            credits: None,
            instructor: None,
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyProgression {
    #[default]
    Gradual,
    Mixed,
    FrontLoaded,
    BackLoaded,
}

impl DifficultyProgression {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyProgression::Gradual => "gradual",
            DifficultyProgression::Mixed => "mixed",
            DifficultyProgression::FrontLoaded => "front_loaded",
            DifficultyProgression::BackLoaded => "back_loaded",
        }
    }
}

impl fmt::Display for DifficultyProgression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyProgression {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gradual" => Ok(DifficultyProgression::Gradual),
            "mixed" => Ok(DifficultyProgression::Mixed),
            "front_loaded" => Ok(DifficultyProgression::FrontLoaded),
            "back_loaded" => Ok(DifficultyProgression::BackLoaded),
            other => Err(ApiError::BadRequest(format!(
                "unknown difficulty progression: {other}"
            ))),
        }
    }
}

/// A student's preferences and constraints for one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyContext {
    pub user_id: String,
    pub course_id: String,
    pub preferred_hours_per_day: f32,
    #[serde(default)]
    pub difficulty_progression: DifficultyProgression,
    #[serde(default)]
    pub learning_style: Map<String, Value>,
    #[serde(default)]
    pub available_study_slots: Vec<Value>,
    #[serde(default)]
    pub current_knowledge_level: BTreeMap<String, u8>,
    #[serde(default)]
    pub assignments: Vec<Value>,
    #[serde(default)]
    pub quiz_schedule: Vec<Value>,
    #[serde(default)]
    pub target_grade: Option<String>,
    #[serde(default)]
    pub priority_topics: Vec<String>,
}

impl StudyContext {
    pub fn new(user_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            course_id: course_id.into(),
            preferred_hours_per_day: 2.0,
            difficulty_progression: DifficultyProgression::default(),
            learning_style: Map::new(),
            available_study_slots: Vec::new(),
            current_knowledge_level: BTreeMap::new(),
            assignments: Vec::new(),
            quiz_schedule: Vec::new(),
            target_grade: None,
            priority_topics: Vec::new(),
        }
    }
}

/// A previously generated plan, as stored by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlan {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub plan_data: Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CourseDirectory: Send + Sync {
    async fn course(&self, course_id: &str) -> Result<Option<Course>, ApiError>;

    async fn study_context(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<StudyContext>, ApiError>;

    /// Newest first, at most `limit`.
    async fn recent_plans(
        &self,
        user_id: &str,
        course_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredPlan>, ApiError>;
}
