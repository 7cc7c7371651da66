use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Course, CourseDirectory, StoredPlan, StudyContext};
use crate::core::errors::ApiError;

/// Directory backed by in-process maps; the binary seeds it from a YAML
/// fixture and tests seed it directly.
#[derive(Default)]
pub struct InMemoryCourseDirectory {
    courses: RwLock<HashMap<String, Course>>,
    contexts: RwLock<HashMap<(String, String), StudyContext>>,
    plans: RwLock<Vec<StoredPlan>>,
}

impl InMemoryCourseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_course(&self, course: Course) {
        self.courses.write().await.insert(course.id.clone(), course);
    }

    pub async fn set_study_context(&self, context: StudyContext) {
        let key = (context.user_id.clone(), context.course_id.clone());
        self.contexts.write().await.insert(key, context);
    }

    pub async fn record_plan(&self, plan: StoredPlan) {
        self.plans.write().await.push(plan);
    }
}

#[async_trait]
impl CourseDirectory for InMemoryCourseDirectory {
    async fn course(&self, course_id: &str) -> Result<Option<Course>, ApiError> {
        Ok(self.courses.read().await.get(course_id).cloned())
    }

    async fn study_context(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<StudyContext>, ApiError> {
        let key = (user_id.to_string(), course_id.to_string());
        Ok(self.contexts.read().await.get(&key).cloned())
    }

    async fn recent_plans(
        &self,
        user_id: &str,
        course_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredPlan>, ApiError> {
        let mut plans: Vec<StoredPlan> = self
            .plans
            .read()
            .await
            .iter()
            .filter(|plan| plan.user_id == user_id && plan.course_id == course_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        plans.truncate(limit);
        Ok(plans)
    }
}
