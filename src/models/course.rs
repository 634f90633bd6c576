use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub professor_id: Uuid,
    pub group_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Course {
    pub fn is_offered_to(&self, group_id: &Uuid) -> bool {
        self.group_ids.contains(group_id)
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct CourseRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub professor_id: Uuid,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct CourseResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub professor_id: Uuid,
    pub group_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&Course> for CourseResponse {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            name: course.name.clone(),
            description: course.description.clone(),
            professor_id: course.professor_id,
            group_ids: course.group_ids.clone(),
            created_at: course.created_at,
        }
    }
}
