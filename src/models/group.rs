use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// Named set of students. A student belongs to at most one group at a time.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub student_ids: Vec<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct GroupRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub student_ids: Vec<Uuid>,
}

impl GroupRequest {
    /// Requested members in order of first mention, each once.
    pub fn member_ids(&self) -> Vec<Uuid> {
        let mut members = Vec::with_capacity(self.student_ids.len());
        for id in &self.student_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        members
    }
}

#[derive(Deserialize, Debug, JsonSchema)]
pub struct GroupMemberRequest {
    pub student_id: Uuid,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub student_ids: Vec<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&Group> for GroupResponse {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            student_ids: group.student_ids.clone(),
            created_by: group.created_by,
            created_at: group.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_ids_keep_first_mention_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let request = GroupRequest {
            name: "Group A".to_string(),
            description: None,
            student_ids: vec![b, a, b, a],
        };
        assert_eq!(request.member_ids(), vec![b, a]);
    }
}
