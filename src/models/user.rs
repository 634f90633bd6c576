use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Professor,
    #[default]
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Professor => "professor",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            group_id: user.group_id,
            created_at: user.created_at,
        }
    }
}

/// Password of the administrator performing a privileged action, checked on
/// every call.
#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct AdminConfirmation {
    #[validate(length(min = 1))]
    pub admin_password: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub admin_password: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8))]
    pub new_password: String,
    #[validate(length(min = 1))]
    pub admin_password: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Professor).unwrap(), "\"professor\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn create_user_request_requires_valid_email() {
        let request = CreateUserRequest {
            email: "not-an-email".to_string(),
            password: "longenough".to_string(),
            display_name: "Ada".to_string(),
            role: Role::Student,
            group_id: None,
            admin_password: "secret".to_string(),
        };
        assert!(request.validate().is_err());
    }
}
