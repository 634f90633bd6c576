use crate::database::postgres_repository::{PostgresRepository, is_unique_violation};
use crate::error::app_error::AppError;
use crate::models::user::{Role, User};
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::sync::LazyLock;
use uuid::Uuid;

/// A real Argon2 hash generated once at startup, used as a timing decoy
/// so that login requests for unknown emails take as long as real ones.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| password_hash("dummy-never-matches").unwrap_or_default());

const USER_COLUMNS: &str = "id, email, display_name, role, group_id, password_hash, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub display_name: &'a str,
    pub role: Role,
    pub group_id: Option<Uuid>,
    pub password: &'a str,
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &NewUser<'_>) -> Result<User, AppError>;
    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, AppError>;
    async fn list_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError>;
    async fn update_user(&self, id: &Uuid, display_name: &str, role: Role, group_id: Option<Uuid>) -> Result<User, AppError>;
    async fn update_password(&self, id: &Uuid, new_password: &str) -> Result<(), AppError>;
    async fn delete_user(&self, id: &Uuid) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, user: &NewUser<'_>) -> Result<User, AppError> {
        let hash = password_hash(user.password)?;

        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, display_name, role, group_id, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.email)
        .bind(user.display_name)
        .bind(user.role)
        .bind(user.group_id)
        .bind(&hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(err) if is_unique_violation(&err) => Err(AppError::UserAlreadyExists(user.email.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE $1::text IS NULL OR role = $1
            ORDER BY display_name ASC
            "#
        ))
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn list_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn update_user(&self, id: &Uuid, display_name: &str, role: Role, group_id: Option<Uuid>) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET display_name = $1, role = $2, group_id = $3, updated_at = now()
            WHERE id = $4
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(display_name)
        .bind(role)
        .bind(group_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(AppError::UserNotFound)
    }

    async fn update_password(&self, id: &Uuid, new_password: &str) -> Result<(), AppError> {
        let hash = password_hash(new_password)?;
        let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(&hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::UserNotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;

        Ok(())
    }
}

pub(crate) fn password_hash(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(user: &User, password: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(&user.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::InvalidCredentials)
}

/// Throwaway verification so unknown accounts cost the same as known ones.
pub fn dummy_verify(password: &str) {
    if let Ok(hash) = PasswordHash::new(&DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let user = User {
            password_hash: password_hash("correct horse").unwrap(),
            ..User::default()
        };
        assert!(verify_password(&user, "correct horse").is_ok());
        assert!(matches!(verify_password(&user, "wrong"), Err(AppError::InvalidCredentials)));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(password_hash("same").unwrap(), password_hash("same").unwrap());
    }
}
