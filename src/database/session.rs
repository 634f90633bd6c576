use crate::database::postgres_repository::{PostgresRepository, is_unique_violation};
use crate::error::app_error::AppError;
use crate::models::session::Session;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, course_id, professor_id, group_id, start_time, duration_minutes, expires_at, current_token, active, ended_at, created_at";

#[derive(Debug, Clone)]
pub struct NewSession {
    pub course_id: Uuid,
    pub professor_id: Uuid,
    pub group_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

#[async_trait::async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fails with `ActiveSessionExists` when the professor already has an
    /// active session for the course.
    async fn create_session(&self, session: &NewSession) -> Result<Session, AppError>;
    async fn get_session_by_id(&self, id: &Uuid) -> Result<Option<Session>, AppError>;
    async fn find_live_session(&self, professor_id: &Uuid, course_id: &Uuid, now: DateTime<Utc>) -> Result<Option<Session>, AppError>;
    async fn list_active_sessions_for_professor(&self, professor_id: &Uuid, now: DateTime<Utc>) -> Result<Vec<Session>, AppError>;
    async fn list_sessions_for_course(&self, course_id: &Uuid) -> Result<Vec<Session>, AppError>;
    /// Replaces the token of a still-active session. Returns false if the session is no longer active.
    async fn update_token(&self, id: &Uuid, token: &str) -> Result<bool, AppError>;
    /// Clears the active flag. Returns false if it was already cleared.
    async fn end_session(&self, id: &Uuid, ended_at: DateTime<Utc>) -> Result<bool, AppError>;
    /// Ends every active session whose expiry is behind `now`, returning their ids.
    async fn end_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;
}

#[async_trait::async_trait]
impl SessionRepository for PostgresRepository {
    async fn create_session(&self, session: &NewSession) -> Result<Session, AppError> {
        let result = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (course_id, professor_id, group_id, start_time, duration_minutes, expires_at, current_token, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.course_id)
        .bind(session.professor_id)
        .bind(session.group_id)
        .bind(session.start_time)
        .bind(session.duration_minutes)
        .bind(session.expires_at)
        .bind(&session.token)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(err) if is_unique_violation(&err) => Err(AppError::ActiveSessionExists),
            Err(err) => Err(AppError::db("Failed to create session", err)),
        }
    }

    async fn get_session_by_id(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn find_live_session(&self, professor_id: &Uuid, course_id: &Uuid, now: DateTime<Utc>) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE professor_id = $1
              AND course_id = $2
              AND active
              AND expires_at >= $3
            "#
        ))
        .bind(professor_id)
        .bind(course_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn list_active_sessions_for_professor(&self, professor_id: &Uuid, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE professor_id = $1
              AND active
              AND expires_at >= $2
            ORDER BY start_time DESC
            "#
        ))
        .bind(professor_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn list_sessions_for_course(&self, course_id: &Uuid) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE course_id = $1 ORDER BY start_time DESC"))
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    async fn update_token(&self, id: &Uuid, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE sessions SET current_token = $1 WHERE id = $2 AND active")
            .bind(token)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn end_session(&self, id: &Uuid, ended_at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE sessions SET active = FALSE, ended_at = $1 WHERE id = $2 AND active")
            .bind(ended_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn end_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE sessions
            SET active = FALSE, ended_at = expires_at
            WHERE active AND expires_at < $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
