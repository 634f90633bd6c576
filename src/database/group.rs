use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::group::{Group, GroupRequest};
use uuid::Uuid;

const GROUP_COLUMNS: &str = "id, name, description, student_ids, created_by, created_at, updated_at";

#[async_trait::async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create_group(&self, request: &GroupRequest, created_by: &Uuid) -> Result<Group, AppError>;
    async fn get_group_by_id(&self, id: &Uuid) -> Result<Option<Group>, AppError>;
    async fn list_groups(&self) -> Result<Vec<Group>, AppError>;
    async fn update_group(&self, id: &Uuid, request: &GroupRequest) -> Result<Group, AppError>;
    async fn delete_group(&self, id: &Uuid) -> Result<(), AppError>;
    async fn add_student_to_group(&self, group_id: &Uuid, student_id: &Uuid) -> Result<(), AppError>;
    async fn remove_student_from_group(&self, group_id: &Uuid, student_id: &Uuid) -> Result<(), AppError>;
    /// Detach a student from every group except `keep`.
    async fn remove_student_from_other_groups(&self, student_id: &Uuid, keep: Option<&Uuid>) -> Result<(), AppError>;
    async fn list_groups_for_student(&self, student_id: &Uuid) -> Result<Vec<Group>, AppError>;
}

#[async_trait::async_trait]
impl GroupRepository for PostgresRepository {
    async fn create_group(&self, request: &GroupRequest, created_by: &Uuid) -> Result<Group, AppError> {
        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO groups (name, description, student_ids, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.member_ids())
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(group)
    }

    async fn get_group_by_id(&self, id: &Uuid) -> Result<Option<Group>, AppError> {
        let group = sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        let groups = sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;

        Ok(groups)
    }

    async fn update_group(&self, id: &Uuid, request: &GroupRequest) -> Result<Group, AppError> {
        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            UPDATE groups
            SET name = $1, description = $2, student_ids = $3, updated_at = now()
            WHERE id = $4
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.member_ids())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        group.ok_or_else(|| AppError::NotFound("Group not found".to_string()))
    }

    async fn delete_group(&self, id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM groups WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_student_to_group(&self, group_id: &Uuid, student_id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE groups
            SET student_ids = CASE WHEN $2 = ANY(student_ids) THEN student_ids ELSE array_append(student_ids, $2) END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Group not found".to_string()));
        }
        Ok(())
    }

    async fn remove_student_from_group(&self, group_id: &Uuid, student_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE groups SET student_ids = array_remove(student_ids, $2), updated_at = now() WHERE id = $1")
            .bind(group_id)
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove_student_from_other_groups(&self, student_id: &Uuid, keep: Option<&Uuid>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE groups
            SET student_ids = array_remove(student_ids, $1), updated_at = now()
            WHERE $1 = ANY(student_ids)
              AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(student_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_groups_for_student(&self, student_id: &Uuid) -> Result<Vec<Group>, AppError> {
        let groups = sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE $1 = ANY(student_ids) ORDER BY name ASC"))
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(groups)
    }
}
