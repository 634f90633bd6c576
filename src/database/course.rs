use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::course::{Course, CourseRequest};
use uuid::Uuid;

const COURSE_COLUMNS: &str = "id, name, description, professor_id, group_ids, created_at, updated_at";

#[async_trait::async_trait]
pub trait CourseRepository: Send + Sync {
    async fn create_course(&self, request: &CourseRequest) -> Result<Course, AppError>;
    async fn get_course_by_id(&self, id: &Uuid) -> Result<Option<Course>, AppError>;
    async fn list_courses(&self) -> Result<Vec<Course>, AppError>;
    async fn list_courses_for_professor(&self, professor_id: &Uuid) -> Result<Vec<Course>, AppError>;
    async fn list_courses_for_group(&self, group_id: &Uuid) -> Result<Vec<Course>, AppError>;
    async fn update_course(&self, id: &Uuid, request: &CourseRequest) -> Result<Course, AppError>;
    async fn delete_course(&self, id: &Uuid) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl CourseRepository for PostgresRepository {
    async fn create_course(&self, request: &CourseRequest) -> Result<Course, AppError> {
        let course = sqlx::query_as::<_, Course>(&format!(
            r#"
            INSERT INTO courses (name, description, professor_id, group_ids)
            VALUES ($1, $2, $3, $4)
            RETURNING {COURSE_COLUMNS}
            "#
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.professor_id)
        .bind(&request.group_ids)
        .fetch_one(&self.pool)
        .await?;

        Ok(course)
    }

    async fn get_course_by_id(&self, id: &Uuid) -> Result<Option<Course>, AppError> {
        let course = sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(course)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        let courses = sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;

        Ok(courses)
    }

    async fn list_courses_for_professor(&self, professor_id: &Uuid) -> Result<Vec<Course>, AppError> {
        let courses = sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE professor_id = $1 ORDER BY name ASC"))
            .bind(professor_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(courses)
    }

    async fn list_courses_for_group(&self, group_id: &Uuid) -> Result<Vec<Course>, AppError> {
        let courses = sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE $1 = ANY(group_ids) ORDER BY name ASC"))
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(courses)
    }

    async fn update_course(&self, id: &Uuid, request: &CourseRequest) -> Result<Course, AppError> {
        let course = sqlx::query_as::<_, Course>(&format!(
            r#"
            UPDATE courses
            SET name = $1, description = $2, professor_id = $3, group_ids = $4, updated_at = now()
            WHERE id = $5
            RETURNING {COURSE_COLUMNS}
            "#
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.professor_id)
        .bind(&request.group_ids)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        course.ok_or_else(|| AppError::NotFound("Course not found".to_string()))
    }

    async fn delete_course(&self, id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM courses WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
