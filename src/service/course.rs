use crate::database::course::CourseRepository;
use crate::database::group::GroupRepository;
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::course::{Course, CourseRequest};
use crate::models::user::Role;
use uuid::Uuid;

pub struct CourseService<'a, R> {
    repository: &'a R,
}

impl<'a, R> CourseService<'a, R>
where
    R: CourseRepository + GroupRepository + UserRepository,
{
    pub fn new(repository: &'a R) -> Self {
        CourseService { repository }
    }

    pub async fn get_course(&self, id: &Uuid) -> Result<Course, AppError> {
        self.repository
            .get_course_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        self.repository.list_courses().await
    }

    pub async fn courses_for_professor(&self, professor_id: &Uuid) -> Result<Vec<Course>, AppError> {
        self.repository.list_courses_for_professor(professor_id).await
    }

    pub async fn courses_for_group(&self, group_id: &Uuid) -> Result<Vec<Course>, AppError> {
        self.repository.list_courses_for_group(group_id).await
    }

    pub async fn delete_course(&self, id: &Uuid) -> Result<(), AppError> {
        self.get_course(id).await?;
        self.repository.delete_course(id).await
    }

    pub async fn create_course(&self, request: &CourseRequest) -> Result<Course, AppError> {
        self.check_references(request).await?;
        self.repository.create_course(request).await
    }

    pub async fn update_course(&self, id: &Uuid, request: &CourseRequest) -> Result<Course, AppError> {
        self.check_references(request).await?;
        self.repository.update_course(id, request).await
    }

    async fn check_references(&self, request: &CourseRequest) -> Result<(), AppError> {
        match self.repository.get_user_by_id(&request.professor_id).await? {
            Some(user) if user.role == Role::Professor => {}
            Some(_) => return Err(AppError::BadRequest("Course owner must be a professor".to_string())),
            None => return Err(AppError::UserNotFound),
        }

        for group_id in &request.group_ids {
            if self.repository.get_group_by_id(group_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Group {} not found", group_id)));
            }
        }
        Ok(())
    }
}
