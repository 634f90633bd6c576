use crate::database::group::GroupRepository;
use crate::database::user::{NewUser, UserRepository, dummy_verify, verify_password};
use crate::error::app_error::AppError;
use crate::models::user::{CreateUserRequest, Role, UpdateUserRequest, User};
use tracing::info;
use uuid::Uuid;

/// Account administration and self-service password handling.
///
/// Privileged operations take the acting administrator's id and password
/// explicitly; nothing here depends on an ambient signed-in identity.
pub struct UserService<'a, R> {
    repository: &'a R,
}

impl<'a, R> UserService<'a, R>
where
    R: UserRepository + GroupRepository,
{
    pub fn new(repository: &'a R) -> Self {
        UserService { repository }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        match self.repository.get_user_by_email(email).await? {
            Some(user) => {
                verify_password(&user, password)?;
                Ok(user)
            }
            None => {
                dummy_verify(password);
                Err(AppError::InvalidCredentials)
            }
        }
    }

    pub async fn get_user(&self, id: &Uuid) -> Result<User, AppError> {
        self.repository.get_user_by_id(id).await?.ok_or(AppError::UserNotFound)
    }

    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, AppError> {
        self.repository.list_users(role).await
    }

    pub async fn change_password(&self, user_id: &Uuid, current_password: &str, new_password: &str) -> Result<(), AppError> {
        let user = self.get_user(user_id).await?;
        verify_password(&user, current_password)?;
        self.repository.update_password(&user.id, new_password).await
    }

    /// Re-checks the acting administrator's own password.
    async fn confirm_admin(&self, admin_id: &Uuid, admin_password: &str) -> Result<User, AppError> {
        let admin = self.repository.get_user_by_id(admin_id).await?.ok_or(AppError::PermissionDenied)?;
        if admin.role != Role::Admin {
            return Err(AppError::PermissionDenied);
        }
        verify_password(&admin, admin_password).map_err(|err| match err {
            AppError::InvalidCredentials => AppError::PermissionDenied,
            other => other,
        })?;
        Ok(admin)
    }

    async fn ensure_group_exists(&self, group_id: &Uuid) -> Result<(), AppError> {
        match self.repository.get_group_by_id(group_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound("Group not found".to_string())),
        }
    }

    pub async fn create_user(&self, admin_id: &Uuid, request: &CreateUserRequest) -> Result<User, AppError> {
        self.confirm_admin(admin_id, &request.admin_password).await?;

        let group_id = student_group(request.role, request.group_id)?;
        if let Some(group_id) = &group_id {
            self.ensure_group_exists(group_id).await?;
        }

        let user = self
            .repository
            .create_user(&NewUser {
                email: &request.email,
                display_name: &request.display_name,
                role: request.role,
                group_id,
                password: &request.password,
            })
            .await?;

        if let Some(group_id) = &group_id {
            self.repository.add_student_to_group(group_id, &user.id).await?;
        }

        info!(user_id = %user.id, role = user.role.as_str(), admin_id = %admin_id, "User created");
        Ok(user)
    }

    /// Moving a student between groups removes them from the old membership
    /// list before adding them to the new one.
    pub async fn update_user(&self, id: &Uuid, request: &UpdateUserRequest) -> Result<User, AppError> {
        let existing = self.get_user(id).await?;
        let group_id = student_group(request.role, request.group_id)?;

        if let Some(group_id) = &group_id {
            self.ensure_group_exists(group_id).await?;
        }

        if existing.group_id != group_id {
            self.repository.remove_student_from_other_groups(id, group_id.as_ref()).await?;
            if let Some(group_id) = &group_id {
                self.repository.add_student_to_group(group_id, id).await?;
            }
        }

        self.repository.update_user(id, &request.display_name, request.role, group_id).await
    }

    pub async fn delete_user(&self, admin_id: &Uuid, id: &Uuid, admin_password: &str) -> Result<(), AppError> {
        self.confirm_admin(admin_id, admin_password).await?;
        if admin_id == id {
            return Err(AppError::BadRequest("Administrators cannot delete their own account".to_string()));
        }

        let user = self.get_user(id).await?;
        self.repository.remove_student_from_other_groups(&user.id, None).await?;
        self.repository.delete_user(&user.id).await?;

        info!(user_id = %user.id, admin_id = %admin_id, "User deleted");
        Ok(())
    }

    pub async fn reset_password(&self, admin_id: &Uuid, id: &Uuid, new_password: &str, admin_password: &str) -> Result<(), AppError> {
        self.confirm_admin(admin_id, admin_password).await?;
        let user = self.get_user(id).await?;
        self.repository.update_password(&user.id, new_password).await?;

        info!(user_id = %user.id, admin_id = %admin_id, "Password reset by administrator");
        Ok(())
    }
}

/// Only students carry a group reference.
fn student_group(role: Role, group_id: Option<Uuid>) -> Result<Option<Uuid>, AppError> {
    match (role, group_id) {
        (Role::Student, group_id) => Ok(group_id),
        (_, None) => Ok(None),
        (_, Some(_)) => Err(AppError::BadRequest("Only students can belong to a group".to_string())),
    }
}
