use crate::database::group::GroupRepository;
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::group::{Group, GroupRequest};
use crate::models::user::{Role, User};
use tracing::info;
use uuid::Uuid;

/// Group membership, kept in step with each student's own group reference.
/// A student appears in at most one group's membership list.
pub struct GroupService<'a, R> {
    repository: &'a R,
}

impl<'a, R> GroupService<'a, R>
where
    R: GroupRepository + UserRepository,
{
    pub fn new(repository: &'a R) -> Self {
        GroupService { repository }
    }

    pub async fn get_group(&self, id: &Uuid) -> Result<Group, AppError> {
        self.repository
            .get_group_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        self.repository.list_groups().await
    }

    pub async fn groups_for_student(&self, student_id: &Uuid) -> Result<Vec<Group>, AppError> {
        self.repository.list_groups_for_student(student_id).await
    }

    pub async fn create_group(&self, request: &GroupRequest, created_by: &Uuid) -> Result<Group, AppError> {
        let students = self.students(&request.member_ids()).await?;
        let group = self.repository.create_group(request, created_by).await?;
        for student in &students {
            self.attach(&group.id, student).await?;
        }

        info!(group_id = %group.id, members = group.student_ids.len(), "Group created");
        self.get_group(&group.id).await
    }

    pub async fn update_group(&self, id: &Uuid, request: &GroupRequest) -> Result<Group, AppError> {
        let existing = self.get_group(id).await?;
        let students = self.students(&request.member_ids()).await?;

        let departed: Vec<Uuid> = existing
            .student_ids
            .iter()
            .filter(|student_id| !request.student_ids.contains(student_id))
            .copied()
            .collect();

        self.repository.update_group(id, request).await?;
        for student in &students {
            self.attach(id, student).await?;
        }
        for student in self.repository.list_users_by_ids(&departed).await? {
            self.detach(id, &student).await?;
        }

        self.get_group(id).await
    }

    pub async fn delete_group(&self, id: &Uuid) -> Result<(), AppError> {
        let group = self.get_group(id).await?;
        for student in self.repository.list_users_by_ids(&group.student_ids).await? {
            self.detach(&group.id, &student).await?;
        }
        self.repository.delete_group(&group.id).await?;

        info!(group_id = %group.id, "Group deleted");
        Ok(())
    }

    pub async fn add_student(&self, group_id: &Uuid, student_id: &Uuid) -> Result<Group, AppError> {
        self.get_group(group_id).await?;
        let students = self.students(std::slice::from_ref(student_id)).await?;
        for student in &students {
            self.attach(group_id, student).await?;
        }
        self.get_group(group_id).await
    }

    pub async fn remove_student(&self, group_id: &Uuid, student_id: &Uuid) -> Result<Group, AppError> {
        self.get_group(group_id).await?;
        match self.repository.get_user_by_id(student_id).await? {
            Some(student) => self.detach(group_id, &student).await?,
            None => self.repository.remove_student_from_group(group_id, student_id).await?,
        }
        self.get_group(group_id).await
    }

    /// Loads the given ids, failing unless every one is an existing student.
    async fn students(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
        let users = self.repository.list_users_by_ids(ids).await?;
        for id in ids {
            match users.iter().find(|user| user.id == *id) {
                Some(user) if user.role == Role::Student => {}
                Some(_) => return Err(AppError::BadRequest(format!("User {} is not a student", id))),
                None => return Err(AppError::NotFound(format!("Student {} not found", id))),
            }
        }
        Ok(users)
    }

    async fn attach(&self, group_id: &Uuid, student: &User) -> Result<(), AppError> {
        self.repository.remove_student_from_other_groups(&student.id, Some(group_id)).await?;
        self.repository.add_student_to_group(group_id, &student.id).await?;
        if student.group_id != Some(*group_id) {
            self.repository
                .update_user(&student.id, &student.display_name, student.role, Some(*group_id))
                .await?;
        }
        Ok(())
    }

    async fn detach(&self, group_id: &Uuid, student: &User) -> Result<(), AppError> {
        self.repository.remove_student_from_group(group_id, &student.id).await?;
        if student.group_id == Some(*group_id) {
            self.repository.update_user(&student.id, &student.display_name, student.role, None).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;

    fn request(name: &str, student_ids: Vec<Uuid>) -> GroupRequest {
        GroupRequest {
            name: name.to_string(),
            description: None,
            student_ids,
        }
    }

    #[tokio::test]
    async fn adding_student_moves_them_out_of_previous_group() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);
        let student = fixture.student_ids[0];

        let created = service.create_group(&request("Group B", vec![]), &fixture.admin_id).await.unwrap();
        let updated = service.add_student(&created.id, &student).await.unwrap();

        assert_eq!(updated.student_ids, vec![student]);
        let old = service.get_group(&fixture.group_id).await.unwrap();
        assert!(!old.student_ids.contains(&student));
        assert_eq!(service.groups_for_student(&student).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn adding_student_twice_keeps_one_entry() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);
        let student = fixture.student_ids[0];

        service.add_student(&fixture.group_id, &student).await.unwrap();
        let group = service.add_student(&fixture.group_id, &student).await.unwrap();

        assert_eq!(group.student_ids.iter().filter(|id| **id == student).count(), 1);
    }

    #[tokio::test]
    async fn create_group_with_members_claims_them() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);
        let members = vec![fixture.student_ids[1], fixture.student_ids[2]];

        let group = service.create_group(&request("Group C", members.clone()), &fixture.admin_id).await.unwrap();

        assert_eq!(group.student_ids, members);
        let old = service.get_group(&fixture.group_id).await.unwrap();
        assert_eq!(old.student_ids, vec![fixture.student_ids[0]]);
    }

    #[tokio::test]
    async fn repeated_member_ids_are_stored_once() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);
        let (a, b) = (fixture.student_ids[1], fixture.student_ids[2]);

        let group = service.create_group(&request("Group D", vec![a, a, b, a]), &fixture.admin_id).await.unwrap();
        assert_eq!(group.student_ids, vec![a, b]);

        let group = service.update_group(&group.id, &request("Group D", vec![b, b])).await.unwrap();
        assert_eq!(group.student_ids, vec![b]);
    }

    #[tokio::test]
    async fn only_students_can_be_members() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);

        let result = service.add_student(&fixture.group_id, &fixture.professor_id).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn removing_student_clears_their_group() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);
        let student = fixture.student_ids[0];

        let group = service.remove_student(&fixture.group_id, &student).await.unwrap();

        assert!(!group.student_ids.contains(&student));
        let user = fixture.repo.get_user_by_id(&student).await.unwrap().unwrap();
        assert_eq!(user.group_id, None);
    }

    #[tokio::test]
    async fn update_group_detaches_departed_members() {
        let fixture = Fixture::new();
        let service = GroupService::new(&fixture.repo);

        let group = service
            .update_group(&fixture.group_id, &request("Renamed", vec![fixture.student_ids[0]]))
            .await
            .unwrap();

        assert_eq!(group.name, "Renamed");
        assert_eq!(group.student_ids, vec![fixture.student_ids[0]]);
        let departed = fixture.repo.get_user_by_id(&fixture.student_ids[1]).await.unwrap().unwrap();
        assert_eq!(departed.group_id, None);
    }
}
