use crate::database::attendance::{AttendanceRepository, NewScan};
use crate::database::course::CourseRepository;
use crate::database::group::GroupRepository;
use crate::database::session::{NewSession, SessionRepository};
use crate::database::user::{NewUser, UserRepository, password_hash};
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceMethod, AttendanceRecord, AttendanceStatus};
use crate::models::course::{Course, CourseRequest};
use crate::models::group::{Group, GroupRequest};
use crate::models::session::{Session, SessionRequest};
use crate::models::user::{Role, User};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use uuid::Uuid;

pub const ADMIN_PASSWORD: &str = "admin-password";

/// Every fixture account shares one hash so tests pay for Argon2 once.
static FIXTURE_HASH: LazyLock<String> = LazyLock::new(|| password_hash(ADMIN_PASSWORD).unwrap());

/// In-memory stand-in for PostgreSQL that mirrors the storage constraints the
/// services rely on: unique emails, one active session per professor and
/// course, and the conditional scan insert.
#[derive(Default)]
pub struct InMemoryRepository {
    users: Mutex<HashMap<Uuid, User>>,
    groups: Mutex<HashMap<Uuid, Group>>,
    courses: Mutex<HashMap<Uuid, Course>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    attendance: Mutex<HashMap<(Uuid, Uuid), AttendanceRecord>>,
}

impl InMemoryRepository {
    pub fn insert_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn insert_group(&self, group: Group) {
        self.groups.lock().unwrap().insert(group.id, group);
    }

    pub fn insert_course(&self, course: Course) {
        self.courses.lock().unwrap().insert(course.id, course);
    }

    /// Drops a profile without touching group membership, as if the lookup failed.
    pub fn forget_user(&self, id: &Uuid) {
        self.users.lock().unwrap().remove(id);
    }
}

pub struct Fixture {
    pub repo: InMemoryRepository,
    pub admin_id: Uuid,
    pub professor_id: Uuid,
    pub group_id: Uuid,
    pub course_id: Uuid,
    pub student_ids: Vec<Uuid>,
}

impl Fixture {
    /// One admin, one professor, a group of three students and a course
    /// offered to that group.
    pub fn new() -> Self {
        let repo = InMemoryRepository::default();
        let admin_id = Uuid::new_v4();
        let professor_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();

        repo.insert_user(sample_user(admin_id, "Ada Admin", Role::Admin, None));
        repo.insert_user(sample_user(professor_id, "Paul Professor", Role::Professor, None));

        let student_ids: Vec<Uuid> = ["Student A", "Student B", "Student C"]
            .iter()
            .map(|name| {
                let id = Uuid::new_v4();
                repo.insert_user(sample_user(id, name, Role::Student, Some(group_id)));
                id
            })
            .collect();

        repo.insert_group(Group {
            id: group_id,
            name: "Group A".to_string(),
            student_ids: student_ids.clone(),
            created_by: Some(admin_id),
            created_at: Utc::now(),
            ..Group::default()
        });
        repo.insert_course(Course {
            id: course_id,
            name: "Distributed Systems".to_string(),
            professor_id,
            group_ids: vec![group_id],
            created_at: Utc::now(),
            ..Course::default()
        });

        Fixture {
            repo,
            admin_id,
            professor_id,
            group_id,
            course_id,
            student_ids,
        }
    }

    pub fn add_group(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.repo.insert_group(Group {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
            ..Group::default()
        });
        id
    }
}

pub fn sample_user(id: Uuid, display_name: &str, role: Role, group_id: Option<Uuid>) -> User {
    User {
        id,
        email: format!("{}@example.edu", id),
        display_name: display_name.to_string(),
        role,
        group_id,
        password_hash: FIXTURE_HASH.clone(),
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn sample_request(fixture: &Fixture, duration_minutes: i32) -> SessionRequest {
    SessionRequest {
        course_id: fixture.course_id,
        group_id: fixture.group_id,
        duration_minutes,
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryRepository {
    async fn create_user(&self, user: &NewUser<'_>) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|existing| existing.email.eq_ignore_ascii_case(user.email)) {
            return Err(AppError::UserAlreadyExists(user.email.to_string()));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email.to_string(),
            display_name: user.display_name.to_string(),
            role: user.role,
            group_id: user.group_id,
            password_hash: password_hash(user.password)?,
            created_at: Utc::now(),
            updated_at: None,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().values().find(|user| user.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|user| role.is_none_or(|role| user.role == role))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }

    async fn list_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn update_user(&self, id: &Uuid, display_name: &str, role: Role, group_id: Option<Uuid>) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(id).ok_or(AppError::UserNotFound)?;
        user.display_name = display_name.to_string();
        user.role = role;
        user.group_id = group_id;
        user.updated_at = Some(Utc::now());
        Ok(user.clone())
    }

    async fn update_password(&self, id: &Uuid, new_password: &str) -> Result<(), AppError> {
        let hash = password_hash(new_password)?;
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(id).ok_or(AppError::UserNotFound)?;
        user.password_hash = hash;
        Ok(())
    }

    async fn delete_user(&self, id: &Uuid) -> Result<(), AppError> {
        self.users.lock().unwrap().remove(id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl GroupRepository for InMemoryRepository {
    async fn create_group(&self, request: &GroupRequest, created_by: &Uuid) -> Result<Group, AppError> {
        let group = Group {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            description: request.description.clone(),
            student_ids: request.member_ids(),
            created_by: Some(*created_by),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.insert_group(group.clone());
        Ok(group)
    }

    async fn get_group_by_id(&self, id: &Uuid) -> Result<Option<Group>, AppError> {
        Ok(self.groups.lock().unwrap().get(id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        let mut groups: Vec<Group> = self.groups.lock().unwrap().values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn update_group(&self, id: &Uuid, request: &GroupRequest) -> Result<Group, AppError> {
        let mut groups = self.groups.lock().unwrap();
        let group = groups.get_mut(id).ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
        group.name = request.name.clone();
        group.description = request.description.clone();
        group.student_ids = request.member_ids();
        group.updated_at = Some(Utc::now());
        Ok(group.clone())
    }

    async fn delete_group(&self, id: &Uuid) -> Result<(), AppError> {
        self.groups.lock().unwrap().remove(id);
        Ok(())
    }

    async fn add_student_to_group(&self, group_id: &Uuid, student_id: &Uuid) -> Result<(), AppError> {
        let mut groups = self.groups.lock().unwrap();
        let group = groups.get_mut(group_id).ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
        if !group.student_ids.contains(student_id) {
            group.student_ids.push(*student_id);
        }
        Ok(())
    }

    async fn remove_student_from_group(&self, group_id: &Uuid, student_id: &Uuid) -> Result<(), AppError> {
        if let Some(group) = self.groups.lock().unwrap().get_mut(group_id) {
            group.student_ids.retain(|id| id != student_id);
        }
        Ok(())
    }

    async fn remove_student_from_other_groups(&self, student_id: &Uuid, keep: Option<&Uuid>) -> Result<(), AppError> {
        for group in self.groups.lock().unwrap().values_mut() {
            if Some(&group.id) != keep {
                group.student_ids.retain(|id| id != student_id);
            }
        }
        Ok(())
    }

    async fn list_groups_for_student(&self, student_id: &Uuid) -> Result<Vec<Group>, AppError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .values()
            .filter(|group| group.student_ids.contains(student_id))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl CourseRepository for InMemoryRepository {
    async fn create_course(&self, request: &CourseRequest) -> Result<Course, AppError> {
        let course = Course {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            description: request.description.clone(),
            professor_id: request.professor_id,
            group_ids: request.group_ids.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.insert_course(course.clone());
        Ok(course)
    }

    async fn get_course_by_id(&self, id: &Uuid) -> Result<Option<Course>, AppError> {
        Ok(self.courses.lock().unwrap().get(id).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        Ok(self.courses.lock().unwrap().values().cloned().collect())
    }

    async fn list_courses_for_professor(&self, professor_id: &Uuid) -> Result<Vec<Course>, AppError> {
        Ok(self
            .courses
            .lock()
            .unwrap()
            .values()
            .filter(|course| course.professor_id == *professor_id)
            .cloned()
            .collect())
    }

    async fn list_courses_for_group(&self, group_id: &Uuid) -> Result<Vec<Course>, AppError> {
        Ok(self.courses.lock().unwrap().values().filter(|course| course.is_offered_to(group_id)).cloned().collect())
    }

    async fn update_course(&self, id: &Uuid, request: &CourseRequest) -> Result<Course, AppError> {
        let mut courses = self.courses.lock().unwrap();
        let course = courses.get_mut(id).ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
        course.name = request.name.clone();
        course.description = request.description.clone();
        course.professor_id = request.professor_id;
        course.group_ids = request.group_ids.clone();
        Ok(course.clone())
    }

    async fn delete_course(&self, id: &Uuid) -> Result<(), AppError> {
        self.courses.lock().unwrap().remove(id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: &NewSession) -> Result<Session, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions
            .values()
            .any(|s| s.active && s.professor_id == session.professor_id && s.course_id == session.course_id)
        {
            return Err(AppError::ActiveSessionExists);
        }

        let created = Session {
            id: Uuid::new_v4(),
            course_id: session.course_id,
            professor_id: session.professor_id,
            group_id: session.group_id,
            start_time: session.start_time,
            duration_minutes: session.duration_minutes,
            expires_at: session.expires_at,
            current_token: session.token.clone(),
            active: true,
            ended_at: None,
            created_at: session.start_time,
        };
        sessions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_session_by_id(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn find_live_session(&self, professor_id: &Uuid, course_id: &Uuid, now: DateTime<Utc>) -> Result<Option<Session>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.professor_id == *professor_id && s.course_id == *course_id && s.is_live(now))
            .cloned())
    }

    async fn list_active_sessions_for_professor(&self, professor_id: &Uuid, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.professor_id == *professor_id && s.is_live(now))
            .cloned()
            .collect())
    }

    async fn list_sessions_for_course(&self, course_id: &Uuid) -> Result<Vec<Session>, AppError> {
        let mut sessions: Vec<Session> = self.sessions.lock().unwrap().values().filter(|s| s.course_id == *course_id).cloned().collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn update_token(&self, id: &Uuid, token: &str) -> Result<bool, AppError> {
        match self.sessions.lock().unwrap().get_mut(id) {
            Some(session) if session.active => {
                session.current_token = token.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn end_session(&self, id: &Uuid, ended_at: DateTime<Utc>) -> Result<bool, AppError> {
        match self.sessions.lock().unwrap().get_mut(id) {
            Some(session) if session.active => {
                session.active = false;
                session.ended_at = Some(ended_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn end_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let mut ended = Vec::new();
        for session in self.sessions.lock().unwrap().values_mut() {
            if session.active && session.expires_at < now {
                session.active = false;
                session.ended_at = Some(session.expires_at);
                ended.push(session.id);
            }
        }
        Ok(ended)
    }
}

#[async_trait::async_trait]
impl AttendanceRepository for InMemoryRepository {
    async fn record_scan(&self, scan: &NewScan) -> Result<AttendanceRecord, AppError> {
        let mut attendance = self.attendance.lock().unwrap();
        let key = (scan.session_id, scan.student_id);
        if attendance.get(&key).is_some_and(|existing| existing.status.is_recorded()) {
            return Err(AppError::AlreadyRecorded);
        }

        let record = AttendanceRecord {
            session_id: scan.session_id,
            student_id: scan.student_id,
            course_id: scan.course_id,
            status: scan.status,
            method: AttendanceMethod::QrScan,
            scanned_at: Some(scan.scanned_at),
            created_at: attendance.get(&key).map_or(scan.scanned_at, |existing| existing.created_at),
        };
        attendance.insert(key, record.clone());
        Ok(record)
    }

    async fn get_attendance(&self, session_id: &Uuid, student_id: &Uuid) -> Result<Option<AttendanceRecord>, AppError> {
        Ok(self.attendance.lock().unwrap().get(&(*session_id, *student_id)).cloned())
    }

    async fn list_for_session(&self, session_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(self
            .attendance
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.session_id == *session_id)
            .cloned()
            .collect())
    }

    async fn list_for_student(&self, student_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(self
            .attendance
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.student_id == *student_id)
            .cloned()
            .collect())
    }

    async fn count_recorded_for_session(&self, session_id: &Uuid) -> Result<i64, AppError> {
        let count = self
            .attendance
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.session_id == *session_id && record.status.is_recorded())
            .count();
        Ok(count as i64)
    }

    async fn mark_absent(&self, session_id: &Uuid, student_id: &Uuid, course_id: &Uuid) -> Result<AttendanceRecord, AppError> {
        let mut attendance = self.attendance.lock().unwrap();
        let record = attendance.entry((*session_id, *student_id)).or_insert_with(|| AttendanceRecord {
            session_id: *session_id,
            student_id: *student_id,
            course_id: *course_id,
            status: AttendanceStatus::Absent,
            method: AttendanceMethod::Manual,
            scanned_at: None,
            created_at: Utc::now(),
        });
        Ok(record.clone())
    }

    async fn update_status(&self, session_id: &Uuid, student_id: &Uuid, status: AttendanceStatus) -> Result<AttendanceRecord, AppError> {
        let mut attendance = self.attendance.lock().unwrap();
        let record = attendance
            .get_mut(&(*session_id, *student_id))
            .ok_or_else(|| AppError::NotFound("Attendance record not found".to_string()))?;
        record.status = status;
        record.method = AttendanceMethod::Manual;
        Ok(record.clone())
    }
}
