use crate::database::attendance::AttendanceRepository;
use crate::database::group::GroupRepository;
use crate::database::session::SessionRepository;
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceRecord, AttendanceStats, AttendanceStatus, RosterResponse, RosterRow};
use crate::models::session::Session;
use crate::models::user::{Role, User};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

const UNKNOWN_STUDENT: &str = "Unknown student";

pub struct AttendanceService<'a, R> {
    repository: &'a R,
}

impl<'a, R> AttendanceService<'a, R>
where
    R: SessionRepository + AttendanceRepository + GroupRepository + UserRepository,
{
    pub fn new(repository: &'a R) -> Self {
        AttendanceService { repository }
    }

    async fn visible_session(&self, session_id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<Session, AppError> {
        let session = self.repository.get_session_by_id(session_id).await?.ok_or(AppError::SessionNotFound)?;
        if role != Role::Admin && session.professor_id != *viewer_id {
            return Err(AppError::PermissionDenied);
        }
        Ok(session)
    }

    pub async fn list_for_session(&self, session_id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<Vec<AttendanceRecord>, AppError> {
        let session = self.visible_session(session_id, viewer_id, role).await?;
        self.repository.list_for_session(&session.id).await
    }

    pub async fn list_for_student(&self, student_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        self.repository.list_for_student(student_id).await
    }

    /// Every student of the session's group with their status. Students without
    /// a record count as absent. Records for students who have since left the
    /// group are kept.
    pub async fn roster(&self, session_id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<RosterResponse, AppError> {
        let session = self.visible_session(session_id, viewer_id, role).await?;
        let records = self.repository.list_for_session(&session.id).await?;

        let mut student_ids = match self.repository.get_group_by_id(&session.group_id).await? {
            Some(group) => group.student_ids,
            None => {
                warn!(session_id = %session.id, group_id = %session.group_id, "Session group no longer exists");
                Vec::new()
            }
        };
        for record in &records {
            if !student_ids.contains(&record.student_id) {
                student_ids.push(record.student_id);
            }
        }

        let profiles = self.profiles(&student_ids).await;
        let by_student: HashMap<Uuid, &AttendanceRecord> = records.iter().map(|record| (record.student_id, record)).collect();

        let rows = roster_rows(&student_ids, &by_student, &profiles);
        Ok(RosterResponse {
            session_id: session.id,
            stats: AttendanceStats::from_rows(&rows),
            rows,
        })
    }

    pub async fn stats(&self, session_id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<AttendanceStats, AppError> {
        Ok(self.roster(session_id, viewer_id, role).await?.stats)
    }

    /// Profile lookup failures degrade to placeholder rows instead of failing the roster.
    async fn profiles(&self, student_ids: &[Uuid]) -> HashMap<Uuid, User> {
        match self.repository.list_users_by_ids(student_ids).await {
            Ok(users) => users.into_iter().map(|user| (user.id, user)).collect(),
            Err(err) => {
                warn!(error = %err, "Failed to load student profiles for roster");
                HashMap::new()
            }
        }
    }

    pub async fn mark_absent(&self, session_id: &Uuid, student_id: &Uuid, professor_id: &Uuid) -> Result<AttendanceRecord, AppError> {
        let session = self.visible_session(session_id, professor_id, Role::Professor).await?;
        let record = self.repository.mark_absent(&session.id, student_id, &session.course_id).await?;
        info!(session_id = %session.id, student_id = %student_id, status = ?record.status, "Absence marked");
        Ok(record)
    }

    pub async fn update_status(&self, session_id: &Uuid, student_id: &Uuid, status: AttendanceStatus, professor_id: &Uuid) -> Result<AttendanceRecord, AppError> {
        let session = self.visible_session(session_id, professor_id, Role::Professor).await?;
        let record = self.repository.update_status(&session.id, student_id, status).await?;
        info!(session_id = %session.id, student_id = %student_id, status = ?status, "Attendance status corrected");
        Ok(record)
    }
}

fn roster_rows(student_ids: &[Uuid], records: &HashMap<Uuid, &AttendanceRecord>, profiles: &HashMap<Uuid, User>) -> Vec<RosterRow> {
    let mut rows: Vec<RosterRow> = student_ids
        .iter()
        .map(|student_id| {
            let record = records.get(student_id);
            let profile = profiles.get(student_id);
            if profile.is_none() {
                warn!(student_id = %student_id, "Student profile missing, using placeholder");
            }

            RosterRow {
                student_id: *student_id,
                display_name: profile.map_or_else(|| UNKNOWN_STUDENT.to_string(), |user| user.display_name.clone()),
                email: profile.map(|user| user.email.clone()),
                status: record.map_or(AttendanceStatus::Absent, |record| record.status),
                scanned_at: record.and_then(|record| record.scanned_at),
            }
        })
        .collect();

    rows.sort_by(|a, b| a.status.rank().cmp(&b.status.rank()).then_with(|| a.display_name.cmp(&b.display_name)));
    rows
}
