use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceMethod, AttendanceRecord, AttendanceStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "session_id, student_id, course_id, status, method, scanned_at, created_at";

#[derive(Debug, Clone)]
pub struct NewScan {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: AttendanceStatus,
    pub scanned_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// Records a scan unless the student already has a present or late record
    /// for the session, in which case `AlreadyRecorded` is returned. An absent
    /// record is upgraded in place.
    async fn record_scan(&self, scan: &NewScan) -> Result<AttendanceRecord, AppError>;
    async fn get_attendance(&self, session_id: &Uuid, student_id: &Uuid) -> Result<Option<AttendanceRecord>, AppError>;
    async fn list_for_session(&self, session_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError>;
    async fn list_for_student(&self, student_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError>;
    async fn count_recorded_for_session(&self, session_id: &Uuid) -> Result<i64, AppError>;
    /// Inserts an absent record. An existing record of any status is returned unchanged.
    async fn mark_absent(&self, session_id: &Uuid, student_id: &Uuid, course_id: &Uuid) -> Result<AttendanceRecord, AppError>;
    async fn update_status(&self, session_id: &Uuid, student_id: &Uuid, status: AttendanceStatus) -> Result<AttendanceRecord, AppError>;
}

#[async_trait::async_trait]
impl AttendanceRepository for PostgresRepository {
    async fn record_scan(&self, scan: &NewScan) -> Result<AttendanceRecord, AppError> {
        // The conflict arm only fires for absent rows, so two racing scans
        // cannot both succeed.
        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            INSERT INTO attendance_records (session_id, student_id, course_id, status, method, scanned_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id, student_id) DO UPDATE
            SET status = EXCLUDED.status, method = EXCLUDED.method, scanned_at = EXCLUDED.scanned_at
            WHERE attendance_records.status = 'absent'
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(scan.session_id)
        .bind(scan.student_id)
        .bind(scan.course_id)
        .bind(scan.status)
        .bind(AttendanceMethod::QrScan)
        .bind(scan.scanned_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to record scan", e))?;

        record.ok_or(AppError::AlreadyRecorded)
    }

    async fn get_attendance(&self, session_id: &Uuid, student_id: &Uuid) -> Result<Option<AttendanceRecord>, AppError> {
        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE session_id = $1 AND student_id = $2"
        ))
        .bind(session_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_for_session(&self, session_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        let records = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE session_id = $1 ORDER BY scanned_at ASC NULLS LAST"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_for_student(&self, student_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        let records = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE student_id = $1 ORDER BY created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_recorded_for_session(&self, session_id: &Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance_records WHERE session_id = $1 AND status <> 'absent'")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn mark_absent(&self, session_id: &Uuid, student_id: &Uuid, course_id: &Uuid) -> Result<AttendanceRecord, AppError> {
        let inserted = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            INSERT INTO attendance_records (session_id, student_id, course_id, status, method, scanned_at)
            VALUES ($1, $2, $3, 'absent', $4, NULL)
            ON CONFLICT (session_id, student_id) DO NOTHING
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(student_id)
        .bind(course_id)
        .bind(AttendanceMethod::Manual)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(record) => Ok(record),
            None => self
                .get_attendance(session_id, student_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Attendance record not found".to_string())),
        }
    }

    async fn update_status(&self, session_id: &Uuid, student_id: &Uuid, status: AttendanceStatus) -> Result<AttendanceRecord, AppError> {
        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            UPDATE attendance_records
            SET status = $1, method = $2
            WHERE session_id = $3 AND student_id = $4
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(status)
        .bind(AttendanceMethod::Manual)
        .bind(session_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| AppError::NotFound("Attendance record not found".to_string()))
    }
}
