use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    /// Present and late records count as a scan; absent ones do not.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }

    /// Roster order: present, then late, then absent.
    pub fn rank(&self) -> u8 {
        match self {
            AttendanceStatus::Present => 0,
            AttendanceStatus::Late => 1,
            AttendanceStatus::Absent => 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceMethod {
    QrScan,
    Manual,
}

/// Outcome of one student's scan (or explicit absence) for one session.
/// Keyed by `(session_id, student_id)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: AttendanceStatus,
    pub method: AttendanceMethod,
    pub scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ScanRequest {
    /// Raw string decoded from the QR code.
    #[validate(length(min = 1, max = 4096))]
    pub payload: String,
}

#[derive(Deserialize, Debug, JsonSchema)]
pub struct MarkAbsentRequest {
    pub student_id: Uuid,
}

#[derive(Deserialize, Debug, JsonSchema)]
pub struct UpdateStatusRequest {
    pub status: AttendanceStatus,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct AttendanceResponse {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: AttendanceStatus,
    pub method: AttendanceMethod,
    pub scanned_at: Option<DateTime<Utc>>,
}

impl From<&AttendanceRecord> for AttendanceResponse {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            session_id: record.session_id,
            student_id: record.student_id,
            course_id: record.course_id,
            status: record.status,
            method: record.method,
            scanned_at: record.scanned_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, JsonSchema)]
pub struct RosterRow {
    pub student_id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub status: AttendanceStatus,
    pub scanned_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq, JsonSchema)]
pub struct AttendanceStats {
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub total: i64,
}

impl AttendanceStats {
    pub fn from_rows(rows: &[RosterRow]) -> Self {
        rows.iter().fold(AttendanceStats::default(), |mut stats, row| {
            match row.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Late => stats.late += 1,
                AttendanceStatus::Absent => stats.absent += 1,
            }
            stats.total += 1;
            stats
        })
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct RosterResponse {
    pub session_id: Uuid,
    pub stats: AttendanceStats,
    pub rows: Vec<RosterRow>,
}
