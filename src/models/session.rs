use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// One attendance window for a course and group, owned by a professor.
///
/// Sessions are never deleted. Ending a session flips `active` and records
/// `ended_at`; the row stays for history.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub course_id: Uuid,
    pub professor_id: Uuid,
    pub group_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub expires_at: DateTime<Utc>,
    pub current_token: String,
    pub active: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Ended,
}

impl Session {
    /// Live while the flag is set and the expiry has not passed. This drives what
    /// a professor sees; scan acceptance goes by the stored flag alone.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && now <= self.expires_at
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_live(now) { SessionState::Active } else { SessionState::Ended }
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_live(now) {
            return 0;
        }
        (self.expires_at - now).num_seconds().max(0)
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct SessionRequest {
    pub course_id: Uuid,
    pub group_id: Uuid,
    #[validate(range(min = 1))]
    pub duration_minutes: i32,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub professor_id: Uuid,
    pub group_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
    pub remaining_seconds: i64,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionResponse {
    pub fn at(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            course_id: session.course_id,
            professor_id: session.professor_id,
            group_id: session.group_id,
            start_time: session.start_time,
            duration_minutes: session.duration_minutes,
            expires_at: session.expires_at,
            state: session.state(now),
            remaining_seconds: session.remaining_seconds(now),
            ended_at: session.ended_at,
        }
    }
}

/// Current token for the owning professor's display. Never shown to students.
#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionTokenResponse {
    pub session_id: Uuid,
    pub token: String,
    /// The exact string to encode into the displayed QR code.
    pub qr_payload: String,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct QrCodeResponse {
    pub session_id: Uuid,
    /// SVG image as a data URL.
    pub qr_code: String,
    pub remaining_seconds: i64,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct AttendanceCountResponse {
    pub session_id: Uuid,
    pub count: i64,
    pub state: SessionState,
    pub remaining_seconds: i64,
    /// Suggested delay before the next poll.
    pub poll_after_seconds: u64,
}
