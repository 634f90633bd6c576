use crate::error::app_error::AppError;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;

/// Wire format encoded into the displayed QR code.
///
/// `timestamp` is the generation time in epoch milliseconds. It is informational
/// only: expiry is decided by comparing `token` with the session's current token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub session_id: Uuid,
    pub course_id: Uuid,
    pub token: String,
    pub timestamp: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQrPayload {
    session_id: Option<String>,
    course_id: Option<String>,
    token: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl QrPayload {
    pub fn new(session_id: Uuid, course_id: Uuid, token: impl Into<String>, timestamp: i64) -> Self {
        Self {
            session_id,
            course_id,
            token: token.into(),
            timestamp,
        }
    }

    pub fn stringify(&self) -> String {
        // A struct of strings and integers cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a scanned string. Anything that is not a JSON object carrying
    /// non-empty `sessionId`, `courseId` and `token` is rejected. A `sessionId`
    /// that is not a UUID names no session, so it reports `SessionNotFound`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let payload: RawQrPayload = serde_json::from_str(raw.trim()).map_err(|_| AppError::InvalidPayload)?;

        let session_id = required(payload.session_id)?;
        let course_id = required(payload.course_id)?;
        let token = required(payload.token)?;

        Ok(Self {
            session_id: Uuid::parse_str(&session_id).map_err(|_| AppError::SessionNotFound)?,
            course_id: Uuid::parse_str(&course_id).map_err(|_| AppError::InvalidPayload)?,
            token,
            timestamp: payload.timestamp.unwrap_or_default(),
        })
    }
}

fn required(field: Option<String>) -> Result<String, AppError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::InvalidPayload),
    }
}
