use crate::config::SessionConfig;
use crate::database::attendance::AttendanceRepository;
use crate::database::course::CourseRepository;
use crate::database::group::GroupRepository;
use crate::database::session::{NewSession, SessionRepository};
use crate::error::app_error::AppError;
use crate::models::qr::QrPayload;
use crate::models::session::{AttendanceCountResponse, QrCodeResponse, Session, SessionRequest, SessionTokenResponse};
use crate::models::user::Role;
use crate::service::token::generate_token;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use qrcode::QrCode;
use tracing::{debug, info};
use uuid::Uuid;

/// Why a session stopped accepting scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Manual,
    Countdown,
    Sweep,
}

impl EndReason {
    fn as_str(&self) -> &'static str {
        match self {
            EndReason::Manual => "manual",
            EndReason::Countdown => "countdown",
            EndReason::Sweep => "sweep",
        }
    }
}

pub struct SessionService<'a, R> {
    repository: &'a R,
    config: &'a SessionConfig,
}

impl<'a, R> SessionService<'a, R>
where
    R: SessionRepository + AttendanceRepository + CourseRepository + GroupRepository,
{
    pub fn new(repository: &'a R, config: &'a SessionConfig) -> Self {
        SessionService { repository, config }
    }

    pub async fn start_session(&self, professor_id: &Uuid, request: &SessionRequest) -> Result<Session, AppError> {
        self.start_session_at(professor_id, request, Utc::now()).await
    }

    pub async fn start_session_at(&self, professor_id: &Uuid, request: &SessionRequest, now: DateTime<Utc>) -> Result<Session, AppError> {
        let minutes = i64::from(request.duration_minutes);
        if minutes < self.config.min_duration_minutes || minutes > self.config.max_duration_minutes {
            return Err(AppError::BadRequest(format!(
                "Session duration must be between {} and {} minutes",
                self.config.min_duration_minutes, self.config.max_duration_minutes
            )));
        }

        if self.repository.get_group_by_id(&request.group_id).await?.is_none() {
            return Err(AppError::NotFound("Group not found".to_string()));
        }

        let course = self
            .repository
            .get_course_by_id(&request.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
        if course.professor_id != *professor_id {
            return Err(AppError::PermissionDenied);
        }
        if !course.is_offered_to(&request.group_id) {
            return Err(AppError::BadRequest("Course is not offered to this group".to_string()));
        }

        // Stale rows still flagged active would otherwise trip the single-active index.
        self.sweep_expired(now).await?;
        if self.repository.find_live_session(professor_id, &course.id, now).await?.is_some() {
            return Err(AppError::ActiveSessionExists);
        }

        let new_session = NewSession {
            course_id: course.id,
            professor_id: *professor_id,
            group_id: request.group_id,
            start_time: now,
            duration_minutes: request.duration_minutes,
            expires_at: now + Duration::minutes(minutes),
            token: generate_token(),
        };
        let session = self.repository.create_session(&new_session).await?;

        info!(
            session_id = %session.id,
            course_id = %session.course_id,
            group_id = %session.group_id,
            professor_id = %professor_id,
            expires_at = %session.expires_at,
            "Session started"
        );
        Ok(session)
    }

    pub async fn get_session(&self, id: &Uuid) -> Result<Session, AppError> {
        self.repository.get_session_by_id(id).await?.ok_or(AppError::SessionNotFound)
    }

    /// Admins may read any session; professors only their own.
    pub async fn get_visible_session(&self, id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<Session, AppError> {
        let session = self.get_session(id).await?;
        if role != Role::Admin && session.professor_id != *viewer_id {
            return Err(AppError::PermissionDenied);
        }
        Ok(session)
    }

    pub async fn get_owned_session(&self, id: &Uuid, professor_id: &Uuid) -> Result<Session, AppError> {
        let session = self.get_session(id).await?;
        if session.professor_id != *professor_id {
            return Err(AppError::PermissionDenied);
        }
        Ok(session)
    }

    pub async fn rotate_token(&self, id: &Uuid, professor_id: &Uuid) -> Result<SessionTokenResponse, AppError> {
        self.rotate_token_at(id, professor_id, Utc::now()).await
    }

    pub async fn rotate_token_at(&self, id: &Uuid, professor_id: &Uuid, now: DateTime<Utc>) -> Result<SessionTokenResponse, AppError> {
        let session = self.get_owned_session(id, professor_id).await?;
        if !session.is_live(now) {
            return Err(AppError::SessionEnded);
        }

        let token = generate_token();
        if !self.repository.update_token(&session.id, &token).await? {
            return Err(AppError::SessionEnded);
        }

        debug!(session_id = %session.id, "Session token rotated");
        Ok(token_response(&session, token, now))
    }

    /// Ending a session that has already ended leaves it untouched.
    pub async fn end_session(&self, id: &Uuid, professor_id: &Uuid) -> Result<Session, AppError> {
        self.end_session_at(id, professor_id, Utc::now()).await
    }

    pub async fn end_session_at(&self, id: &Uuid, professor_id: &Uuid, now: DateTime<Utc>) -> Result<Session, AppError> {
        self.get_owned_session(id, professor_id).await?;
        self.close(id, now, EndReason::Manual).await
    }

    async fn close(&self, id: &Uuid, now: DateTime<Utc>, reason: EndReason) -> Result<Session, AppError> {
        if self.repository.end_session(id, now).await? {
            info!(session_id = %id, reason = reason.as_str(), "Session ended");
        }
        self.get_session(id).await
    }

    pub async fn current_token(&self, id: &Uuid, professor_id: &Uuid) -> Result<SessionTokenResponse, AppError> {
        let now = Utc::now();
        let session = self.get_owned_session(id, professor_id).await?;
        if !session.is_live(now) {
            return Err(AppError::SessionEnded);
        }
        Ok(token_response(&session, session.current_token.clone(), now))
    }

    pub async fn qr_code(&self, id: &Uuid, professor_id: &Uuid) -> Result<QrCodeResponse, AppError> {
        let now = Utc::now();
        let session = self.get_owned_session(id, professor_id).await?;
        if !session.is_live(now) {
            return Err(AppError::SessionEnded);
        }

        let payload = QrPayload::new(session.id, session.course_id, session.current_token.clone(), now.timestamp_millis());
        Ok(QrCodeResponse {
            session_id: session.id,
            qr_code: render_qr_svg(&payload.stringify())?,
            remaining_seconds: session.remaining_seconds(now),
        })
    }

    pub async fn refresh_attendance_count(&self, id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<AttendanceCountResponse, AppError> {
        let now = Utc::now();
        let session = self.get_visible_session(id, viewer_id, role).await?;
        let count = self.repository.count_recorded_for_session(&session.id).await?;

        Ok(AttendanceCountResponse {
            session_id: session.id,
            count,
            state: session.state(now),
            remaining_seconds: session.remaining_seconds(now),
            poll_after_seconds: self.config.attendance_poll_seconds,
        })
    }

    pub async fn list_active_for_professor(&self, professor_id: &Uuid) -> Result<Vec<Session>, AppError> {
        self.repository.list_active_sessions_for_professor(professor_id, Utc::now()).await
    }

    pub async fn list_for_course(&self, course_id: &Uuid, viewer_id: &Uuid, role: Role) -> Result<Vec<Session>, AppError> {
        let course = self
            .repository
            .get_course_by_id(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
        if role != Role::Admin && course.professor_id != *viewer_id {
            return Err(AppError::PermissionDenied);
        }
        self.repository.list_sessions_for_course(&course.id).await
    }

    /// Closes every session whose expiry has passed while still flagged active.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ended = self.repository.end_expired_sessions(now).await?;
        for id in &ended {
            info!(session_id = %id, reason = EndReason::Sweep.as_str(), "Session ended");
        }
        Ok(ended)
    }

    /// Advance a countdown and end its session once the remaining time hits zero.
    pub async fn tick(&self, countdown: &mut CountdownController, seconds_elapsed: u64) -> Result<CountdownState, AppError> {
        if let Some(expired) = countdown.advance(seconds_elapsed) {
            self.close(&expired, Utc::now(), EndReason::Countdown).await?;
        }
        Ok(countdown.state())
    }

    /// Count a freshly started session down on a fixed period, ending it when
    /// the time runs out. Each tick of `period` takes `step_seconds` off the clock.
    pub async fn run_countdown(&self, session: &Session, period: std::time::Duration, step_seconds: u64) -> Result<CountdownState, AppError> {
        let mut countdown = CountdownController::new();
        countdown.begin(session, Utc::now());

        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        while let CountdownState::Active { .. } = countdown.state() {
            ticker.tick().await;
            self.tick(&mut countdown, step_seconds).await?;
        }
        Ok(countdown.state())
    }
}

fn token_response(session: &Session, token: String, now: DateTime<Utc>) -> SessionTokenResponse {
    let qr_payload = QrPayload::new(session.id, session.course_id, token.clone(), now.timestamp_millis()).stringify();
    SessionTokenResponse {
        session_id: session.id,
        token,
        qr_payload,
    }
}

pub(crate) fn render_qr_svg(content: &str) -> Result<String, AppError> {
    let qr = QrCode::new(content.as_bytes()).map_err(|e| AppError::BadRequest(format!("Failed to generate QR code: {}", e)))?;
    let svg = qr.render::<qrcode::render::svg::Color>().min_dimensions(240, 240).build();
    Ok(format!("data:image/svg+xml;base64,{}", general_purpose::STANDARD.encode(svg.as_bytes())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    NoSession,
    Active { session_id: Uuid, remaining_seconds: u64 },
    Ended { session_id: Uuid },
}

/// In-process countdown for a client that displays a session.
///
/// `NoSession -> Active -> Ended`. Starting another session restarts the machine.
#[derive(Debug, Clone)]
pub struct CountdownController {
    state: CountdownState,
}

impl Default for CountdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownController {
    pub fn new() -> Self {
        Self {
            state: CountdownState::NoSession,
        }
    }

    pub fn begin(&mut self, session: &Session, now: DateTime<Utc>) {
        self.state = if session.is_live(now) {
            CountdownState::Active {
                session_id: session.id,
                remaining_seconds: session.remaining_seconds(now).max(0) as u64,
            }
        } else {
            CountdownState::Ended { session_id: session.id }
        };
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    /// Returns the session id exactly once, on the tick that reaches zero.
    pub fn advance(&mut self, seconds_elapsed: u64) -> Option<Uuid> {
        match self.state {
            CountdownState::Active {
                session_id,
                remaining_seconds,
            } => {
                let remaining = remaining_seconds.saturating_sub(seconds_elapsed);
                if remaining == 0 {
                    self.state = CountdownState::Ended { session_id };
                    Some(session_id)
                } else {
                    self.state = CountdownState::Active {
                        session_id,
                        remaining_seconds: remaining,
                    };
                    None
                }
            }
            CountdownState::NoSession | CountdownState::Ended { .. } => None,
        }
    }
}
