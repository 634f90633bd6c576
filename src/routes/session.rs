use crate::auth::CurrentUser;
use crate::config::{Config, SessionConfig};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::attendance::{AttendanceResponse, AttendanceStats, MarkAbsentRequest, RosterResponse, UpdateStatusRequest};
use crate::models::session::{AttendanceCountResponse, QrCodeResponse, Session, SessionRequest, SessionResponse, SessionTokenResponse};
use crate::models::user::Role;
use crate::service::attendance::AttendanceService;
use crate::service::session::SessionService;
use chrono::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

const COUNTDOWN_TICK: std::time::Duration = std::time::Duration::from_secs(1);

fn to_responses(sessions: &[Session]) -> Vec<SessionResponse> {
    let now = Utc::now();
    sessions.iter().map(|session| SessionResponse::at(session, now)).collect()
}

/// Start an attendance session for one of the professor's courses
#[openapi(tag = "Sessions")]
#[post("/", data = "<payload>")]
pub async fn start_session(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: Json<SessionRequest>,
) -> Result<(Status, Json<SessionResponse>), AppError> {
    current_user.require(Role::Professor)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let session = SessionService::new(&repo, &config.session).start_session(&current_user.id, &payload).await?;
    spawn_countdown(repo, config.session.clone(), session.clone());
    Ok((Status::Created, Json(SessionResponse::at(&session, Utc::now()))))
}

/// Ends the session on the server when its countdown reaches zero. The
/// expiry sweep covers sessions whose countdown task did not survive.
fn spawn_countdown(repo: PostgresRepository, session_config: SessionConfig, session: Session) {
    tokio::spawn(async move {
        let service = SessionService::new(&repo, &session_config);
        if let Err(err) = service.run_countdown(&session, COUNTDOWN_TICK, COUNTDOWN_TICK.as_secs()).await {
            warn!(session_id = %session.id, error = ?err, "Session countdown failed");
        }
    });
}

/// Live sessions owned by the signed-in professor
#[openapi(tag = "Sessions")]
#[get("/active")]
pub async fn list_active_sessions(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    current_user.require(Role::Professor)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let sessions = SessionService::new(&repo, &config.session).list_active_for_professor(&current_user.id).await?;
    Ok(Json(to_responses(&sessions)))
}

/// Sessions of a course, newest first
#[openapi(tag = "Sessions")]
#[get("/course/<course_id>")]
pub async fn list_sessions_for_course(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    course_id: &str,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(course_id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let sessions = SessionService::new(&repo, &config.session)
        .list_for_course(&uuid, &current_user.id, current_user.role)
        .await?;
    Ok(Json(to_responses(&sessions)))
}

/// A session with its computed state and remaining time
#[openapi(tag = "Sessions")]
#[get("/<id>")]
pub async fn get_session(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<SessionResponse>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let session = SessionService::new(&repo, &config.session)
        .get_visible_session(&uuid, &current_user.id, current_user.role)
        .await?;
    Ok(Json(SessionResponse::at(&session, Utc::now())))
}

/// Replace the session token; previously displayed codes stop working
#[openapi(tag = "Sessions")]
#[post("/<id>/rotate")]
pub async fn rotate_token(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<SessionTokenResponse>, AppError> {
    current_user.require(Role::Professor)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let token = SessionService::new(&repo, &config.session).rotate_token(&uuid, &current_user.id).await?;
    Ok(Json(token))
}

/// End a session. Ending one that already ended is a no-op.
#[openapi(tag = "Sessions")]
#[post("/<id>/end")]
pub async fn end_session(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<SessionResponse>, AppError> {
    current_user.require(Role::Professor)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let session = SessionService::new(&repo, &config.session).end_session(&uuid, &current_user.id).await?;
    Ok(Json(SessionResponse::at(&session, Utc::now())))
}

#[openapi(tag = "Sessions")]
#[get("/<id>/token")]
pub async fn get_token(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<SessionTokenResponse>, AppError> {
    current_user.require(Role::Professor)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let token = SessionService::new(&repo, &config.session).current_token(&uuid, &current_user.id).await?;
    Ok(Json(token))
}

/// QR code for the current token, as an SVG data URL
#[openapi(tag = "Sessions")]
#[get("/<id>/qr")]
pub async fn get_qr_code(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<QrCodeResponse>, AppError> {
    current_user.require(Role::Professor)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let qr = SessionService::new(&repo, &config.session).qr_code(&uuid, &current_user.id).await?;
    Ok(Json(qr))
}

/// Number of recorded scans, for the professor's polling display
#[openapi(tag = "Sessions")]
#[get("/<id>/count")]
pub async fn get_attendance_count(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<AttendanceCountResponse>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let count = SessionService::new(&repo, &config.session)
        .refresh_attendance_count(&uuid, &current_user.id, current_user.role)
        .await?;
    Ok(Json(count))
}

#[openapi(tag = "Sessions")]
#[get("/<id>/attendance")]
pub async fn list_session_attendance(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<Vec<AttendanceResponse>>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let records = AttendanceService::new(&repo)
        .list_for_session(&uuid, &current_user.id, current_user.role)
        .await?;
    Ok(Json(records.iter().map(AttendanceResponse::from).collect()))
}

/// Every student of the session's group with their status
#[openapi(tag = "Sessions")]
#[get("/<id>/roster")]
pub async fn get_roster(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<RosterResponse>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let roster = AttendanceService::new(&repo).roster(&uuid, &current_user.id, current_user.role).await?;
    Ok(Json(roster))
}

#[openapi(tag = "Sessions")]
#[get("/<id>/stats")]
pub async fn get_stats(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<AttendanceStats>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let stats = AttendanceService::new(&repo).stats(&uuid, &current_user.id, current_user.role).await?;
    Ok(Json(stats))
}

/// Record a student as absent unless they already have a record
#[openapi(tag = "Sessions")]
#[post("/<id>/absent", data = "<payload>")]
pub async fn mark_absent(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<MarkAbsentRequest>,
) -> Result<Json<AttendanceResponse>, AppError> {
    current_user.require(Role::Professor)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let record = AttendanceService::new(&repo)
        .mark_absent(&uuid, &payload.student_id, &current_user.id)
        .await?;
    Ok(Json(AttendanceResponse::from(&record)))
}

/// Manually correct a student's status
#[openapi(tag = "Sessions")]
#[put("/<id>/attendance/<student_id>", data = "<payload>")]
pub async fn put_attendance_status(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    student_id: &str,
    payload: Json<UpdateStatusRequest>,
) -> Result<Json<AttendanceResponse>, AppError> {
    current_user.require(Role::Professor)?;
    let uuid = Uuid::parse_str(id)?;
    let student_uuid = Uuid::parse_str(student_id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let record = AttendanceService::new(&repo)
        .update_status(&uuid, &student_uuid, payload.status, &current_user.id)
        .await?;
    Ok(Json(AttendanceResponse::from(&record)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        start_session,
        list_active_sessions,
        list_sessions_for_course,
        get_session,
        rotate_token,
        end_session,
        get_token,
        get_qr_code,
        get_attendance_count,
        list_session_attendance,
        get_roster,
        get_stats,
        mark_absent,
        put_attendance_status
    ]
}
