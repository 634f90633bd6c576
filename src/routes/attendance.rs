use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::{RateLimit, ScanRateLimit};
use crate::models::attendance::{AttendanceResponse, ScanRequest};
use crate::models::user::Role;
use crate::service::attendance::AttendanceService;
use crate::service::scan::ScanHandler;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

/// Submit the string decoded from a session's QR code
#[openapi(tag = "Attendance")]
#[post("/scan", data = "<payload>")]
pub async fn post_scan(
    pool: &State<PgPool>,
    config: &State<Config>,
    _rate_limit: ScanRateLimit,
    current_user: CurrentUser,
    payload: Json<ScanRequest>,
) -> Result<(Status, Json<AttendanceResponse>), AppError> {
    current_user.require(Role::Student)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let record = ScanHandler::new(&repo, config.session.late_threshold_minutes)
        .handle_scan(&payload.payload, &current_user.id)
        .await?;
    Ok((Status::Created, Json(AttendanceResponse::from(&record))))
}

/// Attendance history of the signed-in student
#[openapi(tag = "Attendance")]
#[get("/me")]
pub async fn list_my_attendance(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser) -> Result<Json<Vec<AttendanceResponse>>, AppError> {
    current_user.require(Role::Student)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let records = AttendanceService::new(&repo).list_for_student(&current_user.id).await?;
    Ok(Json(records.iter().map(AttendanceResponse::from).collect()))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![post_scan, list_my_attendance]
}

#[cfg(test)]
mod tests {
    use crate::{Config, build_rocket};
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn scanning_requires_login() {
        let client = Client::tracked(build_rocket(Config::load().expect("config"))).await.expect("valid rocket instance");
        let response = client
            .post("/api/v1/attendance/scan")
            .header(ContentType::JSON)
            .body(r#"{"payload":"{}"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
