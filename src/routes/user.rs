use crate::auth::{CurrentUser, SESSION_COOKIE, session_cookie_value};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::UserAgent;
use crate::middleware::rate_limit::{AuthRateLimit, RateLimit};
use crate::models::group::GroupResponse;
use crate::models::user::{ChangePasswordRequest, LoginRequest, UserResponse};
use crate::service::group::GroupService;
use crate::service::user::UserService;
use chrono::{Duration, Utc};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::json::Json;
use rocket::{State, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::info;
use validator::Validate;

const LOGIN_TTL_HOURS: i64 = 12;

pub(crate) fn build_auth_cookie(value: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Sign in with email and password
#[openapi(tag = "Users")]
#[post("/login", data = "<payload>")]
pub async fn post_user_login(
    pool: &State<PgPool>,
    _rate_limit: AuthRateLimit,
    cookies: &CookieJar<'_>,
    user_agent: UserAgent,
    payload: Json<LoginRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = UserService::new(&repo).login(&payload.email, &payload.password).await?;

    let expires_at = Utc::now() + Duration::hours(LOGIN_TTL_HOURS);
    let session = repo.create_auth_session(&user.id, expires_at, user_agent.0.as_deref()).await?;
    cookies.add_private(build_auth_cookie(&session_cookie_value(&session.id, &user.id)));

    info!(user_id = %user.id, role = user.role.as_str(), "User logged in");
    Ok(Json(UserResponse::from(&user)))
}

/// Sign out and drop the login session
#[openapi(tag = "Users")]
#[post("/logout")]
pub async fn post_user_logout(pool: &State<PgPool>, current_user: CurrentUser, cookies: &CookieJar<'_>) -> Result<Status, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    repo.delete_auth_session(&current_user.session_id).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok(Status::Ok)
}

/// Profile of the signed-in user
#[openapi(tag = "Users")]
#[get("/me")]
pub async fn get_me(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser) -> Result<Json<UserResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = UserService::new(&repo).get_user(&current_user.id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Groups the signed-in student belongs to
#[openapi(tag = "Users")]
#[get("/me/groups")]
pub async fn get_my_groups(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser) -> Result<Json<Vec<GroupResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let groups = GroupService::new(&repo).groups_for_student(&current_user.id).await?;
    Ok(Json(groups.iter().map(GroupResponse::from).collect()))
}

/// Change the signed-in user's password
#[openapi(tag = "Users")]
#[put("/me/password", data = "<payload>")]
pub async fn put_my_password(
    pool: &State<PgPool>,
    _rate_limit: AuthRateLimit,
    current_user: CurrentUser,
    payload: Json<ChangePasswordRequest>,
) -> Result<Status, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    UserService::new(&repo)
        .change_password(&current_user.id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(Status::NoContent)
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![post_user_login, post_user_logout, get_me, get_my_groups, put_my_password]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, build_rocket};
    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;

    #[test]
    fn auth_cookie_is_http_only() {
        let cookie = build_auth_cookie("a:b");
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn me_requires_login() {
        let client = Client::tracked(build_rocket(Config::load().expect("config"))).await.expect("valid rocket instance");
        let response = client.get("/api/v1/users/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn login_with_unknown_email_is_rejected() {
        let client = Client::tracked(build_rocket(Config::load().expect("config"))).await.expect("valid rocket instance");
        let response = client
            .post("/api/v1/users/login")
            .header(ContentType::JSON)
            .body(r#"{"email":"nobody@example.edu","password":"irrelevant"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }
}
