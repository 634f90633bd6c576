use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::user::{AdminConfirmation, CreateUserRequest, ResetPasswordRequest, Role, UpdateUserRequest, UserResponse};
use crate::service::user::UserService;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// List users, optionally filtered by role
#[openapi(tag = "Administration")]
#[get("/users?<role>")]
pub async fn list_users(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, role: Option<&str>) -> Result<Json<Vec<UserResponse>>, AppError> {
    current_user.require(Role::Admin)?;
    let role = role.map(parse_role).transpose()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let users = UserService::new(&repo).list_users(role).await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// Create a user; the acting admin confirms with their own password
#[openapi(tag = "Administration")]
#[post("/users", data = "<payload>")]
pub async fn create_user(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: Json<CreateUserRequest>,
) -> Result<(Status, Json<UserResponse>), AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = UserService::new(&repo).create_user(&current_user.id, &payload).await?;
    Ok((Status::Created, Json(UserResponse::from(&user))))
}

#[openapi(tag = "Administration")]
#[get("/users/<id>")]
pub async fn get_user(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<UserResponse>, AppError> {
    current_user.require(Role::Admin)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = UserService::new(&repo).get_user(&uuid).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Edit display name, role and group
#[openapi(tag = "Administration")]
#[put("/users/<id>", data = "<payload>")]
pub async fn put_user(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = UserService::new(&repo).update_user(&uuid, &payload).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Delete a user and detach them from any group
#[openapi(tag = "Administration")]
#[delete("/users/<id>", data = "<payload>")]
pub async fn delete_user(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<AdminConfirmation>,
) -> Result<Status, AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    UserService::new(&repo).delete_user(&current_user.id, &uuid, &payload.admin_password).await?;
    Ok(Status::NoContent)
}

/// Set a new password for a user and end their login sessions
#[openapi(tag = "Administration")]
#[post("/users/<id>/password", data = "<payload>")]
pub async fn reset_password(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<ResetPasswordRequest>,
) -> Result<Status, AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    UserService::new(&repo)
        .reset_password(&current_user.id, &uuid, &payload.new_password, &payload.admin_password)
        .await?;
    repo.delete_auth_sessions_for_user(&uuid).await?;
    Ok(Status::NoContent)
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    match raw {
        "admin" => Ok(Role::Admin),
        "professor" => Ok(Role::Professor),
        "student" => Ok(Role::Student),
        other => Err(AppError::BadRequest(format!("Unknown role '{}'", other))),
    }
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_users, create_user, get_user, put_user, delete_user, reset_password]
}
