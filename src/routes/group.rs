use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::group::{GroupMemberRequest, GroupRequest, GroupResponse};
use crate::models::user::Role;
use crate::service::group::GroupService;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[openapi(tag = "Groups")]
#[get("/")]
pub async fn list_groups(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser) -> Result<Json<Vec<GroupResponse>>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let groups = GroupService::new(&repo).list_groups().await?;
    Ok(Json(groups.iter().map(GroupResponse::from).collect()))
}

#[openapi(tag = "Groups")]
#[get("/<id>")]
pub async fn get_group(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<GroupResponse>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let group = GroupService::new(&repo).get_group(&uuid).await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// Create a group; listed students are moved out of any other group
#[openapi(tag = "Groups")]
#[post("/", data = "<payload>")]
pub async fn create_group(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: Json<GroupRequest>,
) -> Result<(Status, Json<GroupResponse>), AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let group = GroupService::new(&repo).create_group(&payload, &current_user.id).await?;
    Ok((Status::Created, Json(GroupResponse::from(&group))))
}

#[openapi(tag = "Groups")]
#[put("/<id>", data = "<payload>")]
pub async fn put_group(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<GroupRequest>,
) -> Result<Json<GroupResponse>, AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let group = GroupService::new(&repo).update_group(&uuid, &payload).await?;
    Ok(Json(GroupResponse::from(&group)))
}

#[openapi(tag = "Groups")]
#[delete("/<id>")]
pub async fn delete_group(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Status, AppError> {
    current_user.require(Role::Admin)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    GroupService::new(&repo).delete_group(&uuid).await?;
    Ok(Status::NoContent)
}

#[openapi(tag = "Groups")]
#[post("/<id>/members", data = "<payload>")]
pub async fn add_member(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<GroupMemberRequest>,
) -> Result<Json<GroupResponse>, AppError> {
    current_user.require(Role::Admin)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let group = GroupService::new(&repo).add_student(&uuid, &payload.student_id).await?;
    Ok(Json(GroupResponse::from(&group)))
}

#[openapi(tag = "Groups")]
#[delete("/<id>/members/<student_id>")]
pub async fn remove_member(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    student_id: &str,
) -> Result<Json<GroupResponse>, AppError> {
    current_user.require(Role::Admin)?;
    let uuid = Uuid::parse_str(id)?;
    let student_uuid = Uuid::parse_str(student_id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let group = GroupService::new(&repo).remove_student(&uuid, &student_uuid).await?;
    Ok(Json(GroupResponse::from(&group)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_groups, get_group, create_group, put_group, delete_group, add_member, remove_member]
}

#[cfg(test)]
mod tests {
    use crate::{Config, build_rocket};
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn groups_require_login() {
        let client = Client::tracked(build_rocket(Config::load().expect("config"))).await.expect("valid rocket instance");
        let response = client.get("/api/v1/groups").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
