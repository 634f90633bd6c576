use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::course::{Course, CourseRequest, CourseResponse};
use crate::models::user::Role;
use crate::service::course::CourseService;
use crate::service::group::GroupService;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

fn to_responses(courses: &[Course]) -> Vec<CourseResponse> {
    courses.iter().map(CourseResponse::from).collect()
}

/// All courses for admins; a professor sees the courses they teach
#[openapi(tag = "Courses")]
#[get("/")]
pub async fn list_courses(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser) -> Result<Json<Vec<CourseResponse>>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = CourseService::new(&repo);
    let courses = match current_user.role {
        Role::Admin => service.list_courses().await?,
        _ => service.courses_for_professor(&current_user.id).await?,
    };
    Ok(Json(to_responses(&courses)))
}

#[openapi(tag = "Courses")]
#[get("/professor/<professor_id>")]
pub async fn list_courses_for_professor(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    professor_id: &str,
) -> Result<Json<Vec<CourseResponse>>, AppError> {
    let uuid = Uuid::parse_str(professor_id)?;
    if current_user.role != Role::Admin && current_user.id != uuid {
        return Err(AppError::PermissionDenied);
    }

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let courses = CourseService::new(&repo).courses_for_professor(&uuid).await?;
    Ok(Json(to_responses(&courses)))
}

/// Courses offered to a group. Students may only ask about their own groups.
#[openapi(tag = "Courses")]
#[get("/group/<group_id>")]
pub async fn list_courses_for_group(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    group_id: &str,
) -> Result<Json<Vec<CourseResponse>>, AppError> {
    let uuid = Uuid::parse_str(group_id)?;
    let repo = PostgresRepository { pool: pool.inner().clone() };

    if current_user.role == Role::Student {
        let groups = GroupService::new(&repo).groups_for_student(&current_user.id).await?;
        if !groups.iter().any(|group| group.id == uuid) {
            return Err(AppError::PermissionDenied);
        }
    }

    let courses = CourseService::new(&repo).courses_for_group(&uuid).await?;
    Ok(Json(to_responses(&courses)))
}

#[openapi(tag = "Courses")]
#[get("/<id>")]
pub async fn get_course(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<CourseResponse>, AppError> {
    current_user.require_any(&[Role::Admin, Role::Professor])?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let course = CourseService::new(&repo).get_course(&uuid).await?;
    Ok(Json(CourseResponse::from(&course)))
}

#[openapi(tag = "Courses")]
#[post("/", data = "<payload>")]
pub async fn create_course(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: Json<CourseRequest>,
) -> Result<(Status, Json<CourseResponse>), AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let course = CourseService::new(&repo).create_course(&payload).await?;
    Ok((Status::Created, Json(CourseResponse::from(&course))))
}

#[openapi(tag = "Courses")]
#[put("/<id>", data = "<payload>")]
pub async fn put_course(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<CourseRequest>,
) -> Result<Json<CourseResponse>, AppError> {
    current_user.require(Role::Admin)?;
    payload.validate()?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let course = CourseService::new(&repo).update_course(&uuid, &payload).await?;
    Ok(Json(CourseResponse::from(&course)))
}

#[openapi(tag = "Courses")]
#[delete("/<id>")]
pub async fn delete_course(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Status, AppError> {
    current_user.require(Role::Admin)?;
    let uuid = Uuid::parse_str(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    CourseService::new(&repo).delete_course(&uuid).await?;
    Ok(Status::NoContent)
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        list_courses,
        list_courses_for_professor,
        list_courses_for_group,
        get_course,
        create_course,
        put_course,
        delete_course
    ]
}
