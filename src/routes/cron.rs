use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::service::session::SessionService;
use chrono::Utc;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::{State, post, routes};
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) const CRON_TOKEN_HEADER: &str = "x-cron-token";

pub(crate) struct CronAuth;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };

        if config.cron.auth_token.is_empty() {
            return Outcome::Error((Status::BadRequest, AppError::BadRequest("Cron auth token is not configured".to_string())));
        }

        let incoming = req.headers().get_one(CRON_TOKEN_HEADER);
        match incoming {
            Some(token) if token == config.cron.auth_token => Outcome::Success(CronAuth),
            _ => Outcome::Error((Status::Forbidden, AppError::PermissionDenied)),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ExpireSessionsResponse {
    pub sessions_ended: Vec<Uuid>,
}

#[post("/expire-sessions")]
pub async fn expire_sessions(pool: &State<PgPool>, config: &State<Config>, _cron_auth: CronAuth) -> Result<Json<ExpireSessionsResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let ended = SessionService::new(&repo, &config.session).sweep_expired(Utc::now()).await?;
    Ok(Json(ExpireSessionsResponse { sessions_ended: ended }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![expire_sessions]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::error::forbidden;
    use rocket::local::asynchronous::Client;
    use rocket::{catchers, get};

    #[get("/guarded")]
    fn guarded(_cron_auth: CronAuth) -> Status {
        Status::Ok
    }

    async fn client(token: &str) -> Client {
        let mut config = Config::default();
        config.cron.auth_token = token.to_string();
        let rocket = rocket::build()
            .manage(config)
            .mount("/", rocket::routes![guarded])
            .register("/", catchers![forbidden]);
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    #[rocket::async_test]
    async fn matching_token_is_accepted() {
        let client = client("s3cret").await;
        let response = client.get("/guarded").header(rocket::http::Header::new(CRON_TOKEN_HEADER, "s3cret")).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn wrong_or_missing_token_is_forbidden() {
        let client = client("s3cret").await;
        let response = client.get("/guarded").header(rocket::http::Header::new(CRON_TOKEN_HEADER, "guess")).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client.get("/guarded").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn unconfigured_token_rejects_every_call() {
        let client = client("").await;
        let response = client.get("/guarded").header(rocket::http::Header::new(CRON_TOKEN_HEADER, "")).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }
}
