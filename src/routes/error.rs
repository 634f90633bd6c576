use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::Header;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, Responder, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub code: &'static str,
    pub message: String,
}

fn error(code: &'static str, message: &str) -> Json<Error> {
    Json(Error {
        code,
        message: message.to_string(),
    })
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<Error> {
    error("bad_request", "Bad request")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<Error> {
    error("unauthorized", "Authentication required")
}

#[catch(403)]
pub fn forbidden(_: &Request) -> Json<Error> {
    error("permission_denied", "Permission denied")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    error("not_found", "Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    error("conflict", "Conflict")
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> Json<Error> {
    error("invalid_body", "Request body could not be parsed")
}

#[derive(Responder)]
#[response(status = 429, content_type = "json")]
pub struct TooManyRequests {
    body: Json<Error>,
    retry_after: Header<'static>,
}

#[catch(429)]
pub fn too_many_requests(request: &Request) -> TooManyRequests {
    let retry_after = request.local_cache(|| None::<RateLimitRetryAfter>).map_or(1, |r| r.0);
    TooManyRequests {
        body: error("too_many_requests", "Too many requests"),
        retry_after: Header::new("Retry-After", retry_after.to_string()),
    }
}
