use std::time::Duration;

use crate::auth::{SESSION_COOKIE, parse_session_cookie_value};
use crate::config::RateLimitConfig;
use crate::middleware::RequestId;
use chrono::Utc;
use redis::aio::ConnectionManager;
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Read,
    Mutation,
    Auth,
    /// Attendance scans, counted apart from other mutations.
    Scan,
}

impl Bucket {
    fn for_method(method: Method) -> Self {
        match method {
            Method::Post | Method::Put | Method::Patch | Method::Delete => Bucket::Mutation,
            _ => Bucket::Read,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Bucket::Read => "read",
            Bucket::Mutation => "mutation",
            Bucket::Auth => "auth",
            Bucket::Scan => "scan",
        }
    }
}

/// Who a request is charged to. A signed-in request is charged to both its
/// address and its user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Caller {
    Ip(String),
    User(String),
}

impl Caller {
    fn key_part(&self) -> String {
        match self {
            Caller::Ip(ip) => format!("ip:{ip}"),
            Caller::User(id) => format!("user:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allow,
    Limited { retry_after: Duration },
}

/// The fixed window a unix timestamp falls in, and the time left in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowSlot {
    index: u64,
    retry_after: Duration,
}

fn window_slot(now_secs: u64, window_secs: u64) -> WindowSlot {
    let window_secs = window_secs.max(1);
    WindowSlot {
        index: now_secs / window_secs,
        retry_after: Duration::from_secs(window_secs - now_secs % window_secs),
    }
}

fn counter_key(prefix: &str, caller: &Caller, bucket: Bucket, window_index: u64) -> String {
    format!("{prefix}:{}:{}:{window_index}", bucket.as_str(), caller.key_part())
}

/// Fixed-window request counters kept in Redis, shared through Rocket state.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    redis: ConnectionManager,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, redis: ConnectionManager) -> Self {
        Self { config, redis }
    }

    fn limit(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Read => self.config.read_limit,
            Bucket::Mutation => self.config.mutation_limit,
            Bucket::Auth => self.config.auth_limit,
            Bucket::Scan => self.config.scan_limit,
        }
    }

    /// A request is admitted only if every caller identity is under the limit;
    /// rejected requests are not counted.
    async fn check(&self, callers: &[Caller], bucket: Bucket) -> Result<Decision, redis::RedisError> {
        let window_secs = self.config.window_seconds.max(1);
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let slot = window_slot(now, window_secs);
        let keys: Vec<String> = callers
            .iter()
            .map(|caller| counter_key(&self.config.key_prefix, caller, bucket, slot.index))
            .collect();

        let mut redis = self.redis.clone();
        let hits: Vec<Option<u32>> = redis::cmd("MGET").arg(&keys).query_async(&mut redis).await?;
        let limit = self.limit(bucket);
        if hits.iter().any(|count| count.unwrap_or(0) >= limit) {
            return Ok(Decision::Limited { retry_after: slot.retry_after });
        }

        let ttl = i64::try_from(window_secs).unwrap_or(i64::MAX);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in &keys {
            pipe.incr(key, 1).ignore().expire(key, ttl).ignore();
        }
        pipe.query_async::<()>(&mut redis).await?;
        Ok(Decision::Allow)
    }
}

/// Seconds until the caller may retry, stashed for the 429 catcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RateLimitError {
    TooManyRequests,
    MissingClientIp,
}

impl RateLimitError {
    fn status(self) -> Status {
        match self {
            RateLimitError::TooManyRequests => Status::TooManyRequests,
            RateLimitError::MissingClientIp => Status::BadRequest,
        }
    }
}

async fn admit(request: &Request<'_>, bucket: Bucket) -> Outcome<(), RateLimitError> {
    let Some(limiter) = request.rocket().state::<RateLimiter>() else {
        return Outcome::Success(());
    };

    let request_id = RequestId::of(request);

    let mut callers = Vec::with_capacity(2);
    match request.client_ip() {
        Some(ip) => callers.push(Caller::Ip(ip.to_string())),
        None => warn!(request_id = %request_id, uri = %request.uri(), "client ip unavailable for rate limiting"),
    }
    if let Some(cookie) = request.cookies().get_private(SESSION_COOKIE)
        && let Some((_, user_id)) = parse_session_cookie_value(cookie.value())
    {
        callers.push(Caller::User(user_id.to_string()));
    }

    if callers.is_empty() {
        if limiter.config.require_client_ip {
            let error = RateLimitError::MissingClientIp;
            return Outcome::Error((error.status(), error));
        }
        callers.push(Caller::Ip("missing-ip".to_string()));
    }

    match limiter.check(&callers, bucket).await {
        Ok(Decision::Allow) => Outcome::Success(()),
        Err(err) => {
            // Counting is best effort; an unreachable store admits the request.
            warn!(request_id = %request_id, error = %err, bucket = ?bucket, "rate limit store unavailable");
            Outcome::Success(())
        }
        Ok(Decision::Limited { retry_after }) => {
            let secs = retry_after.as_secs().max(1);
            request.local_cache(|| Some(RateLimitRetryAfter(secs)));
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                bucket = ?bucket,
                retry_after_secs = secs,
                "rate limit exceeded"
            );
            let error = RateLimitError::TooManyRequests;
            Outcome::Error((error.status(), error))
        }
    }
}

fn too_many_requests_response() -> rocket_okapi::Result<Responses> {
    let mut responses = Responses::default();
    responses.responses.insert(
        "429".to_string(),
        RefOr::Object(OpenApiResponse {
            description: "Too Many Requests".to_string(),
            ..Default::default()
        }),
    );
    Ok(responses)
}

macro_rules! rate_limit_guard {
    ($(#[$meta:meta])* $name:ident, $bucket:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub(crate) struct $name;

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = RateLimitError;

            async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
                let bucket: fn(&Request<'_>) -> Bucket = $bucket;
                admit(request, bucket(request)).await.map(|_| $name)
            }
        }

        impl<'a> OpenApiFromRequest<'a> for $name {
            fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
                Ok(RequestHeaderInput::None)
            }

            fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
                too_many_requests_response()
            }
        }
    };
}

rate_limit_guard!(
    /// General limit, read or mutation depending on the HTTP method.
    RateLimit,
    |request| Bucket::for_method(request.method())
);
rate_limit_guard!(
    /// Login and password endpoints.
    AuthRateLimit,
    |_| Bucket::Auth
);
rate_limit_guard!(
    /// Attendance scan submissions.
    ScanRateLimit,
    |_| Bucket::Scan
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_redis;
    use crate::routes::error::too_many_requests;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use rocket::{catchers, post, routes};
    use uuid::Uuid;

    fn config(limit: u32, window_seconds: u64) -> RateLimitConfig {
        RateLimitConfig {
            read_limit: limit,
            mutation_limit: limit,
            auth_limit: limit,
            scan_limit: limit,
            window_seconds,
            // Fresh prefix per test so runs never share counters.
            key_prefix: format!("attendify-test:{}", Uuid::new_v4()),
            ..RateLimitConfig::default()
        }
    }

    async fn limiter(config: RateLimitConfig) -> RateLimiter {
        let redis = init_redis(&config.redis_url).await.expect("redis reachable");
        RateLimiter::new(config, redis)
    }

    fn ip(addr: &str) -> Caller {
        Caller::Ip(addr.to_string())
    }

    #[post("/scan")]
    async fn scan(_rate_limit: ScanRateLimit) -> Status {
        Status::Created
    }

    #[test]
    fn method_selects_bucket() {
        assert_eq!(Bucket::for_method(Method::Get), Bucket::Read);
        assert_eq!(Bucket::for_method(Method::Head), Bucket::Read);
        assert_eq!(Bucket::for_method(Method::Post), Bucket::Mutation);
        assert_eq!(Bucket::for_method(Method::Delete), Bucket::Mutation);
    }

    #[test]
    fn window_slot_counts_down_to_the_next_boundary() {
        assert_eq!(
            window_slot(120, 60),
            WindowSlot {
                index: 2,
                retry_after: Duration::from_secs(60)
            }
        );
        assert_eq!(
            window_slot(179, 60),
            WindowSlot {
                index: 2,
                retry_after: Duration::from_secs(1)
            }
        );
        assert_eq!(window_slot(180, 60).index, 3);
        assert_eq!(window_slot(5, 0).retry_after, Duration::from_secs(1));
    }

    #[test]
    fn counter_keys_separate_buckets_and_callers() {
        let student = Caller::User("student-1".to_string());
        assert_eq!(counter_key("rl", &student, Bucket::Scan, 7), "rl:scan:user:student-1:7");
        assert_eq!(counter_key("rl", &ip("10.0.0.7"), Bucket::Auth, 7), "rl:auth:ip:10.0.0.7:7");
        assert_ne!(counter_key("rl", &student, Bucket::Scan, 7), counter_key("rl", &student, Bucket::Read, 7));
    }

    #[rocket::async_test]
    #[ignore = "requires redis"]
    async fn blocks_after_limit() {
        let limiter = limiter(config(2, 60)).await;
        let callers = [ip("127.0.0.1")];

        assert_eq!(limiter.check(&callers, Bucket::Scan).await.unwrap(), Decision::Allow);
        assert_eq!(limiter.check(&callers, Bucket::Scan).await.unwrap(), Decision::Allow);
        assert!(matches!(limiter.check(&callers, Bucket::Scan).await.unwrap(), Decision::Limited { .. }));
    }

    #[rocket::async_test]
    #[ignore = "requires redis"]
    async fn buckets_are_counted_separately() {
        let limiter = limiter(RateLimitConfig {
            scan_limit: 1,
            ..config(5, 60)
        })
        .await;
        let callers = [ip("10.0.0.7")];

        assert_eq!(limiter.check(&callers, Bucket::Scan).await.unwrap(), Decision::Allow);
        assert!(matches!(limiter.check(&callers, Bucket::Scan).await.unwrap(), Decision::Limited { .. }));
        assert_eq!(limiter.check(&callers, Bucket::Mutation).await.unwrap(), Decision::Allow);
    }

    #[rocket::async_test]
    #[ignore = "requires redis"]
    async fn limited_requests_are_not_counted() {
        let config = config(1, 3600);
        let limiter = limiter(config.clone()).await;
        let callers = [ip("10.0.0.1"), Caller::User("student-1".to_string())];

        assert_eq!(limiter.check(&callers, Bucket::Read).await.unwrap(), Decision::Allow);
        assert!(matches!(limiter.check(&callers, Bucket::Read).await.unwrap(), Decision::Limited { .. }));

        let now = u64::try_from(Utc::now().timestamp()).unwrap();
        let index = window_slot(now, config.window_seconds).index;
        let keys: Vec<String> = callers.iter().map(|c| counter_key(&config.key_prefix, c, Bucket::Read, index)).collect();
        let mut redis = limiter.redis.clone();
        let hits: Vec<Option<u32>> = redis::cmd("MGET").arg(&keys).query_async(&mut redis).await.unwrap();
        assert_eq!(hits, vec![Some(1), Some(1)]);
    }

    #[rocket::async_test]
    #[ignore = "requires redis"]
    async fn exhausted_scan_bucket_returns_429_with_retry_after() {
        let limiter = limiter(config(0, 60)).await;
        let rocket = rocket::build()
            .manage(limiter)
            .mount("/", routes![scan])
            .register("/", catchers![too_many_requests]);

        let client = Client::tracked(rocket).await.expect("valid rocket instance");
        let response = client.post("/scan").dispatch().await;

        assert_eq!(response.status(), Status::TooManyRequests);
        let retry_after: u64 = response.headers().get_one("Retry-After").unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(response.content_type(), Some(ContentType::JSON));
    }

    #[rocket::async_test]
    async fn requests_pass_when_no_limiter_is_managed() {
        let rocket = rocket::build().mount("/", routes![scan]);
        let client = Client::tracked(rocket).await.expect("valid rocket instance");
        let response = client.post("/scan").dispatch().await;
        assert_eq!(response.status(), Status::Created);
    }
}
