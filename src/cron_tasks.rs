use crate::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::db::init_pool;
use crate::service::session::SessionService;
use chrono::Utc;

#[derive(Debug, Clone, Copy)]
pub struct ExpireSessionsResult {
    pub sessions_ended: usize,
}

/// One-shot run of the expiry sweep against a fresh pool.
pub async fn expire_sessions(config: &Config) -> Result<ExpireSessionsResult, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let ended = SessionService::new(&repo, &config.session)
        .sweep_expired(Utc::now())
        .await
        .map_err(|err| format!("Failed to expire sessions: {err:?}"))?;

    pool.close().await;

    Ok(ExpireSessionsResult { sessions_ended: ended.len() })
}
