use crate::error::{Error, Result};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

pub(crate) const CHECK_INTERVAL: Duration = Duration::from_secs(120);
pub(crate) const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pings the pool on every tick for the life of the process. Failures are
/// logged and the next tick tries again.
pub(crate) async fn watch(pool: PgPool, interval: Duration, query_timeout: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match ping(&pool, query_timeout).await {
            Ok(elapsed) => debug!(elapsed = ?elapsed, "database health check successful"),
            Err(e) => error!(error = %e, "database health check failed"),
        }
    }
}

async fn ping(pool: &PgPool, query_timeout: Duration) -> Result<Duration> {
    let start = Instant::now();
    time::timeout(query_timeout, sqlx::query("SELECT 1").execute(pool))
        .await
        .map_err(|_| Error::Timeout(query_timeout))??;
    Ok(start.elapsed())
}
