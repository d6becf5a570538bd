//! Typed access to runtime tunables in the settings table

use sqlx::SqlitePool;
use tmatch_common::Result;

async fn get_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<i64> =
        sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.unwrap_or(default))
}

/// TTL after which an unclaimed pending request is expired by the sweep
pub async fn request_ttl_minutes(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "request_ttl_minutes", 10).await
}

/// Sweep timer period
pub async fn sweep_interval_seconds(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "sweep_interval_seconds", 30).await
}

/// Poll fallback cadence for pending-pool subscribers
pub async fn pending_poll_interval_seconds(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "pending_poll_interval_seconds", 5).await
}

/// Bounded retry count for meeting provisioning
pub async fn provision_max_attempts(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "provision_max_attempts", 3).await
}

/// Initial provisioning retry backoff (doubles per attempt)
pub async fn provision_backoff_ms(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "provision_backoff_ms", 250).await
}

/// Broadcast channel capacity for the event fan-out
pub async fn event_channel_capacity(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "event_channel_capacity", 256).await
}

/// Maximum total time to retry a locked write
pub async fn db_max_lock_wait_ms(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "db_max_lock_wait_ms", 5000).await
}
