//! Database initialization
//!
//! Creates the database on first run, applies the connection pragmas the
//! concurrent claim path depends on (WAL, busy timeout), and seeds default
//! settings.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tmatch_common::Result;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; the conditional claim
    // updates all serialize through that single writer.
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Short busy timeout; longer waits are handled by retry_on_lock
    sqlx::query("PRAGMA busy_timeout = 250").execute(&pool).await?;

    init_schema(&pool).await?;
    init_settings_defaults(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes (idempotent, also used by tests on in-memory pools)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_requests (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            tutor_id TEXT,
            meeting_url TEXT,
            requested_at TEXT NOT NULL,
            accepted_at TEXT,
            tutor_joined_at TEXT,
            student_joined_at TEXT,
            started_at TEXT,
            completed_at TEXT,
            cancelled_at TEXT,
            expired_at TEXT,
            cancellation_reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_session_requests_status_requested
         ON session_requests(status, requested_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_session_requests_student
         ON session_requests(student_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_session_requests_tutor
         ON session_requests(tutor_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize settings table with default values
///
/// Existing values are left untouched so operator overrides survive restarts.
pub async fn init_settings_defaults(pool: &SqlitePool) -> Result<()> {
    let defaults = vec![
        // How long an unclaimed request stays pending before the sweep
        // expires it
        ("request_ttl_minutes", "10"),
        ("sweep_interval_seconds", "30"),

        // Poll fallback cadence advertised to clients
        ("pending_poll_interval_seconds", "5"),

        // Meeting provisioning retry policy
        ("provision_max_attempts", "3"),
        ("provision_backoff_ms", "250"),

        // Fan-out channel depth
        ("event_channel_capacity", "256"),

        // Upper bound for lock-retry on contended writes
        ("db_max_lock_wait_ms", "5000"),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}
