//! Matching Server (tmatch-ms) - Main entry point
//!
//! Hosts the instant session matching engine: request store, claim
//! coordinator, lifecycle tracker, expiry sweep and the REST/SSE API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tmatch_common::events::EventBus;
use tmatch_ms::coordinator::ClaimCoordinator;
use tmatch_ms::db::{self, RequestStore};
use tmatch_ms::lifecycle::LifecycleTracker;
use tmatch_ms::provision::{HttpProvisioner, MeetingProvisioner, RoomTemplateProvisioner};
use tmatch_ms::sweep::ExpirySweeper;
use tmatch_ms::{build_router, AppContext};

/// Command-line arguments for tmatch-ms
#[derive(Parser, Debug)]
#[command(name = "tmatch-ms")]
#[command(about = "Instant session matching server for TutorMatch")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5760", env = "TMATCH_MS_PORT")]
    port: u16,

    /// Path to the SQLite database
    #[arg(short, long, env = "TMATCH_MS_DB")]
    db_path: Option<String>,

    /// External room service endpoint; when unset, rooms are derived from
    /// the meeting room template instead
    #[arg(long, env = "TMATCH_PROVISIONER_URL")]
    provisioner_url: Option<String>,

    /// Meeting room URL template, must contain "{id}"
    #[arg(
        long,
        default_value = "https://meet.jit.si/tmatch-{id}",
        env = "TMATCH_ROOM_TEMPLATE"
    )]
    room_template: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tmatch_ms=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting TutorMatch matching server on port {}", args.port);

    let db_path = tmatch_common::config::resolve_db_path(args.db_path.as_deref(), "TMATCH_MS_DB")
        .context("Failed to resolve database path")?;
    info!("Database: {}", db_path.display());

    let pool = db::init::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    // Runtime tunables live in the settings table
    let max_lock_wait_ms = db::settings::db_max_lock_wait_ms(&pool).await? as u64;
    let channel_capacity = db::settings::event_channel_capacity(&pool).await? as usize;
    let provision_attempts = db::settings::provision_max_attempts(&pool).await? as u32;
    let provision_backoff = db::settings::provision_backoff_ms(&pool).await? as u64;
    let ttl_minutes = db::settings::request_ttl_minutes(&pool).await?;
    let sweep_interval = db::settings::sweep_interval_seconds(&pool).await?;
    let poll_interval = db::settings::pending_poll_interval_seconds(&pool).await?;

    let store = RequestStore::new(pool.clone(), max_lock_wait_ms);
    let events = EventBus::new(channel_capacity);

    let provisioner: Arc<dyn MeetingProvisioner> = match &args.provisioner_url {
        Some(url) => {
            info!("Using HTTP room service at {}", url);
            Arc::new(HttpProvisioner::new(url.clone()).context("Failed to build room client")?)
        }
        None => {
            info!("Using room template {}", args.room_template);
            Arc::new(RoomTemplateProvisioner::new(args.room_template.clone()))
        }
    };

    let coordinator = Arc::new(ClaimCoordinator::new(
        store.clone(),
        provisioner,
        events.clone(),
        provision_attempts,
        provision_backoff,
    ));
    let lifecycle = Arc::new(LifecycleTracker::new(store.clone()));

    // Expiry sweep with cooperative shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(store.clone(), coordinator.clone(), ttl_minutes, sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    let ctx = AppContext {
        store,
        coordinator,
        lifecycle,
        events,
        poll_interval_seconds: poll_interval,
        port: args.port,
    };

    let app = build_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the sweep before exiting
    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
