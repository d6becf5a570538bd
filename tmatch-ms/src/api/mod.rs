//! REST API implementation for the matching server

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::coordinator::ClaimCoordinator;
use crate::db::RequestStore;
use crate::lifecycle::LifecycleTracker;
use tmatch_common::events::EventBus;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppContext {
    pub store: RequestStore,
    pub coordinator: Arc<ClaimCoordinator>,
    pub lifecycle: Arc<LifecycleTracker>,
    pub events: EventBus,
    /// Poll cadence advertised to clients in /health
    pub poll_interval_seconds: i64,
    pub port: u16,
}

/// Create the API router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))

        // API v1 routes
        .nest("/api/v1", Router::new()
            // Request creation and pool/snapshot reads
            .route("/instant-sessions", post(handlers::create_session))
            .route("/instant-sessions/pending", get(handlers::list_pending))
            .route("/instant-sessions/:id", get(handlers::get_session))

            // Claim coordination
            .route("/instant-sessions/:id/accept", post(handlers::accept_session))
            .route("/instant-sessions/:id/cancel", post(handlers::cancel_session))

            // Lifecycle tracking
            .route("/instant-sessions/:id/tutor-joined", post(handlers::tutor_joined))
            .route("/instant-sessions/:id/student-joined", post(handlers::student_joined))
            .route("/instant-sessions/:id/start", post(handlers::start_session))
            .route("/instant-sessions/:id/complete", post(handlers::complete_session))

            // History
            .route("/instant-sessions/student/:id", get(handlers::student_history))
            .route("/instant-sessions/tutor/:id", get(handlers::tutor_history))

            // SSE events
            .route("/events", get(sse::event_stream))
        )
        .with_state(ctx)

        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "tmatch-ms",
        "version": env!("CARGO_PKG_VERSION"),
        "port": ctx.port,
        "poll_interval_seconds": ctx.poll_interval_seconds
    }))
}
