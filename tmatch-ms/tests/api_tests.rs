//! Integration tests for the matching server API
//!
//! Drives the full router (handlers, error mapping, wire formats) against a
//! single-connection in-memory database, covering creation, the pending
//! pool, claim/cancel conflicts, lifecycle idempotency, authorization and
//! history.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method
use uuid::Uuid;

use tmatch_common::events::EventBus;
use tmatch_ms::coordinator::ClaimCoordinator;
use tmatch_ms::db::{self, RequestStore};
use tmatch_ms::lifecycle::LifecycleTracker;
use tmatch_ms::provision::RoomTemplateProvisioner;
use tmatch_ms::{build_router, AppContext};

/// Test helper: build a full application context over an in-memory database
async fn test_context() -> AppContext {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should open in-memory database");

    db::init::init_schema(&pool).await.expect("Schema should apply");
    db::init::init_settings_defaults(&pool)
        .await
        .expect("Defaults should seed");

    let store = RequestStore::new(pool, 5000);
    let events = EventBus::new(64);
    let coordinator = Arc::new(ClaimCoordinator::new(
        store.clone(),
        Arc::new(RoomTemplateProvisioner::default()),
        events.clone(),
        3,
        10,
    ));
    let lifecycle = Arc::new(LifecycleTracker::new(store.clone()));

    AppContext {
        store,
        coordinator,
        lifecycle,
        events,
        poll_interval_seconds: 5,
        port: 0,
    }
}

async fn setup_app() -> axum::Router {
    build_router(test_context().await)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Create a request through the API, returning (id, student_id, subject_id)
async fn create_request(app: &axum::Router) -> (Uuid, Uuid, Uuid) {
    let student_id = Uuid::new_v4();
    let subject_id = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/instant-sessions",
            json!({ "student_id": student_id, "subject_id": subject_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    let id = body["id"].as_str().unwrap().parse().unwrap();
    (id, student_id, subject_id)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "tmatch-ms");
    assert!(body["version"].is_string());
    assert_eq!(body["poll_interval_seconds"], 5);
}

// =============================================================================
// Creation & Pending Pool
// =============================================================================

#[tokio::test]
async fn test_create_returns_pending_with_policy_duration() {
    let app = setup_app().await;
    let student_id = Uuid::new_v4();
    let subject_id = Uuid::new_v4();

    let response = app
        .oneshot(post_json(
            "/api/v1/instant-sessions",
            json!({ "student_id": student_id, "subject_id": subject_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["duration_minutes"], 15);
    assert_eq!(body["student_id"], json!(student_id));
    assert_eq!(body["subject_id"], json!(subject_id));
    assert!(body["requested_at"].is_string());
    assert!(body["tutor_id"].is_null());
    assert!(body["meeting_url"].is_null());
}

#[tokio::test]
async fn test_pending_pool_lists_and_filters_by_subject() {
    let app = setup_app().await;
    let (_, _, subject_a) = create_request(&app).await;
    create_request(&app).await;

    let response = app
        .clone()
        .oneshot(get("/api/v1/instant-sessions/pending"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 2);

    let response = app
        .oneshot(get(&format!(
            "/api/v1/instant-sessions/pending?subject_id={}",
            subject_a
        )))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["requests"][0]["subject_id"], json!(subject_a));
}

#[tokio::test]
async fn test_get_unknown_request_is_404() {
    let app = setup_app().await;
    let response = app
        .oneshot(get(&format!("/api/v1/instant-sessions/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "not_found");
}

// =============================================================================
// Claiming
// =============================================================================

#[tokio::test]
async fn test_accept_claims_and_provisions_meeting_url() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;
    let tutor_id = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["tutor_id"], json!(tutor_id));
    assert!(body["accepted_at"].is_string());

    let meeting_url = body["meeting_url"].as_str().unwrap();
    assert!(meeting_url.contains(&id.to_string()));

    // The claimed request has left the pending pool
    let response = app
        .oneshot(get("/api/v1/instant-sessions/pending"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_second_accept_is_already_claimed() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "already_claimed");
}

#[tokio::test]
async fn test_accept_after_expiry_is_invalid_transition() {
    let ctx = test_context().await;
    let app = build_router(ctx.clone());
    let (id, _, _) = create_request(&app).await;

    // Force the request into the expired state through the coordinator
    ctx.coordinator.expire(id).await.unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "invalid_transition");
    assert_eq!(body["current_status"], "expired");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_pending_by_stranger_is_forbidden() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/cancel", id),
            json!({ "caller_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_cancel_pending_by_student_persists_reason() {
    let app = setup_app().await;
    let (id, student_id, _) = create_request(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/cancel", id),
            json!({ "caller_id": student_id, "reason": "found help elsewhere" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancellation_reason"], "found help elsewhere");
    assert!(body["cancelled_at"].is_string());

    // A late accept now loses cleanly
    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "invalid_transition");
    assert_eq!(body["current_status"], "cancelled");
}

#[tokio::test]
async fn test_cancel_accepted_by_tutor_is_pre_start_abort() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;
    let tutor_id = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/cancel", id),
            json!({ "caller_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "cancelled");
    // The assignment is history, not erased
    assert_eq!(body["tutor_id"], json!(tutor_id));
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Accept a request and return the assigned tutor id
async fn claim(app: &axum::Router, id: Uuid) -> Uuid {
    let tutor_id = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/accept", id),
            json!({ "tutor_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    tutor_id
}

#[tokio::test]
async fn test_join_markers_are_idempotent() {
    let app = setup_app().await;
    let (id, student_id, _) = create_request(&app).await;
    let tutor_id = claim(&app, id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/tutor-joined", id),
            json!({ "tutor_id": tutor_id }),
        ))
        .await
        .unwrap();
    let first = extract_json(response.into_body()).await;
    let first_stamp = first["tutor_joined_at"].as_str().unwrap().to_string();
    // Joining does not advance the status
    assert_eq!(first["status"], "accepted");

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/tutor-joined", id),
            json!({ "tutor_id": tutor_id }),
        ))
        .await
        .unwrap();
    let second = extract_json(response.into_body()).await;
    assert_eq!(second["tutor_joined_at"], first_stamp.as_str());

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/student-joined", id),
            json!({ "student_id": student_id }),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert!(body["student_joined_at"].is_string());
}

#[tokio::test]
async fn test_join_by_wrong_party_is_forbidden() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;
    claim(&app, id).await;

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/tutor-joined", id),
            json!({ "tutor_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_start_then_complete_with_idempotent_completion() {
    let app = setup_app().await;
    let (id, student_id, _) = create_request(&app).await;
    let tutor_id = claim(&app, id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/start", id),
            json!({ "caller_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "in_progress");
    assert!(body["started_at"].is_string());

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/complete", id),
            json!({ "caller_id": student_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "completed");
    let completed_at = body["completed_at"].as_str().unwrap().to_string();

    // Duplicate completion is a no-op success with the original stamp
    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/complete", id),
            json!({ "caller_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["completed_at"], completed_at.as_str());
}

#[tokio::test]
async fn test_start_from_pending_is_invalid_transition() {
    let app = setup_app().await;
    let (id, student_id, _) = create_request(&app).await;

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/start", id),
            json!({ "caller_id": student_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "invalid_transition");
    assert_eq!(body["current_status"], "pending");
}

#[tokio::test]
async fn test_complete_by_third_party_is_forbidden() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;
    claim(&app, id).await;

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/complete", id),
            json!({ "caller_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "unauthorized");
}

// =============================================================================
// Snapshots & History
// =============================================================================

#[tokio::test]
async fn test_snapshot_reports_elapsed_after_acceptance() {
    let app = setup_app().await;
    let (id, _, _) = create_request(&app).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/instant-sessions/{}", id)))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert!(body.get("elapsed_seconds").is_none());

    claim(&app, id).await;

    let response = app
        .oneshot(get(&format!("/api/v1/instant-sessions/{}", id)))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert!(body["elapsed_seconds"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn test_history_includes_terminal_records() {
    let app = setup_app().await;
    let (id, student_id, _) = create_request(&app).await;
    let tutor_id = claim(&app, id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/instant-sessions/{}/complete", id),
            json!({ "caller_id": tutor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/v1/instant-sessions/student/{}",
            student_id
        )))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["requests"][0]["status"], "completed");

    let response = app
        .oneshot(get(&format!("/api/v1/instant-sessions/tutor/{}", tutor_id)))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["requests"][0]["id"], json!(id));
}

// =============================================================================
// SSE
// =============================================================================

#[tokio::test]
async fn test_event_stream_content_type() {
    let app = setup_app().await;
    let response = app.oneshot(get("/api/v1/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
}
