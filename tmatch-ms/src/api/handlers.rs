//! HTTP request handlers
//!
//! Thin adapters between the wire and the coordinator/lifecycle components.
//! Racing outcomes (`already_claimed`, `invalid_transition`) map to 409 and
//! are logged at debug only; they are expected behavior, not faults.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::api::AppContext;
use tmatch_common::api::types::{
    AcceptSessionRequest, CancelSessionRequest, CreateSessionRequest, ErrorBody, HistoryQuery,
    PartyActionRequest, SessionListResponse, SessionSnapshot, StudentJoinedRequest, SubjectQuery,
    TutorJoinedRequest,
};
use tmatch_common::{time, Error, SessionRequest};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Map a domain error onto an HTTP status + error body
fn error_response(err: Error) -> ApiError {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyClaimed(_) | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
        Error::Unauthorized(_) => StatusCode::FORBIDDEN,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Provisioning(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match &err {
        Error::AlreadyClaimed(_) | Error::InvalidTransition { .. } => {
            debug!("Routine negative outcome: {}", err)
        }
        Error::NotFound(_) | Error::Unauthorized(_) | Error::InvalidInput(_) => {
            debug!("Client error: {}", err)
        }
        Error::Provisioning(_) => warn!("Provisioning failure surfaced to caller: {}", err),
        _ => error!("Request handler error: {}", err),
    }

    let current_status = match &err {
        Error::InvalidTransition { from, .. } => Some(*from),
        _ => None,
    };

    (
        status,
        Json(ErrorBody {
            status: err.to_string(),
            code: err.code().to_string(),
            current_status,
        }),
    )
}

// ============================================================================
// Creation & Reads
// ============================================================================

/// POST /instant-sessions - Create a new pending request
pub async fn create_session(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionRequest>), ApiError> {
    let request = ctx
        .coordinator
        .create(req.student_id, req.subject_id)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /instant-sessions/pending - Current pending pool
pub async fn list_pending(
    State(ctx): State<AppContext>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<SessionListResponse> {
    let requests = ctx
        .store
        .list_pending(query.subject_id)
        .await
        .map_err(error_response)?;

    let count = requests.len();
    Ok(Json(SessionListResponse { requests, count }))
}

/// GET /instant-sessions/:id - Snapshot with read-time elapsed seconds
pub async fn get_session(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSnapshot> {
    let request = ctx.store.get(id).await.map_err(error_response)?;
    let elapsed_seconds = request.elapsed_seconds(time::now());

    Ok(Json(SessionSnapshot {
        request,
        elapsed_seconds,
    }))
}

// ============================================================================
// Claim Coordination
// ============================================================================

/// POST /instant-sessions/:id/accept - Claim a pending request
///
/// 409 with code `already_claimed` means another tutor won; the caller must
/// treat it as a normal outcome and move on to other requests.
pub async fn accept_session(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcceptSessionRequest>,
) -> ApiResult<SessionRequest> {
    let request = ctx
        .coordinator
        .accept(id, req.tutor_id)
        .await
        .map_err(error_response)?;

    Ok(Json(request))
}

/// POST /instant-sessions/:id/cancel - Abort before start
pub async fn cancel_session(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelSessionRequest>,
) -> ApiResult<SessionRequest> {
    let request = ctx
        .coordinator
        .cancel(id, req.caller_id, req.reason)
        .await
        .map_err(error_response)?;

    Ok(Json(request))
}

// ============================================================================
// Lifecycle Tracking
// ============================================================================

/// POST /instant-sessions/:id/tutor-joined
pub async fn tutor_joined(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<TutorJoinedRequest>,
) -> ApiResult<SessionRequest> {
    let request = ctx
        .lifecycle
        .mark_tutor_joined(id, req.tutor_id)
        .await
        .map_err(error_response)?;

    Ok(Json(request))
}

/// POST /instant-sessions/:id/student-joined
pub async fn student_joined(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<StudentJoinedRequest>,
) -> ApiResult<SessionRequest> {
    let request = ctx
        .lifecycle
        .mark_student_joined(id, req.student_id)
        .await
        .map_err(error_response)?;

    Ok(Json(request))
}

/// POST /instant-sessions/:id/start
pub async fn start_session(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<PartyActionRequest>,
) -> ApiResult<SessionRequest> {
    let request = ctx
        .lifecycle
        .start(id, req.caller_id)
        .await
        .map_err(error_response)?;

    Ok(Json(request))
}

/// POST /instant-sessions/:id/complete - Idempotent completion
pub async fn complete_session(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<PartyActionRequest>,
) -> ApiResult<SessionRequest> {
    let request = ctx
        .lifecycle
        .complete(id, req.caller_id)
        .await
        .map_err(error_response)?;

    Ok(Json(request))
}

// ============================================================================
// History
// ============================================================================

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT)
}

/// GET /instant-sessions/student/:id - Student's request history
pub async fn student_history(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<SessionListResponse> {
    let requests = ctx
        .store
        .list_by_student(id, clamp_limit(query.limit))
        .await
        .map_err(error_response)?;

    let count = requests.len();
    Ok(Json(SessionListResponse { requests, count }))
}

/// GET /instant-sessions/tutor/:id - Tutor's claimed-session history
pub async fn tutor_history(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<SessionListResponse> {
    let requests = ctx
        .store
        .list_by_tutor(id, clamp_limit(query.limit))
        .await
        .map_err(error_response)?;

    let count = requests.len();
    Ok(Json(SessionListResponse { requests, count }))
}
