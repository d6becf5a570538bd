//! Shared API request/response types
//!
//! Caller identity travels in request bodies (authentication is handled by
//! the surrounding platform, outside this engine); the server authorizes the
//! given id against the stored record.

use crate::model::SessionRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Request Bodies
// ========================================

/// POST /api/v1/instant-sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub student_id: Uuid,
    pub subject_id: Uuid,
}

/// POST /api/v1/instant-sessions/:id/accept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptSessionRequest {
    pub tutor_id: Uuid,
}

/// POST /api/v1/instant-sessions/:id/cancel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSessionRequest {
    pub caller_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// POST /api/v1/instant-sessions/:id/tutor-joined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorJoinedRequest {
    pub tutor_id: Uuid,
}

/// POST /api/v1/instant-sessions/:id/student-joined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentJoinedRequest {
    pub student_id: Uuid,
}

/// POST /api/v1/instant-sessions/:id/start and /complete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyActionRequest {
    pub caller_id: Uuid,
}

// ========================================
// Query Parameters
// ========================================

/// GET /api/v1/instant-sessions/pending and /api/v1/events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<Uuid>,
}

/// GET /api/v1/instant-sessions/student/:id and /tutor/:id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

// ========================================
// Response Bodies
// ========================================

/// Single-request snapshot with read-time derived fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub request: SessionRequest,
    /// Computed from the clock at read time, never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<i64>,
}

/// Pending pool / history list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub requests: Vec<SessionRequest>,
    pub count: usize,
}

/// Error body returned for all non-2xx API results
///
/// `code` is stable and machine-readable (`already_claimed`,
/// `invalid_transition`, `unauthorized`, ...); `status` is human-readable.
/// For `invalid_transition`, `current_status` carries the status that beat
/// the caller so clients can reconcile without another round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<crate::model::RequestStatus>,
}
