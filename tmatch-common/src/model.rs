//! Session request data model and status state machine
//!
//! A `SessionRequest` is the only shared mutable entity in the system. All
//! mutation happens through the matching server's conditional-update
//! primitive; this module only defines the shape and the pure helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed session length policy, stamped at creation
pub const SESSION_DURATION_MINUTES: i64 = 15;

/// Lifecycle status of a session request
///
/// Wire values are load-bearing: clients and stored rows both use the
/// snake_case strings (`pending`, `accepted`, `in_progress`, `completed`,
/// `cancelled`, `expired`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created by a student, visible in the pending pool, claimable
    Pending,
    /// Claimed by exactly one tutor
    Accepted,
    /// Session underway
    InProgress,
    /// Finished normally (terminal)
    Completed,
    /// Aborted by a party before start (terminal)
    Cancelled,
    /// Timed out unclaimed (terminal)
    Expired,
}

impl RequestStatus {
    /// Stable string used both on the wire and in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    /// Parse a stored/wire status string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "cancelled" => Some(RequestStatus::Cancelled),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }

    /// Terminal states are mutually exclusive and final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }

    /// Forward-progress ordering used by client reconcilers to drop stale
    /// events: a status never moves to a lower rank.
    pub fn rank(&self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Accepted => 1,
            RequestStatus::InProgress => 2,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Expired => 3,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instant-tutoring ask and its full lifecycle bookkeeping
///
/// Timestamps are each set exactly once and are non-decreasing relative to
/// `requested_at`. `tutor_id` and `accepted_at` are set together or not at
/// all; `meeting_url` is written once and never re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub duration_minutes: i64,
    pub status: RequestStatus,
    pub tutor_id: Option<Uuid>,
    pub meeting_url: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub tutor_joined_at: Option<DateTime<Utc>>,
    pub student_joined_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl SessionRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when `caller` is the owning student or the assigned tutor
    pub fn is_party(&self, caller: Uuid) -> bool {
        caller == self.student_id || self.tutor_id == Some(caller)
    }

    /// Elapsed session time, computed on read and never persisted
    ///
    /// Measured from `started_at` once the session has started, otherwise
    /// from `accepted_at`. `None` before acceptance.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        let base = self.started_at.or(self.accepted_at)?;
        Some((now - base).num_seconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(status: RequestStatus) -> SessionRequest {
        SessionRequest {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            duration_minutes: SESSION_DURATION_MINUTES,
            status,
            tutor_id: None,
            meeting_url: None,
            requested_at: Utc::now(),
            accepted_at: None,
            tutor_joined_at: None,
            student_joined_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            expired_at: None,
            cancellation_reason: None,
        }
    }

    #[test]
    fn test_status_wire_values_exact() {
        // Compatibility contract: these strings must never change
        let expected = [
            (RequestStatus::Pending, "pending"),
            (RequestStatus::Accepted, "accepted"),
            (RequestStatus::InProgress, "in_progress"),
            (RequestStatus::Completed, "completed"),
            (RequestStatus::Cancelled, "cancelled"),
            (RequestStatus::Expired, "expired"),
        ];
        for (status, wire) in expected {
            assert_eq!(status.as_str(), wire);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", wire)
            );
            let parsed: RequestStatus =
                serde_json::from_str(&format!("\"{}\"", wire)).unwrap();
            assert_eq!(parsed, status);
            assert_eq!(RequestStatus::parse(wire), Some(status));
        }
        assert_eq!(RequestStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Accepted.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn test_rank_is_forward_only() {
        assert!(RequestStatus::Pending.rank() < RequestStatus::Accepted.rank());
        assert!(RequestStatus::Accepted.rank() < RequestStatus::InProgress.rank());
        assert!(RequestStatus::InProgress.rank() < RequestStatus::Completed.rank());
        // All terminals share the top rank
        assert_eq!(
            RequestStatus::Cancelled.rank(),
            RequestStatus::Expired.rank()
        );
    }

    #[test]
    fn test_elapsed_none_before_acceptance() {
        let req = request(RequestStatus::Pending);
        assert_eq!(req.elapsed_seconds(Utc::now()), None);
    }

    #[test]
    fn test_elapsed_from_accepted_then_started() {
        let now = Utc::now();
        let mut req = request(RequestStatus::Accepted);
        req.accepted_at = Some(now - Duration::seconds(120));
        assert_eq!(req.elapsed_seconds(now), Some(120));

        // Once started, the start stamp becomes the base
        req.status = RequestStatus::InProgress;
        req.started_at = Some(now - Duration::seconds(30));
        assert_eq!(req.elapsed_seconds(now), Some(30));
    }

    #[test]
    fn test_is_party() {
        let mut req = request(RequestStatus::Accepted);
        let tutor = Uuid::new_v4();
        req.tutor_id = Some(tutor);
        assert!(req.is_party(req.student_id));
        assert!(req.is_party(tutor));
        assert!(!req.is_party(Uuid::new_v4()));
    }
}
