//! Claim coordinator: the atomic state-transition gate
//!
//! Every shared-state transition of a session request goes through here:
//! create, accept, cancel, expire. The coordinator owns no locks. It relies
//! entirely on the store's conditional update, so whichever caller lands
//! first wins and the rest observe a failed precondition.

use std::sync::Arc;
use tmatch_common::events::{EventBus, SessionEvent};
use tmatch_common::{time, Error, RequestStatus, Result, SessionRequest};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{RequestPatch, RequestStore};
use crate::provision::MeetingProvisioner;

pub struct ClaimCoordinator {
    store: RequestStore,
    provisioner: Arc<dyn MeetingProvisioner>,
    events: EventBus,
    provision_max_attempts: u32,
    provision_backoff_ms: u64,
}

impl ClaimCoordinator {
    pub fn new(
        store: RequestStore,
        provisioner: Arc<dyn MeetingProvisioner>,
        events: EventBus,
        provision_max_attempts: u32,
        provision_backoff_ms: u64,
    ) -> Self {
        Self {
            store,
            provisioner,
            events,
            provision_max_attempts,
            provision_backoff_ms,
        }
    }

    /// Create a new pending request and announce it to the pending pool
    pub async fn create(&self, student_id: Uuid, subject_id: Uuid) -> Result<SessionRequest> {
        let request = self.store.create(student_id, subject_id).await?;

        info!(
            request_id = %request.id,
            subject_id = %subject_id,
            "Session request created"
        );

        self.events.emit_lossy(SessionEvent::Inserted {
            request_id: request.id,
            subject_id,
            timestamp: request.requested_at,
        });

        Ok(request)
    }

    /// Claim a pending request for a tutor
    ///
    /// Exactly one of N concurrent callers succeeds; the rest get
    /// `AlreadyClaimed`, which means "someone else got it"; retrying
    /// against the same request would only fail again. A request that has
    /// already left the claimable part of its lifecycle (cancelled, expired,
    /// completed) surfaces `InvalidTransition` instead.
    ///
    /// On success the meeting URL is populated before the request is
    /// returned, so the winning tutor can join immediately.
    pub async fn accept(&self, id: Uuid, tutor_id: Uuid) -> Result<SessionRequest> {
        let patch = RequestPatch {
            status: Some(RequestStatus::Accepted),
            tutor_id: Some(tutor_id),
            accepted_at: Some(time::now()),
            ..Default::default()
        };

        let accepted = match self
            .store
            .update_if(id, &[RequestStatus::Pending], patch, "accept")
            .await
        {
            Ok(request) => request,
            Err(Error::InvalidTransition { from, .. })
                if matches!(from, RequestStatus::Accepted | RequestStatus::InProgress) =>
            {
                debug!(request_id = %id, tutor_id = %tutor_id, "Claim lost: already accepted");
                return Err(Error::AlreadyClaimed(id));
            }
            Err(e) => return Err(e),
        };

        info!(
            request_id = %id,
            tutor_id = %tutor_id,
            "Session request claimed"
        );

        // The claim is committed: tell the pool immediately, before the
        // (possibly slow) provisioning round trip
        self.events.emit_lossy(SessionEvent::Accepted {
            request_id: accepted.id,
            subject_id: accepted.subject_id,
            timestamp: accepted.accepted_at.unwrap_or_else(time::now),
        });

        self.ensure_meeting_url(accepted).await
    }

    /// Populate the meeting URL if it is still absent
    ///
    /// Provisioning failures are retried a bounded number of times with
    /// doubling backoff. Persistence is first-writer-wins: if a concurrent
    /// retry already stored a URL, that one is kept and ours is discarded.
    async fn ensure_meeting_url(&self, request: SessionRequest) -> Result<SessionRequest> {
        if request.meeting_url.is_some() {
            return Ok(request);
        }

        let id = request.id;
        let mut backoff_ms = self.provision_backoff_ms;
        let mut last_error = None;

        for attempt in 1..=self.provision_max_attempts {
            match self.provisioner.provision(id).await {
                Ok(url) => {
                    return self.store.set_meeting_url_if_unset(id, &url).await;
                }
                Err(e) => {
                    warn!(
                        request_id = %id,
                        attempt,
                        max_attempts = self.provision_max_attempts,
                        error = %e,
                        "Meeting provisioning attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.provision_max_attempts {
                        tokio::time::sleep(time::millis_to_duration(backoff_ms)).await;
                        backoff_ms = backoff_ms.saturating_mul(2);
                    }
                }
            }
        }

        // The claim stands; only the room is missing. Surfaced as retryable.
        Err(last_error.unwrap_or_else(|| {
            Error::Provisioning("no provisioning attempts were made".to_string())
        }))
    }

    /// Cancel a request before its session starts
    ///
    /// A pending request may be cancelled only by the requesting student; an
    /// accepted (not yet started) request by either party.
    pub async fn cancel(
        &self,
        id: Uuid,
        caller_id: Uuid,
        reason: Option<String>,
    ) -> Result<SessionRequest> {
        let current = self.store.get(id).await?;

        let authorized = match current.status {
            RequestStatus::Pending => caller_id == current.student_id,
            RequestStatus::Accepted => current.is_party(caller_id),
            // Let the conditional update report the illegal transition
            _ => current.is_party(caller_id),
        };
        if !authorized {
            return Err(Error::Unauthorized(format!(
                "{} may not cancel request {}",
                caller_id, id
            )));
        }

        let patch = RequestPatch {
            status: Some(RequestStatus::Cancelled),
            cancelled_at: Some(time::now()),
            cancellation_reason: reason,
            ..Default::default()
        };

        let cancelled = self
            .store
            .update_if(
                id,
                &[RequestStatus::Pending, RequestStatus::Accepted],
                patch,
                "cancel",
            )
            .await?;

        info!(request_id = %id, caller_id = %caller_id, "Session request cancelled");

        self.events.emit_lossy(SessionEvent::Cancelled {
            request_id: cancelled.id,
            subject_id: cancelled.subject_id,
            timestamp: cancelled.cancelled_at.unwrap_or_else(time::now),
        });

        Ok(cancelled)
    }

    /// Expire one overdue pending request (sweep path)
    ///
    /// Races a concurrent accept safely: the conditional update decides the
    /// winner, and losing here is routine.
    pub async fn expire(&self, id: Uuid) -> Result<SessionRequest> {
        let patch = RequestPatch {
            status: Some(RequestStatus::Expired),
            expired_at: Some(time::now()),
            ..Default::default()
        };

        let expired = self
            .store
            .update_if(id, &[RequestStatus::Pending], patch, "expire")
            .await?;

        info!(request_id = %id, "Session request expired");

        self.events.emit_lossy(SessionEvent::Expired {
            request_id: expired.id,
            subject_id: expired.subject_id,
            timestamp: expired.expired_at.unwrap_or_else(time::now),
        });

        Ok(expired)
    }
}
