//! Session lifecycle tracking on top of an already-claimed request
//!
//! Join markers, start, and completion. Everything here is scoped to the
//! owning student/tutor pair and tolerant of duplicate client requests:
//! join markers and completion are idempotent.

use tmatch_common::{time, Error, RequestStatus, Result, SessionRequest};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{JoinParty, RequestPatch, RequestStore};

pub struct LifecycleTracker {
    store: RequestStore,
}

impl LifecycleTracker {
    pub fn new(store: RequestStore) -> Self {
        Self { store }
    }

    /// Record that the assigned tutor opened the meeting
    ///
    /// Sets `tutor_joined_at` once; repeated calls keep the first stamp.
    pub async fn mark_tutor_joined(&self, id: Uuid, tutor_id: Uuid) -> Result<SessionRequest> {
        let current = self.store.get(id).await?;
        if current.tutor_id != Some(tutor_id) {
            return Err(Error::Unauthorized(format!(
                "{} is not the assigned tutor for request {}",
                tutor_id, id
            )));
        }

        self.store.mark_joined(id, JoinParty::Tutor).await
    }

    /// Record that the requesting student opened the meeting
    pub async fn mark_student_joined(&self, id: Uuid, student_id: Uuid) -> Result<SessionRequest> {
        let current = self.store.get(id).await?;
        if current.student_id != student_id {
            return Err(Error::Unauthorized(format!(
                "{} is not the requesting student for request {}",
                student_id, id
            )));
        }

        self.store.mark_joined(id, JoinParty::Student).await
    }

    /// Transition `accepted -> in_progress`, stamping `started_at`
    pub async fn start(&self, id: Uuid, caller_id: Uuid) -> Result<SessionRequest> {
        let current = self.store.get(id).await?;
        if !current.is_party(caller_id) {
            return Err(Error::Unauthorized(format!(
                "{} is not a party to request {}",
                caller_id, id
            )));
        }

        let patch = RequestPatch {
            status: Some(RequestStatus::InProgress),
            started_at: Some(time::now()),
            ..Default::default()
        };

        let started = self
            .store
            .update_if(id, &[RequestStatus::Accepted], patch, "start")
            .await?;

        info!(request_id = %id, "Session started");
        Ok(started)
    }

    /// Transition `accepted|in_progress -> completed`
    ///
    /// Only the assigned tutor or the student may complete. Completing an
    /// already-completed request is a no-op success so duplicate client
    /// requests never surface an error.
    pub async fn complete(&self, id: Uuid, caller_id: Uuid) -> Result<SessionRequest> {
        let current = self.store.get(id).await?;
        if !current.is_party(caller_id) {
            return Err(Error::Unauthorized(format!(
                "{} is not a party to request {}",
                caller_id, id
            )));
        }

        let patch = RequestPatch {
            status: Some(RequestStatus::Completed),
            completed_at: Some(time::now()),
            ..Default::default()
        };

        match self
            .store
            .update_if(
                id,
                &[RequestStatus::Accepted, RequestStatus::InProgress],
                patch,
                "complete",
            )
            .await
        {
            Ok(completed) => {
                info!(request_id = %id, caller_id = %caller_id, "Session completed");
                Ok(completed)
            }
            Err(Error::InvalidTransition {
                from: RequestStatus::Completed,
                ..
            }) => {
                debug!(request_id = %id, "Duplicate completion ignored");
                self.store.get(id).await
            }
            Err(e) => Err(e),
        }
    }
}
