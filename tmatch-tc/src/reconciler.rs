//! Client-side reconciler for the pending-pool view
//!
//! Merges two concurrent delivery paths, push events and poll snapshots,
//! into one consistent local view. The core rule is idempotent merge: every
//! observation is applied only if it advances the last-known status for
//! that request id, so a push event and the later poll-detected diff for
//! the same transition never double-apply, and stale events arriving after
//! a newer observation are dropped.

use std::collections::{HashMap, HashSet};
use tmatch_common::{RequestStatus, SessionRequest};
use uuid::Uuid;

/// A change to this subscriber's pending-pool view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
    /// A request became visible in the pending pool
    Added(Box<SessionRequest>),
    /// A request left the pending pool, with the status that removed it
    Removed {
        request_id: Uuid,
        status: RequestStatus,
    },
}

/// Result of diffing a poll snapshot against the local view
#[derive(Debug, Default, Clone)]
pub struct SnapshotDiff {
    /// In the snapshot but not in the local view
    pub appeared: Vec<SessionRequest>,
    /// In the local view but missing from the snapshot; the caller resolves
    /// each one to its true final status before feeding it back
    pub disappeared: Vec<Uuid>,
}

#[derive(Default)]
pub struct Reconciler {
    /// Last-known status per request id (includes resolved requests, so a
    /// late duplicate event for an old transition stays a no-op)
    known: HashMap<Uuid, RequestStatus>,
    /// Full records for requests currently shown as pending
    visible: HashMap<Uuid, SessionRequest>,
    /// Locally rejected requests: hidden from this view only, no shared
    /// state involved
    dismissed: HashSet<Uuid>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a pending request (poll snapshot entry, or a fetched record
    /// after a push `inserted` event)
    pub fn observe_pending(&mut self, request: SessionRequest) -> Option<ViewChange> {
        if request.status != RequestStatus::Pending {
            // The record advanced between the event and our fetch; record
            // the resolution instead of showing a stale card.
            let id = request.id;
            let status = request.status;
            return self.observe_resolved(id, status);
        }

        match self.known.get(&request.id) {
            // Already tracked at pending or beyond: duplicate, no-op
            Some(_) => None,
            None => {
                self.known.insert(request.id, RequestStatus::Pending);
                if self.dismissed.contains(&request.id) {
                    return None;
                }
                self.visible.insert(request.id, request.clone());
                Some(ViewChange::Added(Box::new(request)))
            }
        }
    }

    /// Observe that a request reached `status` (push event, or the
    /// resolution of a poll-detected disappearance)
    ///
    /// Idempotent: an observation that does not advance the recorded status
    /// is dropped.
    pub fn observe_resolved(&mut self, id: Uuid, status: RequestStatus) -> Option<ViewChange> {
        if let Some(recorded) = self.known.get(&id) {
            if status.rank() <= recorded.rank() {
                return None;
            }
        }
        self.known.insert(id, status);

        // Only visible cards produce a view change; a resolution for a
        // request this subscriber never displayed is bookkeeping only.
        if self.visible.remove(&id).is_some() {
            Some(ViewChange::Removed {
                request_id: id,
                status,
            })
        } else {
            None
        }
    }

    /// Diff a full poll snapshot of the pending pool against the local view
    pub fn diff_snapshot(&self, snapshot: &[SessionRequest]) -> SnapshotDiff {
        let snapshot_ids: HashSet<Uuid> = snapshot.iter().map(|r| r.id).collect();

        let appeared = snapshot
            .iter()
            .filter(|r| !self.known.contains_key(&r.id))
            .cloned()
            .collect();

        let disappeared = self
            .visible
            .keys()
            .filter(|id| !snapshot_ids.contains(id))
            .copied()
            .collect();

        SnapshotDiff {
            appeared,
            disappeared,
        }
    }

    /// Locally reject a request: hide it from this subscriber's view
    ///
    /// Purely local: nothing is persisted, no other subscriber is
    /// affected, and the student is not notified.
    pub fn dismiss(&mut self, id: Uuid) -> Option<ViewChange> {
        self.dismissed.insert(id);
        if self.visible.remove(&id).is_some() {
            Some(ViewChange::Removed {
                request_id: id,
                status: RequestStatus::Pending,
            })
        } else {
            None
        }
    }

    /// Requests currently shown in this subscriber's pending pool
    pub fn pending_view(&self) -> Vec<&SessionRequest> {
        let mut view: Vec<&SessionRequest> = self.visible.values().collect();
        view.sort_by_key(|r| r.requested_at);
        view
    }
}
