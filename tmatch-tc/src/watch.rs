//! Watch loop: drives the reconciler from both delivery paths
//!
//! One reconciler, two injected sources. The push listener shrinks the race
//! window; the poller guarantees the view converges within one poll cycle
//! even if every push event is lost.

use crate::client::ApiClient;
use crate::poll::PendingPoller;
use crate::push::PushListener;
use crate::reconciler::{Reconciler, ViewChange};
use std::time::Duration;
use tmatch_common::events::SessionEvent;
use tmatch_common::{Error, RequestStatus, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Which delivery paths feed the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// SSE push plus the poll fallback (default)
    Push,
    /// Poll fallback only
    PollOnly,
}

pub struct WatchSession {
    client: ApiClient,
    subject_id: Option<Uuid>,
    backend: Backend,
    poll_interval: Duration,
}

impl WatchSession {
    pub fn new(
        client: ApiClient,
        subject_id: Option<Uuid>,
        backend: Backend,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            subject_id,
            backend,
            poll_interval,
        }
    }

    /// Run forever, printing every change to the pending-pool view
    pub async fn run(self) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(64);
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(8);

        // In poll-only mode the sender stays parked here (never used, never
        // dropped) so the select loop keeps the same shape for both backends
        let _idle_push_tx = if self.backend == Backend::Push {
            let listener = PushListener::new(self.client.events_url(self.subject_id))?;
            tokio::spawn(listener.run(event_tx));
            None
        } else {
            info!("Push channel disabled, relying on polling only");
            Some(event_tx)
        };

        let poller = PendingPoller::new(self.client.clone(), self.subject_id, self.poll_interval);
        tokio::spawn(poller.run(snapshot_tx));

        let mut reconciler = Reconciler::new();

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    self.apply_push_event(&mut reconciler, event).await;
                }
                Some(snapshot) = snapshot_rx.recv() => {
                    self.apply_snapshot(&mut reconciler, snapshot).await;
                }
                else => {
                    return Err(Error::Internal("All event sources stopped".to_string()));
                }
            }
        }
    }

    async fn apply_push_event(&self, reconciler: &mut Reconciler, event: SessionEvent) {
        let change = match event {
            SessionEvent::Inserted { request_id, .. } => {
                // The event carries ids only; fetch the record before
                // showing a card
                match self.client.get(request_id).await {
                    Ok(snapshot) => reconciler.observe_pending(snapshot.request),
                    Err(e) => {
                        warn!(request_id = %request_id, error = %e, "Failed to fetch inserted request");
                        None
                    }
                }
            }
            SessionEvent::Accepted { request_id, .. } => {
                reconciler.observe_resolved(request_id, RequestStatus::Accepted)
            }
            SessionEvent::Cancelled { request_id, .. } => {
                reconciler.observe_resolved(request_id, RequestStatus::Cancelled)
            }
            SessionEvent::Expired { request_id, .. } => {
                reconciler.observe_resolved(request_id, RequestStatus::Expired)
            }
        };

        if let Some(change) = change {
            print_change(&change);
        }
    }

    async fn apply_snapshot(
        &self,
        reconciler: &mut Reconciler,
        snapshot: Vec<tmatch_common::SessionRequest>,
    ) {
        let diff = reconciler.diff_snapshot(&snapshot);

        for request in diff.appeared {
            if let Some(change) = reconciler.observe_pending(request) {
                print_change(&change);
            }
        }

        for request_id in diff.disappeared {
            // The snapshot only says "gone"; a point read tells us why
            let status = match self.client.get(request_id).await {
                Ok(snapshot) => snapshot.request.status,
                // Requests are never deleted server-side; a vanished row can
                // only mean the server lost it, so clear the card as expired
                Err(Error::NotFound(_)) => RequestStatus::Expired,
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Failed to resolve disappeared request");
                    continue;
                }
            };

            if let Some(change) = reconciler.observe_resolved(request_id, status) {
                print_change(&change);
            }
        }
    }
}

fn print_change(change: &ViewChange) {
    match change {
        ViewChange::Added(request) => {
            println!(
                "+ {}  subject {}  requested {}",
                request.id,
                request.subject_id,
                request.requested_at.to_rfc3339()
            );
        }
        ViewChange::Removed { request_id, status } => {
            println!("- {}  ({})", request_id, status);
        }
    }
}
