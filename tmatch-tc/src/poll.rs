//! Poll fallback: periodic pending-pool snapshots
//!
//! Runs unconditionally alongside the push listener. Whatever the push
//! channel loses or duplicates, the next snapshot corrects; the reconciler
//! dedups overlap between the two paths.

use crate::client::ApiClient;
use std::time::Duration;
use tmatch_common::SessionRequest;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub struct PendingPoller {
    client: ApiClient,
    subject_id: Option<Uuid>,
    interval: Duration,
}

impl PendingPoller {
    pub fn new(client: ApiClient, subject_id: Option<Uuid>, interval: Duration) -> Self {
        Self {
            client,
            subject_id,
            interval,
        }
    }

    /// Run until the receiving side goes away
    pub async fn run(self, tx: mpsc::Sender<Vec<SessionRequest>>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;

            match self.client.list_pending(self.subject_id).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    // Keep ticking; the next poll may succeed
                    warn!(error = %e, "Pending-pool poll failed");
                    if tx.is_closed() {
                        return;
                    }
                }
            }
        }
    }
}
