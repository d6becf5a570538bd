//! Background expiry sweep
//!
//! Periodically expires pending requests older than the configured TTL.
//! Each expiry goes through the same conditional update as everything else,
//! so a tutor's concurrent accept and the sweep race safely: exactly one
//! wins, and per request the outcome is all-or-nothing.

use std::sync::Arc;
use std::time::Duration;
use tmatch_common::{time, Error, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::coordinator::ClaimCoordinator;
use crate::db::RequestStore;

pub struct ExpirySweeper {
    store: RequestStore,
    coordinator: Arc<ClaimCoordinator>,
    ttl: chrono::Duration,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: RequestStore,
        coordinator: Arc<ClaimCoordinator>,
        ttl_minutes: i64,
        interval_seconds: i64,
    ) -> Self {
        Self {
            store,
            coordinator,
            ttl: chrono::Duration::minutes(ttl_minutes),
            interval: Duration::from_secs(interval_seconds.max(1) as u64),
        }
    }

    /// Run until the shutdown signal flips
    ///
    /// The timer is cancellable mid-wait; an in-flight sweep finishes its
    /// current conditional updates, leaving no partial state.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // First tick fires immediately; skip it so startup isn't a sweep
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            ttl_minutes = self.ttl.num_minutes(),
            "Expiry sweep started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Expiry sweep pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender means the owner is gone: stop too
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Expiry sweep stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One sweep pass; returns how many requests were expired
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = time::now() - self.ttl;
        let overdue = self.store.list_pending_older_than(cutoff).await?;

        let mut expired = 0;
        for request in overdue {
            match self.coordinator.expire(request.id).await {
                Ok(_) => expired += 1,
                // Lost the race to an accept or cancel between the scan and
                // the update. Routine, not a fault
                Err(Error::InvalidTransition { .. }) | Err(Error::NotFound(_)) => {
                    debug!(request_id = %request.id, "Request no longer pending, skipping expiry");
                }
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "Failed to expire request");
                }
            }
        }

        if expired > 0 {
            info!(count = expired, "Expired overdue session requests");
        }

        Ok(expired)
    }
}
