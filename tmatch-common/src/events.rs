//! Event types and the broadcast bus for state-change fan-out
//!
//! Events are advisory: delivery is best-effort and may be lost or
//! duplicated. Authoritative state lives only in the request store, so a
//! dropped or doubled event can delay a UI update but never corrupt it;
//! the poll fallback closes the gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// State-change notification pushed to subscribers
///
/// The four variants are the complete push vocabulary: everything a
/// pending-pool watcher needs to keep its view current. Wire tags are
/// snake_case (`inserted`, `accepted`, `cancelled`, `expired`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new request entered the pending pool
    Inserted {
        request_id: Uuid,
        subject_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A tutor won the claim; the request left the pending pool
    Accepted {
        request_id: Uuid,
        subject_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A party cancelled; the request left the pending pool
    Cancelled {
        request_id: Uuid,
        subject_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The expiry sweep timed the request out
    Expired {
        request_id: Uuid,
        subject_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Get event type as string for SSE event names and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Inserted { .. } => "inserted",
            SessionEvent::Accepted { .. } => "accepted",
            SessionEvent::Cancelled { .. } => "cancelled",
            SessionEvent::Expired { .. } => "expired",
        }
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            SessionEvent::Inserted { request_id, .. }
            | SessionEvent::Accepted { request_id, .. }
            | SessionEvent::Cancelled { request_id, .. }
            | SessionEvent::Expired { request_id, .. } => *request_id,
        }
    }

    pub fn subject_id(&self) -> Uuid {
        match self {
            SessionEvent::Inserted { subject_id, .. }
            | SessionEvent::Accepted { subject_id, .. }
            | SessionEvent::Cancelled { subject_id, .. }
            | SessionEvent::Expired { subject_id, .. } => *subject_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::broadcast`: non-blocking publish, multiple concurrent
/// subscribers, automatic cleanup when subscribers drop, lagged-message
/// detection for slow subscribers.
///
/// The bus is an explicit context object owned by whoever builds the
/// application (main or a test): it is constructed once, cloned into each
/// publisher, and dropped with its owner. There is no module-scoped
/// singleton, so independent subscribers can coexist in one process and
/// tests never leak channels into each other.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inserted(request_id: Uuid) -> SessionEvent {
        SessionEvent::Inserted {
            request_id,
            subject_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_wire_tags() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&inserted(id)).unwrap();
        assert!(json.contains("\"type\":\"inserted\""));
        assert!(json.contains(&id.to_string()));

        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "inserted");
        assert_eq!(back.request_id(), id);
    }

    #[test]
    fn test_event_type_names() {
        let request_id = Uuid::new_v4();
        let subject_id = Uuid::new_v4();
        let timestamp = Utc::now();
        let events = [
            (
                SessionEvent::Inserted { request_id, subject_id, timestamp },
                "inserted",
            ),
            (
                SessionEvent::Accepted { request_id, subject_id, timestamp },
                "accepted",
            ),
            (
                SessionEvent::Cancelled { request_id, subject_id, timestamp },
                "cancelled",
            ),
            (
                SessionEvent::Expired { request_id, subject_id, timestamp },
                "expired",
            ),
        ];
        for (event, expected) in events {
            assert_eq!(event.event_type(), expected);
            assert_eq!(event.subject_id(), subject_id);
        }
    }

    #[test]
    fn test_eventbus_emit_and_subscribe() {
        let bus = EventBus::new(16);
        assert_eq!(bus.capacity(), 16);
        assert_eq!(bus.subscriber_count(), 0);

        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let id = Uuid::new_v4();
        bus.emit(inserted(id)).expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().request_id(), id);
        assert_eq!(rx2.try_recv().unwrap().request_id(), id);
    }

    #[test]
    fn test_eventbus_emit_lossy_without_subscribers() {
        let bus = EventBus::new(4);
        // No subscribers: must not panic or error
        bus.emit_lossy(inserted(Uuid::new_v4()));
        assert!(bus.emit(inserted(Uuid::new_v4())).is_err());
    }
}
