//! SSE fan-out endpoint
//!
//! Streams session events to subscribed clients as soon as the coordinator
//! commits a transition, shrinking the window in which tutors race for a
//! request they can no longer win. Delivery is best-effort: clients keep a
//! poll fallback and must tolerate lost or duplicated events.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::AppContext;
use tmatch_common::api::types::SubjectQuery;
use tmatch_common::events::SessionEvent;

/// GET /events - Subscribe to session state-change events
///
/// With `?subject_id=`, only events for that subject are delivered; without
/// it the stream is global.
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(query): Query<SubjectQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        subject_id = ?query.subject_id,
        subscribers = ctx.events.subscriber_count() + 1,
        "New SSE client connected"
    );

    let rx = ctx.events.subscribe();
    let subject_filter = query.subject_id;

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let wanted = subject_matches(&result, subject_filter);
        async move {
            match result {
                Ok(event) if wanted => Event::default()
                    .event(event.event_type())
                    .json_data(&event)
                    .ok()
                    .map(Ok),
                Ok(_) => None,
                Err(e) => {
                    // Lagged subscriber: events were dropped. The client's
                    // poll fallback recovers the missed transitions.
                    warn!("SSE subscriber lagged: {:?}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

fn subject_matches(
    result: &Result<SessionEvent, tokio_stream::wrappers::errors::BroadcastStreamRecvError>,
    filter: Option<Uuid>,
) -> bool {
    match (result, filter) {
        (Ok(event), Some(subject)) => event.subject_id() == subject,
        _ => true,
    }
}
