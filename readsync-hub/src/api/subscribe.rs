//! Server-Sent Events (SSE) feed subscription
//!
//! Streams one session's feed to connected dashboards: a `connected`
//! greeting, a roster `snapshot`, then live events until `session_end`.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use readsync_common::events::FeedEvent;

use crate::api::error::ApiError;
use crate::AppState;

/// GET /api/subscribe/:session_id - SSE feed stream
///
/// The roster snapshot is taken under the same lock that admits the
/// broadcast receiver, so no event is missed or double-delivered across
/// the snapshot boundary. Subscribing to an ended session returns 410.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.registry.get(&session_id).await?;
    let (students, rx) = session.subscribe().await?;
    info!(
        session_id = %session_id,
        students = students.len(),
        "new feed subscriber"
    );

    let now = Utc::now();
    let prelude = [
        FeedEvent::Connected {
            session_id: session_id.clone(),
            timestamp: now,
        },
        FeedEvent::Snapshot {
            session_id: session_id.clone(),
            data: students,
            timestamp: now,
        },
    ];

    let stream = async_stream::stream! {
        for event in prelude {
            if let Some(frame) = sse_frame(&event) {
                yield Ok(frame);
            }
        }

        let mut live = BroadcastStream::new(rx);
        while let Some(item) = live.next().await {
            match item {
                Ok(event) => {
                    let terminal = matches!(event, FeedEvent::SessionEnd { .. });
                    if let Some(frame) = sse_frame(&event) {
                        yield Ok(frame);
                    }
                    if terminal {
                        break;
                    }
                }
                Err(e) => {
                    // Lagged subscriber: broadcast dropped the oldest
                    // events. The dashboard resyncs from snapshots, so
                    // keep streaming rather than tearing down.
                    warn!(session_id = %session_id, "feed subscriber lagged: {:?}", e);
                }
            }
        }
        debug!(session_id = %session_id, "feed stream closed");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Build one SSE frame from a feed event
fn sse_frame(event: &FeedEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize feed event: {}", e);
            None
        }
    }
}
