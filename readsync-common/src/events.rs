//! Feed event types and the per-session broadcast feed
//!
//! Every frame that crosses the subscription channel is a [`FeedEvent`].
//! Consumers match the enum exhaustively; there is no payload sniffing.

use crate::progress::{ProgressEvent, StudentState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Envelope for everything delivered over a session's subscription feed
///
/// Serialized with an internal `type` tag so the wire form is
/// `{ "type": "progress_update", "session_id": ..., "data": ..., "timestamp": ... }`.
/// The same enum is used server-side for fan-out and client-side for
/// reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Handshake frame, first on every subscription
    Connected {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Full materialized roster, second frame on every subscription
    ///
    /// A dashboard replaces its local state wholesale on receipt, which is
    /// also the only resynchronization mechanism after a reconnect.
    Snapshot {
        session_id: String,
        data: Vec<StudentState>,
        timestamp: DateTime<Utc>,
    },

    /// A student entered the roster (explicit join or first report)
    StudentJoin {
        session_id: String,
        data: StudentState,
        timestamp: DateTime<Utc>,
    },

    /// One appended log entry
    ProgressUpdate {
        session_id: String,
        data: ProgressEvent,
        timestamp: DateTime<Utc>,
    },

    /// The session was terminated; the feed closes after this frame
    SessionEnd {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    /// Event type as the wire tag string, used for SSE event names and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::Connected { .. } => "connected",
            FeedEvent::Snapshot { .. } => "snapshot",
            FeedEvent::StudentJoin { .. } => "student_join",
            FeedEvent::ProgressUpdate { .. } => "progress_update",
            FeedEvent::SessionEnd { .. } => "session_end",
        }
    }

    /// Session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            FeedEvent::Connected { session_id, .. }
            | FeedEvent::Snapshot { session_id, .. }
            | FeedEvent::StudentJoin { session_id, .. }
            | FeedEvent::ProgressUpdate { session_id, .. }
            | FeedEvent::SessionEnd { session_id, .. } => session_id,
        }
    }
}

/// Per-session fan-out channel
///
/// Wraps `tokio::broadcast`, which gives each subscriber an independent
/// bounded queue: a slow dashboard lags and loses the oldest events instead
/// of back-pressuring ingestion, and dropping the receiver unsubscribes.
///
/// # Examples
///
/// ```
/// use readsync_common::events::{FeedEvent, SessionFeed};
///
/// let feed = SessionFeed::new(256);
/// let _rx = feed.subscribe();
///
/// feed.emit_lossy(FeedEvent::SessionEnd {
///     session_id: "demo".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
/// ```
#[derive(Clone)]
pub struct SessionFeed {
    tx: broadcast::Sender<FeedEvent>,
    capacity: usize,
}

impl SessionFeed {
    /// Create a feed with the given per-subscriber buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        let rx = self.tx.subscribe();
        debug!("feed subscriber added ({} active)", self.tx.receiver_count());
        rx
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FeedEvent,
    ) -> Result<usize, broadcast::error::SendError<FeedEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the zero-subscriber case
    ///
    /// Ingestion must succeed even when no dashboard is watching, so this is
    /// the variant the write path uses.
    pub fn emit_lossy(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured per-subscriber buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
