//! Session registry and per-session event log
//!
//! The registry is the only shared mutable state in the hub. Every session
//! owns its roster, its append-only log, and its fan-out feed; all three are
//! guarded by one `RwLock` so that for a given event the sequence assignment,
//! the roster update, and the publish happen as a unit (update-then-publish),
//! while different sessions proceed concurrently.
//!
//! The registry itself is an injected instance with an explicit lifecycle,
//! constructed in `main` (or a test) and carried in router state.

use chrono::{DateTime, Utc};
use readsync_common::api::{EventsPage, ProgressReport, SessionDetail, SessionSummary};
use readsync_common::config::Thresholds;
use readsync_common::events::{FeedEvent, SessionFeed};
use readsync_common::progress::{
    infer_status, progress_percent, ProgressEvent, SessionMeta, StudentState,
};
use readsync_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// One monitored reading session
///
/// Handlers reach sessions only through [`SessionRegistry::get`]; the session
/// is retained as a tombstone after [`Session::end`] so that late writers get
/// `SessionEnded` rather than `SessionNotFound` until the sweeper prunes it.
pub struct Session {
    pub session_id: String,
    pub classroom_id: String,
    /// Identifies the backing log partition for this session
    pub stream_id: Uuid,
    pub meta: SessionMeta,
    pub created_at: DateTime<Utc>,
    thresholds: Thresholds,
    feed: SessionFeed,
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    ended: bool,
    ended_at: Option<DateTime<Utc>>,
    /// Next log offset to assign; offsets start at 1
    next_sequence: u64,
    log: Vec<ProgressEvent>,
    roster: HashMap<String, StudentState>,
}

impl Session {
    fn new(
        session_id: String,
        classroom_id: String,
        meta: SessionMeta,
        thresholds: Thresholds,
        feed_capacity: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            classroom_id,
            stream_id: Uuid::new_v4(),
            meta,
            created_at: now,
            thresholds,
            feed: SessionFeed::new(feed_capacity),
            inner: RwLock::new(SessionInner {
                ended: false,
                ended_at: None,
                next_sequence: 1,
                log: Vec::new(),
                roster: HashMap::new(),
            }),
        }
    }

    /// Explicit join; generates a student id when the client did not send one
    ///
    /// Re-joining an existing student is idempotent: no event, state untouched.
    pub async fn join(
        &self,
        student_id: Option<String>,
        student_name: Option<String>,
        total_paragraphs: u32,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if total_paragraphs == 0 {
            return Err(Error::MalformedReport(
                "total_paragraphs must be at least 1".to_string(),
            ));
        }
        let mut inner = self.inner.write().await;
        if inner.ended {
            return Err(Error::SessionEnded(self.session_id.clone()));
        }
        let student_id = student_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.admit(&mut inner, &student_id, student_name, total_paragraphs, now);
        Ok(student_id)
    }

    /// Single roster-entry path, shared by explicit join and first report
    ///
    /// Must be called with the write lock held. Emits `student_join` exactly
    /// once per student; returns whether the student was new.
    fn admit(
        &self,
        inner: &mut SessionInner,
        student_id: &str,
        student_name: Option<String>,
        total_paragraphs: u32,
        now: DateTime<Utc>,
    ) -> bool {
        if inner.roster.contains_key(student_id) {
            return false;
        }
        let state = StudentState::new(student_id, student_name, total_paragraphs, now);
        inner.roster.insert(student_id.to_string(), state.clone());
        debug!(
            session_id = %self.session_id,
            student_id = %student_id,
            "student joined"
        );
        self.feed.emit_lossy(FeedEvent::StudentJoin {
            session_id: self.session_id.clone(),
            data: state,
            timestamp: now,
        });
        true
    }

    /// Ingest one progress report
    ///
    /// Validates, fills defaults, assigns the next sequence, appends to the
    /// log, merges into the materialized roster, and publishes, all under the
    /// session write lock. Zero subscribers is not an error. Returns the
    /// assigned sequence.
    pub async fn report(&self, report: ProgressReport, now: DateTime<Utc>) -> Result<u64> {
        if report.student_id.is_empty() {
            return Err(Error::MalformedReport(
                "student_id must not be empty".to_string(),
            ));
        }
        if report.total_paragraphs == 0 {
            return Err(Error::MalformedReport(
                "total_paragraphs must be at least 1".to_string(),
            ));
        }
        if report.current_paragraph >= report.total_paragraphs {
            return Err(Error::MalformedReport(format!(
                "current_paragraph {} out of range for {} paragraphs",
                report.current_paragraph, report.total_paragraphs
            )));
        }
        if let Some(progress) = report.progress {
            if progress > 100 {
                return Err(Error::MalformedReport(format!(
                    "progress {} exceeds 100",
                    progress
                )));
            }
        }

        let mut inner = self.inner.write().await;
        if inner.ended {
            return Err(Error::SessionEnded(self.session_id.clone()));
        }

        // Implicit join before the event itself so a dashboard always sees
        // the roster row before progress for it
        self.admit(&mut inner, &report.student_id, None, report.total_paragraphs, now);

        let timestamp = report.timestamp.unwrap_or(now);
        let progress = report
            .progress
            .unwrap_or_else(|| progress_percent(report.current_paragraph, report.total_paragraphs));
        let status = match report.status {
            Some(status) => Some(status),
            None => {
                // A report that advances the paragraph means the student is
                // moving; otherwise measure silence from the roster state
                let since = match inner.roster.get(&report.student_id) {
                    Some(state) if report.current_paragraph <= state.current_paragraph => {
                        timestamp - state.last_paragraph_change_at
                    }
                    _ => chrono::Duration::zero(),
                };
                Some(infer_status(
                    report.current_paragraph,
                    report.total_paragraphs,
                    since,
                    &self.thresholds,
                ))
            }
        };

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let event = ProgressEvent {
            session_id: self.session_id.clone(),
            student_id: report.student_id.clone(),
            progress,
            current_paragraph: report.current_paragraph,
            total_paragraphs: report.total_paragraphs,
            status,
            timestamp,
            sequence,
        };

        inner.log.push(event.clone());
        if let Some(state) = inner.roster.get_mut(&report.student_id) {
            if !state.apply(&event) {
                debug!(
                    session_id = %self.session_id,
                    student_id = %event.student_id,
                    sequence,
                    "stale report appended but did not advance roster state"
                );
            }
        }

        self.feed.emit_lossy(FeedEvent::ProgressUpdate {
            session_id: self.session_id.clone(),
            data: event,
            timestamp: now,
        });
        Ok(sequence)
    }

    /// Open a live subscription
    ///
    /// The receiver is created and the roster cloned under the same lock, so
    /// the snapshot and the live stream can neither miss nor double-count an
    /// event published around the subscribe. Ended sessions refuse new
    /// subscribers.
    pub async fn subscribe(&self) -> Result<(Vec<StudentState>, broadcast::Receiver<FeedEvent>)> {
        let inner = self.inner.read().await;
        if inner.ended {
            return Err(Error::SessionEnded(self.session_id.clone()));
        }
        let rx = self.feed.subscribe();
        let mut students: Vec<StudentState> = inner.roster.values().cloned().collect();
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok((students, rx))
    }

    /// Terminate the session
    ///
    /// Marks it terminal, publishes `session_end` to every subscriber, and
    /// leaves the tombstone for the retention sweeper. Ending twice returns
    /// `SessionEnded`.
    pub async fn end(&self, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.ended {
            return Err(Error::SessionEnded(self.session_id.clone()));
        }
        inner.ended = true;
        inner.ended_at = Some(now);
        info!(
            session_id = %self.session_id,
            students = inner.roster.len(),
            subscribers = self.feed.subscriber_count(),
            "session ended"
        );
        self.feed.emit_lossy(FeedEvent::SessionEnd {
            session_id: self.session_id.clone(),
            timestamp: now,
        });
        Ok(())
    }

    /// Point-in-time read of metadata plus the full roster
    pub async fn detail(&self) -> SessionDetail {
        let inner = self.inner.read().await;
        let mut students: Vec<StudentState> = inner.roster.values().cloned().collect();
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        SessionDetail {
            session_id: self.session_id.clone(),
            classroom_id: self.classroom_id.clone(),
            stream_id: self.stream_id,
            meta: self.meta.clone(),
            created_at: self.created_at,
            ended: inner.ended,
            students,
        }
    }

    /// Point-in-time summary for listings
    pub async fn summary(&self) -> SessionSummary {
        let inner = self.inner.read().await;
        SessionSummary {
            session_id: self.session_id.clone(),
            classroom_id: self.classroom_id.clone(),
            stream_id: self.stream_id,
            created_at: self.created_at,
            ended: inner.ended,
            student_count: inner.roster.len(),
        }
    }

    /// Log entries with `sequence > after`, at most `limit` of them
    pub async fn events_after(&self, after: u64, limit: usize) -> EventsPage {
        let inner = self.inner.read().await;
        let events: Vec<ProgressEvent> = inner
            .log
            .iter()
            .filter(|e| e.sequence > after)
            .take(limit)
            .cloned()
            .collect();
        let last_sequence = events.last().map(|e| e.sequence).unwrap_or(after);
        EventsPage {
            events,
            last_sequence,
        }
    }

    async fn ended_before(&self, cutoff: DateTime<Utc>) -> bool {
        let inner = self.inner.read().await;
        matches!(inner.ended_at, Some(at) if at <= cutoff)
    }

    /// Live subscriber count on this session's feed
    pub fn subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }
}

/// Directory of sessions, keyed by session id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    thresholds: Thresholds,
    feed_capacity: usize,
}

impl SessionRegistry {
    pub fn new(thresholds: Thresholds, feed_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            thresholds,
            feed_capacity,
        }
    }

    /// Create a session; generates an id when the teacher did not pick one
    ///
    /// Fails with `AlreadyExists` when the id is taken, including by an
    /// ended-but-retained session.
    pub async fn create(
        &self,
        session_id: Option<String>,
        classroom_id: String,
        meta: SessionMeta,
        now: DateTime<Utc>,
    ) -> Result<Arc<Session>> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(Error::AlreadyExists(session_id));
        }
        let session = Arc::new(Session::new(
            session_id.clone(),
            classroom_id,
            meta,
            self.thresholds,
            self.feed_capacity,
            now,
        ));
        info!(
            session_id = %session_id,
            stream_id = %session.stream_id,
            "session created"
        );
        sessions.insert(session_id, Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Race-tolerant listing; summaries are read per session after the map
    /// lock is released
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(session.summary().await);
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub async fn end_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        let session = self.get(session_id).await?;
        session.end(now).await
    }

    /// Prune sessions that ended at or before `now - retention`
    ///
    /// Returns the number removed.
    pub async fn sweep(&self, retention: chrono::Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let candidates: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();
        let mut expired = Vec::new();
        for session in candidates {
            if session.ended_before(cutoff).await {
                expired.push(session.session_id.clone());
            }
        }
        if expired.is_empty() {
            return 0;
        }
        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for session_id in expired {
            if sessions.remove(&session_id).is_some() {
                debug!(session_id = %session_id, "pruned ended session");
                removed += 1;
            }
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// End every live session and drop the directory; used on graceful
    /// shutdown so subscribed dashboards see `session_end` instead of a bare
    /// disconnect
    pub async fn shutdown(&self, now: DateTime<Utc>) {
        let sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();
        let mut ended = 0;
        for session in &sessions {
            if session.end(now).await.is_ok() {
                ended += 1;
            }
        }
        self.sessions.write().await.clear();
        info!(sessions = sessions.len(), ended, "registry shut down");
    }
}
