//! Async tracking driver
//!
//! Couples the pure [`TrackerCore`] to a [`ProgressSink`]: joins the
//! session, runs the heartbeat timer, forwards viewport observations,
//! and sends the final completed report on stop. Switching sessions
//! retires the previous epoch so in-flight callbacks from the old
//! session cannot write through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use readsync_common::api::JoinSessionRequest;
use readsync_common::config::{Thresholds, DEFAULT_HEARTBEAT_MS};
use readsync_common::Result;

use crate::sink::ProgressSink;
use crate::tracker::TrackerCore;

/// One attached session
struct ActiveSession {
    session_id: String,
    epoch: u64,
    core: Arc<Mutex<TrackerCore>>,
    heartbeat: JoinHandle<()>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

/// Tracking driver for one student
///
/// At most one session is attached at a time. Starting a new session
/// fully leaves the previous one (final report, heartbeat cancelled)
/// before joining.
pub struct Tracker<S: ProgressSink + 'static> {
    sink: Arc<S>,
    thresholds: Thresholds,
    heartbeat_interval: Duration,
    /// Bumped on every attach and detach; stale epochs are discarded
    epoch: Arc<AtomicU64>,
    active: Mutex<Option<ActiveSession>>,
}

impl<S: ProgressSink + 'static> Tracker<S> {
    pub fn new(sink: S, thresholds: Thresholds, heartbeat_interval: Duration) -> Self {
        Self {
            sink: Arc::new(sink),
            thresholds,
            heartbeat_interval,
            epoch: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Tracker with default thresholds and heartbeat cadence
    pub fn with_defaults(sink: S) -> Self {
        Self::new(
            sink,
            Thresholds::default(),
            Duration::from_millis(DEFAULT_HEARTBEAT_MS),
        )
    }

    /// Join a session and begin tracking
    ///
    /// Returns the hub-assigned student id. Any previously attached
    /// session is left first.
    pub async fn start(
        &self,
        session_id: &str,
        student_name: Option<String>,
        total_paragraphs: u32,
    ) -> Result<String> {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let joined = self
            .sink
            .join(
                session_id,
                JoinSessionRequest {
                    student_id: None,
                    student_name,
                    total_paragraphs,
                },
            )
            .await?;

        let now = Utc::now();
        let mut core = TrackerCore::new(
            session_id,
            joined.student_id.clone(),
            total_paragraphs,
            self.thresholds,
            now,
        )?;
        core.start(now);
        let core = Arc::new(Mutex::new(core));

        let heartbeat = tokio::spawn(heartbeat_loop(
            self.sink.clone(),
            core.clone(),
            self.epoch.clone(),
            epoch,
            self.heartbeat_interval,
            session_id.to_string(),
        ));

        *active = Some(ActiveSession {
            session_id: session_id.to_string(),
            epoch,
            core,
            heartbeat,
        });

        info!(
            session_id = %session_id,
            student_id = %joined.student_id,
            "tracking started"
        );
        Ok(joined.student_id)
    }

    /// Viewport callback: paragraph `index` is `visible_fraction` in view
    ///
    /// Returns the acked log sequence when the observation advanced the
    /// pointer and the report was delivered. Delivery failures are logged
    /// and swallowed; the heartbeat keeps running.
    pub async fn observe_paragraph(&self, index: u32, visible_fraction: f32) -> Option<u64> {
        let (session_id, epoch, report) = {
            let active = self.active.lock().await;
            let session = active.as_ref()?;
            let report = session
                .core
                .lock()
                .await
                .observe_paragraph(Utc::now(), index, visible_fraction)?;
            (session.session_id.clone(), session.epoch, report)
        };

        match self.sink.report(&session_id, report).await {
            Ok(ack) => {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    // A session switch happened while this report was in
                    // flight; the ack belongs to the old session
                    debug!(session_id = %session_id, "discarding stale ack");
                    return None;
                }
                debug!(
                    session_id = %session_id,
                    sequence = ack.sequence,
                    "progress acked"
                );
                Some(ack.sequence)
            }
            Err(e) => {
                warn!(session_id = %session_id, "progress delivery failed: {}", e);
                None
            }
        }
    }

    /// Leave the attached session, sending one final completed report
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;
    }

    /// Currently attached session id, if any
    pub async fn session_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| s.session_id.clone())
    }

    async fn stop_locked(&self, active: &mut Option<ActiveSession>) {
        let session = match active.take() {
            Some(session) => session,
            None => return,
        };

        // Retire the epoch first so in-flight callbacks are discarded
        self.epoch.fetch_add(1, Ordering::SeqCst);
        session.heartbeat.abort();

        let report = session.core.lock().await.finalize(Utc::now());
        if let Some(report) = report {
            if let Err(e) = self.sink.report(&session.session_id, report).await {
                warn!(
                    session_id = %session.session_id,
                    "final report delivery failed: {}", e
                );
            }
        }
        info!(session_id = %session.session_id, "tracking stopped");
    }
}

/// Periodic liveness reports until the epoch is retired
async fn heartbeat_loop<S: ProgressSink>(
    sink: Arc<S>,
    core: Arc<Mutex<TrackerCore>>,
    current_epoch: Arc<AtomicU64>,
    epoch: u64,
    interval: Duration,
    session_id: String,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately, skip it
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if current_epoch.load(Ordering::SeqCst) != epoch {
            break;
        }
        // Bind before the match so the core lock is released during
        // delivery; a match on the guard expression would hold it across
        // the await and stall observations
        let report = core.lock().await.heartbeat(Utc::now());
        match report {
            Some(report) => {
                if let Err(e) = sink.report(&session_id, report).await {
                    warn!(session_id = %session_id, "heartbeat delivery failed: {}", e);
                }
            }
            None => break,
        }
    }
}
