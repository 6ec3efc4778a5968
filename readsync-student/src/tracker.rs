//! Pure tracking state machine
//!
//! Owns the furthest-seen paragraph pointer and derives progress reports
//! from it. No I/O and no clock reads here: every method takes `now`, so
//! tests drive time explicitly and the driver owns the timers.

use chrono::{DateTime, Utc};
use tracing::debug;

use readsync_common::api::ProgressReport;
use readsync_common::config::Thresholds;
use readsync_common::progress::{infer_status, progress_percent, ReadingStatus};
use readsync_common::{Error, Result};

/// Minimum fraction of a paragraph that must be in view to count as read
pub const MIN_VISIBLE_FRACTION: f32 = 0.5;

/// Tracker lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Tracking,
    Stopped,
}

/// Per-student tracking state
///
/// The paragraph pointer is forward-only: scrolling back up never moves
/// it, so reported progress is monotonic at the source.
#[derive(Debug)]
pub struct TrackerCore {
    session_id: String,
    student_id: String,
    total_paragraphs: u32,
    thresholds: Thresholds,
    phase: TrackerPhase,
    current_paragraph: u32,
    last_paragraph_change_at: DateTime<Utc>,
}

impl TrackerCore {
    /// Create a tracker in the idle phase
    ///
    /// Rejects empty ids and a zero paragraph count, the same conditions
    /// the hub would refuse.
    pub fn new(
        session_id: impl Into<String>,
        student_id: impl Into<String>,
        total_paragraphs: u32,
        thresholds: Thresholds,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let student_id = student_id.into();
        if session_id.is_empty() {
            return Err(Error::MalformedReport("session_id is required".to_string()));
        }
        if student_id.is_empty() {
            return Err(Error::MalformedReport("student_id is required".to_string()));
        }
        if total_paragraphs == 0 {
            return Err(Error::MalformedReport(
                "total_paragraphs must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            session_id,
            student_id,
            total_paragraphs,
            thresholds,
            phase: TrackerPhase::Idle,
            current_paragraph: 0,
            last_paragraph_change_at: now,
        })
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn current_paragraph(&self) -> u32 {
        self.current_paragraph
    }

    /// Transition idle -> tracking, resetting the paragraph-change timer
    ///
    /// Returns false when already tracking or stopped.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase != TrackerPhase::Idle {
            return false;
        }
        self.phase = TrackerPhase::Tracking;
        self.last_paragraph_change_at = now;
        true
    }

    /// Viewport callback: paragraph `index` is `visible_fraction` in view
    ///
    /// Produces a report only when a paragraph further along than the
    /// current pointer becomes at least half visible. Backward scrolls,
    /// barely-visible paragraphs, and out-of-range indices are ignored.
    pub fn observe_paragraph(
        &mut self,
        now: DateTime<Utc>,
        index: u32,
        visible_fraction: f32,
    ) -> Option<ProgressReport> {
        if self.phase != TrackerPhase::Tracking {
            return None;
        }
        if visible_fraction < MIN_VISIBLE_FRACTION {
            return None;
        }
        if index >= self.total_paragraphs {
            debug!(
                index,
                total = self.total_paragraphs,
                "ignoring out-of-range paragraph observation"
            );
            return None;
        }
        if index <= self.current_paragraph {
            return None;
        }
        self.current_paragraph = index;
        self.last_paragraph_change_at = now;
        Some(self.build_report(now, self.inferred_status(now)))
    }

    /// Periodic liveness report with the currently-known position
    pub fn heartbeat(&self, now: DateTime<Utc>) -> Option<ProgressReport> {
        if self.phase != TrackerPhase::Tracking {
            return None;
        }
        Some(self.build_report(now, self.inferred_status(now)))
    }

    /// Transition to stopped, emitting one final completed report
    ///
    /// Returns None when the tracker never started or already stopped.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Option<ProgressReport> {
        let was_tracking = self.phase == TrackerPhase::Tracking;
        self.phase = TrackerPhase::Stopped;
        if !was_tracking {
            return None;
        }
        Some(self.build_report(now, ReadingStatus::Completed))
    }

    fn inferred_status(&self, now: DateTime<Utc>) -> ReadingStatus {
        infer_status(
            self.current_paragraph,
            self.total_paragraphs,
            now - self.last_paragraph_change_at,
            &self.thresholds,
        )
    }

    fn build_report(&self, now: DateTime<Utc>, status: ReadingStatus) -> ProgressReport {
        ProgressReport {
            student_id: self.student_id.clone(),
            current_paragraph: self.current_paragraph,
            total_paragraphs: self.total_paragraphs,
            progress: Some(progress_percent(
                self.current_paragraph,
                self.total_paragraphs,
            )),
            status: Some(status),
            timestamp: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn tracking_core() -> TrackerCore {
        let mut core = TrackerCore::new("sess-1", "alice", 14, Thresholds::default(), t0())
            .expect("valid tracker");
        assert!(core.start(t0()));
        core
    }

    #[test]
    fn test_new_validates_inputs() {
        assert!(TrackerCore::new("", "alice", 14, Thresholds::default(), t0()).is_err());
        assert!(TrackerCore::new("sess-1", "", 14, Thresholds::default(), t0()).is_err());
        assert!(TrackerCore::new("sess-1", "alice", 0, Thresholds::default(), t0()).is_err());
        assert!(TrackerCore::new("sess-1", "alice", 14, Thresholds::default(), t0()).is_ok());
    }

    #[test]
    fn test_start_only_from_idle() {
        let mut core =
            TrackerCore::new("sess-1", "alice", 14, Thresholds::default(), t0()).unwrap();
        assert_eq!(core.phase(), TrackerPhase::Idle);
        assert!(core.start(t0()));
        assert_eq!(core.phase(), TrackerPhase::Tracking);
        assert!(!core.start(t0()));

        core.finalize(t0());
        assert_eq!(core.phase(), TrackerPhase::Stopped);
        assert!(!core.start(t0()));
    }

    #[test]
    fn test_observe_requires_half_visible() {
        let mut core = tracking_core();
        assert!(core.observe_paragraph(t0(), 3, 0.4).is_none());
        assert_eq!(core.current_paragraph(), 0);

        let report = core.observe_paragraph(t0(), 3, 0.5).expect("advance");
        assert_eq!(report.current_paragraph, 3);
        assert_eq!(core.current_paragraph(), 3);
    }

    #[test]
    fn test_observe_is_forward_only() {
        let mut core = tracking_core();
        assert!(core.observe_paragraph(t0(), 5, 1.0).is_some());

        // Scrolling back up must not regress the pointer
        assert!(core.observe_paragraph(t0(), 2, 1.0).is_none());
        // Re-seeing the same paragraph is not an advance
        assert!(core.observe_paragraph(t0(), 5, 1.0).is_none());
        assert_eq!(core.current_paragraph(), 5);
    }

    #[test]
    fn test_first_paragraph_is_not_an_advance() {
        // The pointer starts at 0, so paragraph 0 coming into view does
        // not trigger an immediate report; the heartbeat covers it.
        let mut core = tracking_core();
        assert!(core.observe_paragraph(t0(), 0, 1.0).is_none());
    }

    #[test]
    fn test_observe_out_of_range_ignored() {
        let mut core = tracking_core();
        assert!(core.observe_paragraph(t0(), 14, 1.0).is_none());
        assert_eq!(core.current_paragraph(), 0);
    }

    #[test]
    fn test_observe_before_start_ignored() {
        let mut core =
            TrackerCore::new("sess-1", "alice", 14, Thresholds::default(), t0()).unwrap();
        assert!(core.observe_paragraph(t0(), 3, 1.0).is_none());
    }

    #[test]
    fn test_advance_report_contents() {
        let mut core = tracking_core();
        let now = t0() + chrono::Duration::seconds(10);
        let report = core.observe_paragraph(now, 6, 1.0).expect("advance");
        assert_eq!(report.student_id, "alice");
        assert_eq!(report.current_paragraph, 6);
        assert_eq!(report.total_paragraphs, 14);
        assert_eq!(report.progress, Some(50));
        assert_eq!(report.status, Some(ReadingStatus::Reading));
        assert_eq!(report.timestamp, Some(now));
    }

    #[test]
    fn test_heartbeat_reports_current_position() {
        let mut core = tracking_core();
        core.observe_paragraph(t0(), 6, 1.0);

        let report = core.heartbeat(t0() + chrono::Duration::seconds(5)).expect("heartbeat");
        assert_eq!(report.current_paragraph, 6);
        assert_eq!(report.progress, Some(50));
        assert_eq!(report.status, Some(ReadingStatus::Reading));
    }

    #[test]
    fn test_heartbeat_status_drifts_idle_then_stuck() {
        let core = tracking_core();

        let report = core.heartbeat(t0() + chrono::Duration::seconds(35)).unwrap();
        assert_eq!(report.status, Some(ReadingStatus::Idle));

        let report = core.heartbeat(t0() + chrono::Duration::seconds(125)).unwrap();
        assert_eq!(report.status, Some(ReadingStatus::Stuck));
    }

    #[test]
    fn test_last_paragraph_completes() {
        let mut core = tracking_core();
        let report = core.observe_paragraph(t0(), 13, 1.0).expect("advance");
        assert_eq!(report.progress, Some(100));
        assert_eq!(report.status, Some(ReadingStatus::Completed));

        // Completed never drifts back to idle or stuck
        let report = core.heartbeat(t0() + chrono::Duration::seconds(300)).unwrap();
        assert_eq!(report.status, Some(ReadingStatus::Completed));
    }

    #[test]
    fn test_finalize_emits_completed_once() {
        let mut core = tracking_core();
        core.observe_paragraph(t0(), 6, 1.0);

        let now = t0() + chrono::Duration::seconds(60);
        let report = core.finalize(now).expect("final report");
        assert_eq!(report.current_paragraph, 6);
        assert_eq!(report.status, Some(ReadingStatus::Completed));
        assert_eq!(core.phase(), TrackerPhase::Stopped);

        assert!(core.finalize(now).is_none());
        assert!(core.heartbeat(now).is_none());
        assert!(core.observe_paragraph(now, 7, 1.0).is_none());
    }

    #[test]
    fn test_finalize_without_tracking_is_silent() {
        let mut core =
            TrackerCore::new("sess-1", "alice", 14, Thresholds::default(), t0()).unwrap();
        assert!(core.finalize(t0()).is_none());
        assert_eq!(core.phase(), TrackerPhase::Stopped);
    }
}
