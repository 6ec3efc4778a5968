//! Dashboard roster reconciler
//!
//! Folds feed events into a local `student_id -> StudentState` map. The
//! monotonic merge gate makes the displayed roster resilient to
//! reordered and duplicated events: only strictly-advancing progress is
//! applied, everything else is discarded as stale.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use readsync_common::config::Thresholds;
use readsync_common::events::FeedEvent;
use readsync_common::progress::{infer_status, ProgressEvent, ReadingStatus, StudentState};

/// Where the watched session is in its lifecycle, as seen by this dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No feed frames received yet
    Connecting,
    /// Feed established, roster live
    Live,
    /// `session_end` received; the roster is frozen
    Ended,
}

/// Display-only aggregate statistics
///
/// Recomputed from the local roster; consistent with locally accepted
/// events, nothing stronger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterStats {
    pub total: usize,
    pub reading: usize,
    pub idle: usize,
    pub stuck: usize,
    pub completed: usize,
    pub mean_progress: u8,
}

/// Local roster state for one watched session
pub struct Reconciler {
    session_id: String,
    thresholds: Thresholds,
    phase: SessionPhase,
    roster: HashMap<String, StudentState>,
}

impl Reconciler {
    pub fn new(session_id: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            session_id: session_id.into(),
            thresholds,
            phase: SessionPhase::Connecting,
            roster: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Fold one feed event into the roster
    ///
    /// Returns true when the displayed state changed.
    pub fn apply(&mut self, event: &FeedEvent) -> bool {
        match event {
            FeedEvent::Connected { .. } => {
                if self.phase == SessionPhase::Connecting {
                    self.phase = SessionPhase::Live;
                    return true;
                }
                false
            }
            FeedEvent::Snapshot { data, .. } => {
                // Snapshot replaces the roster wholesale; this is also the
                // resync path after a reconnect
                self.roster = data
                    .iter()
                    .map(|state| (state.student_id.clone(), state.clone()))
                    .collect();
                if self.phase == SessionPhase::Connecting {
                    self.phase = SessionPhase::Live;
                }
                true
            }
            FeedEvent::StudentJoin { data, .. } => {
                // Idempotent: a join for a known student never overwrites
                // progress already displayed
                if self.roster.contains_key(&data.student_id) {
                    return false;
                }
                self.roster.insert(data.student_id.clone(), data.clone());
                true
            }
            FeedEvent::ProgressUpdate { data, .. } => self.apply_progress(data),
            FeedEvent::SessionEnd { .. } => {
                self.phase = SessionPhase::Ended;
                true
            }
        }
    }

    fn apply_progress(&mut self, event: &ProgressEvent) -> bool {
        match self.roster.get_mut(&event.student_id) {
            Some(state) => {
                let advanced = state.apply(event);
                if !advanced {
                    debug!(
                        student_id = %event.student_id,
                        sequence = event.sequence,
                        "discarding stale progress event"
                    );
                }
                advanced
            }
            None => {
                // Self-healing: a missed student_join is repaired from the
                // first progress event seen for that student
                let mut state = StudentState::new(
                    event.student_id.clone(),
                    None,
                    event.total_paragraphs,
                    event.timestamp,
                );
                state.apply(event);
                self.roster.insert(event.student_id.clone(), state);
                true
            }
        }
    }

    /// Roster rows in stable display order
    pub fn students(&self) -> Vec<&StudentState> {
        let mut students: Vec<&StudentState> = self.roster.values().collect();
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        students
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Status label to display right now
    ///
    /// Idle and stuck are labels derived at render time from the last
    /// paragraph change, so a silent student drifts without any event
    /// arriving. Completed is terminal and shown as reported.
    pub fn display_status(&self, state: &StudentState, now: DateTime<Utc>) -> ReadingStatus {
        if state.status == ReadingStatus::Completed {
            return ReadingStatus::Completed;
        }
        infer_status(
            state.current_paragraph,
            state.total_paragraphs,
            now - state.last_paragraph_change_at,
            &self.thresholds,
        )
    }

    /// Recompute aggregates from the roster
    pub fn stats(&self, now: DateTime<Utc>) -> RosterStats {
        let mut stats = RosterStats {
            total: self.roster.len(),
            reading: 0,
            idle: 0,
            stuck: 0,
            completed: 0,
            mean_progress: 0,
        };
        if stats.total == 0 {
            return stats;
        }
        let mut progress_sum: u64 = 0;
        for state in self.roster.values() {
            progress_sum += u64::from(state.progress);
            match self.display_status(state, now) {
                ReadingStatus::Reading => stats.reading += 1,
                ReadingStatus::Idle => stats.idle += 1,
                ReadingStatus::Stuck => stats.stuck += 1,
                ReadingStatus::Completed => stats.completed += 1,
            }
        }
        stats.mean_progress = (progress_sum / stats.total as u64) as u8;
        stats
    }
}
