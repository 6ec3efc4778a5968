//! Progress data model and reconciliation rules
//!
//! Defines the per-student materialized state, the immutable log entry type,
//! and the derivation functions shared by the hub, the student tracker, and
//! the dashboard. The monotonic merge rule lives here so every consumer of
//! the event feed converges on the same state regardless of delivery order.

use crate::config::Thresholds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reading status of one student within a session
///
/// `Completed` is terminal: once a student reaches it, no further status
/// transitions are applied for that student in that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    /// Actively advancing through the passage
    Reading,
    /// No paragraph change for longer than the idle threshold
    Idle,
    /// No paragraph change for longer than the stuck threshold
    Stuck,
    /// Reached the final paragraph
    Completed,
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReadingStatus::Reading => "reading",
            ReadingStatus::Idle => "idle",
            ReadingStatus::Stuck => "stuck",
            ReadingStatus::Completed => "completed",
        };
        write!(f, "{}", label)
    }
}

/// Session metadata fixed at creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Teacher who opened the session
    pub teacher_id: String,
    /// Story being read
    pub story_id: String,
    /// Reading mode label (informational, not interpreted)
    pub mode: String,
}

/// Materialized state for one student in one session
///
/// Created on first report (implicit join) or explicit join, mutated only
/// through [`StudentState::apply`], never removed mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentState {
    pub student_id: String,
    /// Display name, if the client provided one at join
    pub student_name: Option<String>,
    /// Fraction of the passage covered, 0-100
    pub progress: u8,
    /// Zero-based index of the furthest paragraph seen
    pub current_paragraph: u32,
    /// Paragraph count fixed at join time
    pub total_paragraphs: u32,
    pub status: ReadingStatus,
    /// When any field last changed
    pub last_update_at: DateTime<Utc>,
    /// When `current_paragraph` last advanced; feeds idle/stuck inference
    pub last_paragraph_change_at: DateTime<Utc>,
}

impl StudentState {
    /// Initial state for a newly joined student
    pub fn new(
        student_id: impl Into<String>,
        student_name: Option<String>,
        total_paragraphs: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            student_name,
            progress: 0,
            current_paragraph: 0,
            total_paragraphs,
            status: ReadingStatus::Reading,
            last_update_at: now,
            last_paragraph_change_at: now,
        }
    }

    /// Monotonic merge of a progress event into this state
    ///
    /// The event is applied iff it strictly advances `progress` or
    /// `current_paragraph`; anything else is discarded as stale or duplicate
    /// delivery. On accept, both fields take the max of old and new (the
    /// event may advance one but trail on the other), `last_update_at` is
    /// refreshed, and `last_paragraph_change_at` is refreshed only when the
    /// paragraph actually advanced. A `Completed` status is never overwritten.
    ///
    /// Returns whether the event was applied.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        let advances = event.progress > self.progress
            || event.current_paragraph > self.current_paragraph;
        if !advances {
            return false;
        }

        let paragraph_advanced = event.current_paragraph > self.current_paragraph;
        self.progress = self.progress.max(event.progress);
        self.current_paragraph = self.current_paragraph.max(event.current_paragraph);
        self.last_update_at = event.timestamp;
        if paragraph_advanced {
            self.last_paragraph_change_at = event.timestamp;
        }

        if self.status != ReadingStatus::Completed {
            if let Some(status) = event.status {
                self.status = status;
            }
        }

        true
    }
}

/// One entry in a session's append-only log, immutable once appended
///
/// `sequence` is assigned at append time, strictly increasing from 1 within
/// a session, and is the authoritative ordering key. `timestamp` is
/// informational and feeds idle/stuck inference only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub student_id: String,
    pub progress: u8,
    pub current_paragraph: u32,
    pub total_paragraphs: u32,
    pub status: Option<ReadingStatus>,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

/// Progress percentage for a paragraph position
///
/// The numerator is 1-indexed so the first paragraph never reads as 0%.
pub fn progress_percent(current_paragraph: u32, total_paragraphs: u32) -> u8 {
    if total_paragraphs == 0 {
        return 0;
    }
    let pct = (current_paragraph as f64 + 1.0) / total_paragraphs as f64 * 100.0;
    pct.round().min(100.0) as u8
}

/// Status inference from position and time since the last paragraph change
///
/// Completion is checked first, then stuck, then idle, so the thresholds
/// never mask a finished student.
pub fn infer_status(
    current_paragraph: u32,
    total_paragraphs: u32,
    since_paragraph_change: chrono::Duration,
    thresholds: &Thresholds,
) -> ReadingStatus {
    if total_paragraphs > 0 && current_paragraph >= total_paragraphs - 1 {
        return ReadingStatus::Completed;
    }
    let elapsed_ms = since_paragraph_change.num_milliseconds();
    if elapsed_ms > thresholds.stuck_after_ms as i64 {
        ReadingStatus::Stuck
    } else if elapsed_ms > thresholds.idle_after_ms as i64 {
        ReadingStatus::Idle
    } else {
        ReadingStatus::Reading
    }
}
