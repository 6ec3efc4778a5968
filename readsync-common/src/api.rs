//! Shared API request/response types
//!
//! Wire types used by the hub handlers and by the client crates, so both
//! sides of every endpoint agree on field names and optionality.

use crate::progress::{ProgressEvent, ReadingStatus, SessionMeta, StudentState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// POST /api/session request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Session id; generated server-side when omitted
    pub session_id: Option<String>,
    pub classroom_id: String,
    pub teacher_id: String,
    pub story_id: String,
    /// Reading mode label
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "guided".to_string()
}

/// POST /api/session response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    /// Backing event-log partition for this session
    pub stream_id: Uuid,
}

/// POST /api/session/:session_id/join request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    /// Student id; generated server-side when omitted
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    /// Paragraph count, fixed for this student for the session lifetime
    pub total_paragraphs: u32,
}

/// POST /api/session/:session_id/join response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionResponse {
    pub session_id: String,
    pub student_id: String,
}

/// POST /api/session/:session_id/progress request body
///
/// `progress`, `status` and `timestamp` are optional; the hub derives the
/// first from the paragraph position, infers the second, and stamps the
/// third with receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub student_id: String,
    pub current_paragraph: u32,
    pub total_paragraphs: u32,
    pub progress: Option<u8>,
    pub status: Option<ReadingStatus>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// POST /api/session/:session_id/progress response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressAck {
    pub ok: bool,
    /// Log offset assigned to the appended event
    pub sequence: u64,
}

/// Generic acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// One entry in GET /api/sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub classroom_id: String,
    pub stream_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub ended: bool,
    pub student_count: usize,
}

/// GET /api/sessions response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// GET /api/session/:session_id response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session_id: String,
    pub classroom_id: String,
    pub stream_id: Uuid,
    pub meta: SessionMeta,
    pub created_at: DateTime<Utc>,
    pub ended: bool,
    pub students: Vec<StudentState>,
}

/// GET /api/session/:session_id/events response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsPage {
    /// Events with `sequence` greater than the requested cursor
    pub events: Vec<ProgressEvent>,
    /// Highest sequence in this page, or the request cursor when empty
    pub last_sequence: u64,
}

/// Error body returned by every failing hub endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
