//! Session lifecycle and progress ingestion handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use readsync_common::api::{
    CreateSessionRequest, CreateSessionResponse, EventsPage, JoinSessionRequest,
    JoinSessionResponse, OkResponse, ProgressAck, ProgressReport, SessionDetail,
    SessionListResponse,
};
use readsync_common::progress::SessionMeta;

use crate::api::error::ApiError;
use crate::AppState;

/// Largest number of log events returned per page
const MAX_EVENT_PAGE: usize = 500;

/// POST /api/session
///
/// Creates a session and its backing event stream. Returns 409 when the
/// requested id is already taken, including by a not-yet-swept tombstone.
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let meta = SessionMeta {
        teacher_id: req.teacher_id,
        story_id: req.story_id,
        mode: req.mode,
    };
    let session = state
        .registry
        .create(req.session_id, req.classroom_id, meta, Utc::now())
        .await?;
    info!(
        session_id = %session.session_id,
        classroom_id = %session.classroom_id,
        "session created"
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.session_id.clone(),
            stream_id: session.stream_id,
        }),
    ))
}

/// GET /api/sessions
///
/// Lists all registered sessions, ended tombstones included, oldest first.
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.registry.list().await;
    Json(SessionListResponse { sessions })
}

/// GET /api/session/:session_id
///
/// Session metadata plus the current roster. Readable after the session
/// ends, until the retention sweeper prunes it.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let session = state.registry.get(&session_id).await?;
    Ok(Json(session.detail().await))
}

/// POST /api/session/:session_id/join
///
/// Explicit roster admission. Generates a student id when the request
/// carries none; joining twice with the same id is a no-op.
pub async fn join_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<JoinSessionRequest>,
) -> Result<Json<JoinSessionResponse>, ApiError> {
    let session = state.registry.get(&session_id).await?;
    let student_id = session
        .join(req.student_id, req.student_name, req.total_paragraphs, Utc::now())
        .await?;
    Ok(Json(JoinSessionResponse {
        session_id,
        student_id,
    }))
}

/// POST /api/session/:session_id/progress
///
/// Appends one progress event to the session log and acknowledges with the
/// assigned sequence number. Unknown students are admitted implicitly.
pub async fn report_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(report): Json<ProgressReport>,
) -> Result<Json<ProgressAck>, ApiError> {
    let session = state.registry.get(&session_id).await?;
    let sequence = session.report(report, Utc::now()).await?;
    Ok(Json(ProgressAck { ok: true, sequence }))
}

/// POST /api/session/:session_id/end
///
/// Terminates the session. Subscribers receive `session_end`; further
/// writes are refused with 410. Ending twice also returns 410.
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state.registry.end_session(&session_id, Utc::now()).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Query parameters for the event log reader
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Cursor: return events with sequence strictly greater than this
    #[serde(default)]
    pub after: u64,
    /// Page size, capped at [`MAX_EVENT_PAGE`]
    pub limit: Option<usize>,
}

/// GET /api/session/:session_id/events?after=N
///
/// Cursor read of the append-only log, for operators and catch-up tooling.
pub async fn read_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsPage>, ApiError> {
    let session = state.registry.get(&session_id).await?;
    let limit = query.limit.unwrap_or(MAX_EVENT_PAGE).min(MAX_EVENT_PAGE);
    Ok(Json(session.events_after(query.after, limit).await))
}
