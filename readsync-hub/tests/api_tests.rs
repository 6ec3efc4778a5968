//! Integration tests for readsync-hub API endpoints
//!
//! Tests cover:
//! - Session lifecycle (create, list, detail, end)
//! - Student admission (explicit join, implicit via progress)
//! - Progress ingestion and sequence acknowledgement
//! - Event log cursor reads
//! - SSE feed subscription (connected, snapshot, live events, session_end)
//! - Error mapping (404 / 410 / 400 / 409)

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

use readsync_hub::config::HubConfig;
use readsync_hub::{build_router, AppState};

/// Test helper: Create app with default configuration
fn setup_app() -> axum::Router {
    let config = HubConfig::default();
    build_router(AppState::from_config(&config))
}

/// Test helper: Create GET request
fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Create POST request with JSON body
fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Send one request through a clone of the app
async fn send(app: &axum::Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: Create a session with a fixed id
async fn create_session(app: &axum::Router, session_id: &str) {
    let response = send(
        app,
        post_json(
            "/api/session",
            json!({
                "session_id": session_id,
                "classroom_id": "class-7b",
                "teacher_id": "teacher-1",
                "story_id": "story-42",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

/// Test helper: Join a student with a fixed id and paragraph count
async fn join_student(app: &axum::Router, session_id: &str, student_id: &str, total: u32) {
    let response = send(
        app,
        post_json(
            &format!("/api/session/{}/join", session_id),
            json!({
                "student_id": student_id,
                "student_name": student_id,
                "total_paragraphs": total,
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test helper: Post one progress report, return the response
async fn post_progress(
    app: &axum::Router,
    session_id: &str,
    student_id: &str,
    paragraph: u32,
    total: u32,
) -> Response {
    send(
        app,
        post_json(
            &format!("/api/session/{}/progress", session_id),
            json!({
                "student_id": student_id,
                "current_paragraph": paragraph,
                "total_paragraphs": total,
            }),
        ),
    )
    .await
}

// =============================================================================
// Health Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app();

    let response = send(&app, get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "readsync-hub");
    assert!(body["version"].is_string());
}

// =============================================================================
// Session Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_create_session_returns_stream_id() {
    let app = setup_app();

    let response = send(
        &app,
        post_json(
            "/api/session",
            json!({
                "session_id": "sess-1",
                "classroom_id": "class-7b",
                "teacher_id": "teacher-1",
                "story_id": "story-42",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["session_id"], "sess-1");
    // Stream id is a server-generated UUID
    let stream_id = body["stream_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(stream_id).is_ok());
}

#[tokio::test]
async fn test_create_session_generates_id_when_omitted() {
    let app = setup_app();

    let response = send(
        &app,
        post_json(
            "/api/session",
            json!({
                "classroom_id": "class-7b",
                "teacher_id": "teacher-1",
                "story_id": "story-42",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    let session_id = body["session_id"].as_str().unwrap();
    assert!(!session_id.is_empty());
}

#[tokio::test]
async fn test_create_duplicate_session_conflict() {
    let app = setup_app();
    create_session(&app, "sess-dup").await;

    let response = send(
        &app,
        post_json(
            "/api/session",
            json!({
                "session_id": "sess-dup",
                "classroom_id": "class-7b",
                "teacher_id": "teacher-1",
                "story_id": "story-42",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("sess-dup"));
}

#[tokio::test]
async fn test_list_sessions() {
    let app = setup_app();
    create_session(&app, "sess-a").await;
    create_session(&app, "sess-b").await;

    let response = send(&app, get_request("/api/sessions")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["ended"], false);
}

#[tokio::test]
async fn test_session_detail_includes_roster() {
    let app = setup_app();
    create_session(&app, "sess-detail").await;
    join_student(&app, "sess-detail", "alice", 14).await;
    join_student(&app, "sess-detail", "bob", 14).await;

    let response = post_progress(&app, "sess-detail", "alice", 6, 14).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_request("/api/session/sess-detail")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["session_id"], "sess-detail");
    assert_eq!(body["ended"], false);
    assert_eq!(body["meta"]["story_id"], "story-42");

    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 2);
    // Roster is sorted by student id
    assert_eq!(students[0]["student_id"], "alice");
    assert_eq!(students[0]["progress"], 50);
    assert_eq!(students[1]["student_id"], "bob");
    assert_eq!(students[1]["progress"], 0);
}

#[tokio::test]
async fn test_get_unknown_session_not_found() {
    let app = setup_app();

    let response = send(&app, get_request("/api/session/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

// =============================================================================
// Student Admission Tests
// =============================================================================

#[tokio::test]
async fn test_join_assigns_student_id_when_omitted() {
    let app = setup_app();
    create_session(&app, "sess-join").await;

    let response = send(
        &app,
        post_json(
            "/api/session/sess-join/join",
            json!({"total_paragraphs": 14}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["session_id"], "sess-join");
    assert!(!body["student_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_join_echoes_given_student_id() {
    let app = setup_app();
    create_session(&app, "sess-join2").await;

    let response = send(
        &app,
        post_json(
            "/api/session/sess-join2/join",
            json!({"student_id": "alice", "total_paragraphs": 14}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["student_id"], "alice");
}

#[tokio::test]
async fn test_join_unknown_session_not_found() {
    let app = setup_app();

    let response = send(
        &app,
        post_json(
            "/api/session/missing/join",
            json!({"total_paragraphs": 14}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_join_zero_paragraphs_rejected() {
    let app = setup_app();
    create_session(&app, "sess-zero").await;

    let response = send(
        &app,
        post_json(
            "/api/session/sess-zero/join",
            json!({"student_id": "alice", "total_paragraphs": 0}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Progress Ingestion Tests
// =============================================================================

#[tokio::test]
async fn test_progress_acks_with_sequence() {
    let app = setup_app();
    create_session(&app, "sess-seq").await;

    let response = post_progress(&app, "sess-seq", "alice", 1, 14).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["sequence"], 1);

    let response = post_progress(&app, "sess-seq", "alice", 2, 14).await;
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["sequence"], 2);
}

#[tokio::test]
async fn test_progress_implicitly_admits_student() {
    let app = setup_app();
    create_session(&app, "sess-implicit").await;

    // No join call before this report
    let response = post_progress(&app, "sess-implicit", "carol", 3, 14).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_request("/api/session/sess-implicit")).await;
    let body = extract_json(response.into_body()).await;
    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["student_id"], "carol");
}

#[tokio::test]
async fn test_progress_paragraph_out_of_range_rejected() {
    let app = setup_app();
    create_session(&app, "sess-range").await;

    // Paragraph index is zero-based, 14 is out of range for a 14-paragraph story
    let response = post_progress(&app, "sess-range", "alice", 14, 14).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("paragraph"));
}

#[tokio::test]
async fn test_progress_empty_student_id_rejected() {
    let app = setup_app();
    create_session(&app, "sess-empty").await;

    let response = post_progress(&app, "sess-empty", "", 1, 14).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_progress_unknown_session_not_found() {
    let app = setup_app();

    let response = post_progress(&app, "missing", "alice", 1, 14).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Event Log Cursor Tests
// =============================================================================

#[tokio::test]
async fn test_events_cursor_read() {
    let app = setup_app();
    create_session(&app, "sess-events").await;

    for paragraph in 1..=3 {
        let response = post_progress(&app, "sess-events", "alice", paragraph, 14).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, get_request("/api/session/sess-events/events?after=1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["sequence"], 2);
    assert_eq!(events[1]["sequence"], 3);
    assert_eq!(body["last_sequence"], 3);
}

#[tokio::test]
async fn test_events_cursor_past_end_is_empty() {
    let app = setup_app();
    create_session(&app, "sess-events2").await;
    let response = post_progress(&app, "sess-events2", "alice", 1, 14).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_request("/api/session/sess-events2/events?after=9")).await;
    let body = extract_json(response.into_body()).await;
    assert!(body["events"].as_array().unwrap().is_empty());
    assert_eq!(body["last_sequence"], 9);
}

// =============================================================================
// Session End Tests
// =============================================================================

#[tokio::test]
async fn test_end_session_then_writes_rejected() {
    let app = setup_app();
    create_session(&app, "sess-end").await;
    join_student(&app, "sess-end", "alice", 14).await;

    let response = send(
        &app,
        post_json("/api/session/sess-end/end", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["ok"], true);

    // Writes are refused after end
    let response = post_progress(&app, "sess-end", "alice", 5, 14).await;
    assert_eq!(response.status(), StatusCode::GONE);

    let response = send(
        &app,
        post_json("/api/session/sess-end/join", json!({"total_paragraphs": 14})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::GONE);

    // Ending twice is also refused
    let response = send(
        &app,
        post_json("/api/session/sess-end/end", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::GONE);

    // Reads still work on the tombstone
    let response = send(&app, get_request("/api/session/sess-end")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["ended"], true);
}

// =============================================================================
// SSE Feed Tests
// =============================================================================

#[tokio::test]
async fn test_subscribe_unknown_session_not_found() {
    let app = setup_app();

    let response = send(&app, get_request("/api/subscribe/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscribe_ended_session_gone() {
    let app = setup_app();
    create_session(&app, "sess-gone").await;
    let response = send(
        &app,
        post_json("/api/session/sess-gone/end", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_request("/api/subscribe/sess-gone")).await;
    assert_eq!(response.status(), StatusCode::GONE);
}

/// Read SSE frames from the body stream until `marker` appears
async fn read_until(
    stream: &mut (impl futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin),
    collected: &mut String,
    marker: &str,
) {
    while !collected.contains(marker) {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("Timed out waiting for SSE frame")
            .expect("SSE stream closed early")
            .expect("SSE stream errored");
        collected.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

#[tokio::test]
async fn test_subscribe_streams_snapshot_then_live_events() {
    let app = setup_app();
    create_session(&app, "sess-sse").await;
    join_student(&app, "sess-sse", "alice", 14).await;

    let response = send(&app, get_request("/api/subscribe/sess-sse")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut stream = response.into_body().into_data_stream();
    let mut collected = String::new();

    // Prelude: connected greeting then roster snapshot
    read_until(&mut stream, &mut collected, "event: snapshot").await;
    assert!(collected.contains("event: connected"));
    assert!(collected.contains("alice"));

    // Live events published after the subscribe are delivered in order
    let ack = post_progress(&app, "sess-sse", "alice", 6, 14).await;
    assert_eq!(ack.status(), StatusCode::OK);
    read_until(&mut stream, &mut collected, "event: progress_update").await;
    assert!(collected.contains("\"current_paragraph\":6"));

    // session_end is the final frame, then the stream closes
    let response = send(
        &app,
        post_json("/api/session/sess-sse/end", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    read_until(&mut stream, &mut collected, "event: session_end").await;

    let tail = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("Timed out waiting for stream close");
    assert!(tail.is_none());
}

#[tokio::test]
async fn test_two_subscribers_both_receive_session_end() {
    let app = setup_app();
    create_session(&app, "sess-two").await;
    join_student(&app, "sess-two", "alice", 14).await;

    let first = send(&app, get_request("/api/subscribe/sess-two")).await;
    let second = send(&app, get_request("/api/subscribe/sess-two")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    let mut stream_a = first.into_body().into_data_stream();
    let mut stream_b = second.into_body().into_data_stream();
    let mut collected_a = String::new();
    let mut collected_b = String::new();
    read_until(&mut stream_a, &mut collected_a, "event: snapshot").await;
    read_until(&mut stream_b, &mut collected_b, "event: snapshot").await;

    let response = send(
        &app,
        post_json("/api/session/sess-two/end", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    read_until(&mut stream_a, &mut collected_a, "event: session_end").await;
    read_until(&mut stream_b, &mut collected_b, "event: session_end").await;
}

#[tokio::test]
async fn test_registry_shutdown_closes_live_feeds() {
    let config = HubConfig::default();
    let state = AppState::from_config(&config);
    let registry = state.registry.clone();
    let app = build_router(state);

    create_session(&app, "sess-drain").await;
    join_student(&app, "sess-drain", "alice", 14).await;

    let response = send(&app, get_request("/api/subscribe/sess-drain")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut stream = response.into_body().into_data_stream();
    let mut collected = String::new();
    read_until(&mut stream, &mut collected, "event: snapshot").await;

    // Graceful shutdown drains open connections, so the shutdown path must
    // end every session while subscribers are still attached
    registry.shutdown(Utc::now()).await;

    read_until(&mut stream, &mut collected, "event: session_end").await;
    let tail = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("Timed out waiting for stream close");
    assert!(tail.is_none());
}
