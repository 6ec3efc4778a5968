//! readsync-hub library - Session Hub
//!
//! Owns the per-session append-only progress logs, admits students,
//! ingests their reports, and fans events out to dashboard subscribers
//! over SSE.

use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod config;
pub mod registry;

use config::HubConfig;
use registry::SessionRegistry;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Session registry holding every live session and tombstone
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// Create new application state
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// State backed by a fresh registry built from configuration
    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(Arc::new(SessionRegistry::new(
            config.thresholds,
            config.feed_capacity,
        )))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        // Session lifecycle
        .route("/api/session", post(api::create_session))
        .route("/api/sessions", get(api::list_sessions))
        .route("/api/session/:session_id", get(api::get_session))
        .route("/api/session/:session_id/end", post(api::end_session))

        // Student ingestion
        .route("/api/session/:session_id/join", post(api::join_session))
        .route("/api/session/:session_id/progress", post(api::report_progress))

        // Read side
        .route("/api/session/:session_id/events", get(api::read_events))
        .route("/api/subscribe/:session_id", get(api::subscribe))

        // Liveness
        .merge(api::health_routes())

        // Attach shared state
        .with_state(state)

        // Request tracing and CORS for local dashboards
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
