//! HTTP API handlers for readsync-hub

pub mod error;
pub mod health;
pub mod sessions;
pub mod subscribe;

pub use error::ApiError;
pub use health::health_routes;
pub use sessions::{
    create_session, end_session, get_session, join_session, list_sessions, read_events,
    report_progress,
};
pub use subscribe::subscribe;
