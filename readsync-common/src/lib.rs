//! # ReadSync Common Library
//!
//! Shared code for the ReadSync modules including:
//! - Progress data model (StudentState, ProgressEvent) and the monotonic merge rule
//! - Feed event types (FeedEvent enum) and the per-session broadcast feed
//! - API request/response types
//! - Threshold configuration
//! - Shared error taxonomy

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod progress;

pub use error::{Error, Result};
pub use progress::{ReadingStatus, StudentState};
