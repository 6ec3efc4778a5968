//! readsync-dash library - Teacher Dashboard
//!
//! Subscribes to one session's feed on the hub, reconciles events into a
//! local roster with the monotonic merge gate, and renders it for the
//! teacher. Reconnects resync from the snapshot rather than replaying
//! missed events.

pub mod feed;
pub mod reconciler;

pub use feed::{FeedClient, FeedUpdate, SseFrame, SseParser};
pub use reconciler::{Reconciler, RosterStats, SessionPhase};
