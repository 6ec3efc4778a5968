//! readsync-student library - Client Progress Tracker
//!
//! Tracks a student's position through a story and reports it to the
//! Session Hub: an immediate report on every paragraph advance, a
//! heartbeat report on a fixed interval, and a final completed report
//! on stop.

pub mod driver;
pub mod sink;
pub mod tracker;

pub use driver::Tracker;
pub use sink::{HubClient, ProgressSink};
pub use tracker::{TrackerCore, TrackerPhase};
