//! Shared timing and capacity defaults
//!
//! The thresholds live here because the hub, the student tracker, and the
//! dashboard must agree on them for the derived status labels to match.

use serde::{Deserialize, Serialize};

/// Default heartbeat period for student trackers (milliseconds)
pub const DEFAULT_HEARTBEAT_MS: u64 = 5_000;

/// Default per-session feed channel capacity (events buffered per subscriber)
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Idle/stuck inference thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// No paragraph change for longer than this reads as idle (milliseconds)
    #[serde(default = "default_idle_after_ms")]
    pub idle_after_ms: u64,

    /// No paragraph change for longer than this reads as stuck (milliseconds)
    #[serde(default = "default_stuck_after_ms")]
    pub stuck_after_ms: u64,
}

fn default_idle_after_ms() -> u64 {
    30_000
}

fn default_stuck_after_ms() -> u64 {
    120_000
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            idle_after_ms: default_idle_after_ms(),
            stuck_after_ms: default_stuck_after_ms(),
        }
    }
}
