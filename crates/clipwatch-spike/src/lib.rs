//! Per-channel chat-volume spike detector (spec.md §4.D).
//!
//! A keyed stream operator: each `channel_id` owns an independent
//! `PerChannelDetectorState`. Bucket eviction and cooldown use wall-clock
//! time rather than event time (spec.md §9) — replaying a backlog will not
//! reproduce the original anomalies, which is accepted for operational
//! simplicity.

mod clock;
mod detector;

pub use clock::{Clock, WallClock};
pub use detector::SpikeDetector;

pub const WINDOW_SIZE_SECONDS: i64 = 5;
pub const BASELINE_WINDOW_SECONDS: i64 = 300;
pub const STD_DEV_THRESHOLD: f64 = 1.0;
pub const COOLDOWN_SECONDS: i64 = 30;

/// Bot-command lines are dropped before keying (spec.md §4.D upstream filter).
pub fn is_command(text: &str) -> bool {
    detector::command_regex().is_match(text)
}
