use std::collections::HashMap;
use std::sync::Arc;

use clipwatch_core::{AnomalyEvent, ChatLine, PerChannelDetectorState};
use regex::Regex;
use tracing::debug;

use crate::{Clock, WallClock, BASELINE_WINDOW_SECONDS, COOLDOWN_SECONDS, STD_DEV_THRESHOLD, WINDOW_SIZE_SECONDS};

pub(crate) fn command_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^![A-Za-z0-9]+").unwrap())
}

/// Owns every channel's `PerChannelDetectorState` and runs the anomaly rule
/// on each incoming line (spec.md §4.D).
pub struct SpikeDetector {
    clock: Arc<dyn Clock>,
    state: HashMap<u64, PerChannelDetectorState>,
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(Arc::new(WallClock))
    }
}

impl SpikeDetector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: HashMap::new(),
        }
    }

    /// Process one chat line, returning an anomaly if this line triggered one.
    /// Lines matching the bot-command filter never reach keyed state.
    pub fn process_line(&mut self, line: &ChatLine) -> Option<AnomalyEvent> {
        if command_regex().is_match(&line.text) {
            return None;
        }

        let now_ms = self.clock.now_ms();
        let now = now_ms / 1000;
        let bucket = line.timestamp_ms / 1000;

        let state = self.state.entry(line.channel_id).or_default();
        *state.bucket_counts.entry(bucket).or_insert(0) += 1;

        let evict_before = now - BASELINE_WINDOW_SECONDS;
        state.bucket_counts.retain(|&b, _| b >= evict_before);

        let baseline_start = now - BASELINE_WINDOW_SECONDS;
        let window_start = now - WINDOW_SIZE_SECONDS;

        let counts_baseline: Vec<f64> = state
            .bucket_counts
            .iter()
            .filter(|&(&b, _)| b >= baseline_start && b <= now)
            .map(|(_, &c)| c as f64)
            .collect();

        if (counts_baseline.len() as f64) < 0.8 * BASELINE_WINDOW_SECONDS as f64 {
            return None;
        }
        if counts_baseline.len() < 2 {
            return None;
        }

        let mean = counts_baseline.iter().sum::<f64>() / counts_baseline.len() as f64;
        let variance = counts_baseline
            .iter()
            .map(|c| (c - mean).powi(2))
            .sum::<f64>()
            / (counts_baseline.len() as f64 - 1.0);
        let std = variance.sqrt();

        if std == 0.0 {
            return None;
        }

        let window_sum: u64 = state
            .bucket_counts
            .iter()
            .filter(|&(&b, _)| b >= window_start && b <= now)
            .map(|(_, &c)| c as u64)
            .sum();

        let threshold = mean + STD_DEV_THRESHOLD * std;
        if window_sum as f64 <= threshold {
            return None;
        }

        if let Some(last) = state.last_anomaly_ms {
            if now_ms - last <= COOLDOWN_SECONDS * 1000 {
                return None;
            }
        }

        state.last_anomaly_ms = Some(now_ms);
        debug!(channel_id = line.channel_id, window_sum, mean, std, "chat spike detected");

        Some(AnomalyEvent {
            channel_id: line.channel_id,
            detected_at_ms: now_ms,
            message_count: window_sum,
            baseline_mean: mean,
            baseline_std: std,
        })
    }
}
