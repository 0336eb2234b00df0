use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling cadence for `AsyncJob::wait`.
///
/// The delay starts at `poll_interval_ms` and doubles after every
/// pending answer, capped at `max_poll_interval_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "d_100")]
    pub poll_interval_ms: u64,
    #[serde(default = "d_2000")]
    pub max_poll_interval_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_poll_interval_ms: 2000,
        }
    }
}

impl JobConfig {
    /// Delay before poll number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.poll_interval_ms.max(1);
        let cap = self.max_poll_interval_ms.max(base);
        let delay = base.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(delay.min(cap))
    }
}

fn d_100() -> u64 {
    100
}
fn d_2000() -> u64 {
    2000
}
