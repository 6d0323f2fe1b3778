//! Reservation defaults shared by every limiter built from a config

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long callers wait for capacity when they do not say otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConfig {
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64, // 0 = do not wait
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: default_wait_ms(),
        }
    }
}

impl ReservationConfig {
    /// Default wait as a duration, `None` when waiting is disabled
    #[must_use]
    pub fn default_wait(&self) -> Option<Duration> {
        (self.default_wait_ms > 0).then(|| Duration::from_millis(self.default_wait_ms))
    }
}

fn default_wait_ms() -> u64 {
    0
}
