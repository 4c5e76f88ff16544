//! Scheduler timing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing knobs for task managers and the identities/enrichment gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed sleep at the top of every manager cycle, in milliseconds.
    /// Keeps the stop signal observable even when the cadence is zero.
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retry interval while waiting on the identities/enrichment gate
    #[serde(rename = "gate-poll-interval-ms", default = "default_gate_poll_interval_ms")]
    pub gate_poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_gate_poll_interval_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            gate_poll_interval_ms: 1000,
        }
    }
}

impl SchedulerConfig {
    /// Get the manager poll interval as a Duration (never zero)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// How long a batch round waits before setting the stop signal.
    ///
    /// Half the poll interval: every manager has passed its stop check and is
    /// still inside its first poll sleep when the signal lands, so each runs
    /// exactly one cycle.
    pub fn batch_barrier(&self) -> Duration {
        self.poll_interval() / 2
    }

    /// Get the gate poll interval as a Duration (never zero)
    pub fn gate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gate_poll_interval_ms.max(1))
    }
}
