use std::time::Duration;

/// Configuration shared by the submission gateway and the dispatcher.
///
/// Controls the admission cap, the sync wait budget, simulated execution
/// time, and dispatcher polling. Millisecond fields mirror the environment
/// variables they are loaded from.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Admission cap on admitted-but-unfinished operations (`MAX_REQUESTS`).
    pub max_requests: u32,
    /// How long a sync submission waits for its result (`TIME_BEFORE_TIMEOUT`).
    pub sync_wait_budget_ms: u64,
    /// Duration of the simulated work per operation (`TIMEOUT_TIME`).
    pub execution_duration_ms: u64,
    /// Dispatcher sleep when both queues are empty (`DELAY_BEFORE_NEXT_CHECK`).
    pub idle_poll_interval_ms: u64,
    /// Upper bound on execution tasks one dispatcher runs at once.
    pub max_in_flight: usize,
    /// How long dispatcher shutdown waits for in-flight executions.
    pub drain_timeout_ms: u64,
}

impl ServiceConfig {
    /// Sync wait budget as a [`Duration`].
    #[must_use]
    pub fn sync_wait_budget(&self) -> Duration {
        Duration::from_millis(self.sync_wait_budget_ms)
    }

    /// Simulated execution time as a [`Duration`].
    #[must_use]
    pub fn execution_duration(&self) -> Duration {
        Duration::from_millis(self.execution_duration_ms)
    }

    /// Idle poll interval as a [`Duration`]. Never zero.
    #[must_use]
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms.max(1))
    }

    /// Dispatcher drain timeout as a [`Duration`].
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            sync_wait_budget_ms: 12_000,
            execution_duration_ms: 10_000,
            idle_poll_interval_ms: 100,
            max_in_flight: 64,
            drain_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.sync_wait_budget(), Duration::from_secs(12));
        assert_eq!(config.execution_duration(), Duration::from_secs(10));
        assert_eq!(config.idle_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.max_in_flight, 64);
    }

    #[test]
    fn zero_idle_interval_is_clamped() {
        let config = ServiceConfig {
            idle_poll_interval_ms: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(config.idle_poll_interval(), Duration::from_millis(1));
    }
}
