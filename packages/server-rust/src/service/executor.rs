//! Work performed for each dispatched operation.
//!
//! [`OperationExecutor`] is the extension point where business logic runs.
//! The shipped [`SimulatedExecutor`] only waits for a configured duration.

use std::time::Duration;

use async_trait::async_trait;
use opgate_core::Operation;
use tracing::debug;

/// Executes the body of one operation.
///
/// Returning an error, or panicking, marks the operation `Failed`.
#[async_trait]
pub trait OperationExecutor: Send + Sync + 'static {
    async fn execute(&self, op: &Operation) -> anyhow::Result<()>;
}

/// Stand-in workload that sleeps for a fixed duration and succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    duration: Duration,
}

impl SimulatedExecutor {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl OperationExecutor for SimulatedExecutor {
    async fn execute(&self, op: &Operation) -> anyhow::Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = self.duration.as_millis() as u64;
        debug!(id = %op.id, kind = %op.kind, duration_ms, "simulating work");
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}
