//! Submission gateway: validation, admission, enqueue, and the sync wait.
//!
//! Every submission goes through one atomic [`SharedStore::try_admit`] call
//! that checks uniqueness and the admission cap, records the `Pending` status,
//! and takes a counter slot. The record is then enqueued for the dispatcher.
//! Sync submissions additionally wait on the result channel until a terminal
//! marker arrives or the wait budget runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opgate_core::{keys, Operation, OperationKind, OperationStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::ServiceConfig;
use super::counter::ActiveRequestCounter;
use super::dispatcher::DispatchTask;
use super::operation::OperationError;
use super::queues::{OperationQueues, QueueDepths};
use super::result_channel::ResultChannel;
use super::status::StatusStore;
use crate::traits::{AdmissionOutcome, SharedStore};

/// Terminal outcome of a sync submission that finished within its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub id: String,
    pub status: OperationStatus,
}

/// Acknowledgement of an accepted async submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncAccepted {
    pub id: String,
}

/// Point-in-time view of the shared state, reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewaySnapshot {
    pub active_requests: i64,
    pub queues: QueueDepths,
}

#[derive(Clone)]
pub struct SubmissionGateway {
    store: Arc<dyn SharedStore>,
    status: StatusStore,
    queues: OperationQueues,
    results: ResultChannel,
    counter: ActiveRequestCounter,
    max_requests: u32,
    sync_wait_budget: Duration,
    wake: Option<mpsc::Sender<DispatchTask>>,
}

impl SubmissionGateway {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, config: &ServiceConfig) -> Self {
        Self {
            status: StatusStore::new(Arc::clone(&store)),
            queues: OperationQueues::new(Arc::clone(&store)),
            results: ResultChannel::new(Arc::clone(&store)),
            counter: ActiveRequestCounter::new(Arc::clone(&store)),
            store,
            max_requests: config.max_requests,
            sync_wait_budget: config.sync_wait_budget(),
            wake: None,
        }
    }

    /// Nudges a dispatcher in the same process after every enqueue so it does
    /// not wait for its next idle tick.
    #[must_use]
    pub fn with_dispatcher(mut self, wake: mpsc::Sender<DispatchTask>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Submits a sync operation and waits for its terminal status.
    ///
    /// # Errors
    ///
    /// - [`OperationError::MissingId`] if `id` is empty
    /// - [`OperationError::DuplicateOperation`] if `id` was already submitted
    /// - [`OperationError::Overloaded`] if the admission cap is reached
    /// - [`OperationError::Timeout`] if no result arrives within the budget
    /// - [`OperationError::ExecutionFailed`] if the operation failed
    /// - [`OperationError::StoreUnavailable`] on store failure
    pub async fn submit_sync(
        &self,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<SyncOutcome, OperationError> {
        let op = Operation::new(id, OperationKind::Sync, payload);
        self.admit_and_enqueue(&op).await?;

        let started = Instant::now();
        let marker = self.results.wait(id, self.sync_wait_budget).await?;

        #[allow(clippy::cast_possible_truncation)]
        let waited_ms = started.elapsed().as_millis() as u64;
        match marker {
            Some(OperationStatus::Completed) => {
                debug!(id, waited_ms, "sync operation completed");
                Ok(SyncOutcome {
                    id: id.to_owned(),
                    status: OperationStatus::Completed,
                })
            }
            Some(OperationStatus::Failed) => {
                Err(OperationError::ExecutionFailed { id: id.to_owned() })
            }
            Some(other) => Err(OperationError::StoreUnavailable(anyhow::anyhow!(
                "non-terminal result marker {other} for {id}"
            ))),
            None => {
                info!(
                    id,
                    waited_ms, "sync wait budget exhausted, operation continues in background"
                );
                Err(OperationError::Timeout {
                    id: id.to_owned(),
                    waited_ms,
                })
            }
        }
    }

    /// Submits an async operation and returns as soon as it is queued.
    ///
    /// # Errors
    ///
    /// Same admission errors as [`submit_sync`](Self::submit_sync).
    pub async fn submit_async(
        &self,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<AsyncAccepted, OperationError> {
        let op = Operation::new(id, OperationKind::Async, payload);
        self.admit_and_enqueue(&op).await?;
        Ok(AsyncAccepted { id: id.to_owned() })
    }

    /// Current status of `id`. Never-submitted ids are `Unknown`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::StoreUnavailable`] on store failure.
    pub async fn get_status(&self, id: &str) -> Result<OperationStatus, OperationError> {
        Ok(self.status.get(id).await?)
    }

    /// Status text as it should be reported to callers: the stored state
    /// verbatim, or `Unknown` when nothing is stored. Text written by some
    /// other producer is passed through rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::StoreUnavailable`] on store failure.
    pub async fn status_text(&self, id: &str) -> Result<String, OperationError> {
        let Some(raw) = self.status.get_stored(id).await? else {
            return Ok(OperationStatus::Unknown.as_str().to_owned());
        };
        if OperationStatus::from_stored(Some(&raw)).is_err() {
            warn!(id, status = %raw, "unrecognised status text");
        }
        Ok(raw)
    }

    /// Deletes every status record and result mailbox.
    ///
    /// The counter and the queues are left alone. Returns the number of keys
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::StoreUnavailable`] on store failure.
    pub async fn clear_all(&self) -> Result<u64, OperationError> {
        let statuses = self.status.clear().await?;
        let results = self.results.clear().await?;
        info!(statuses, results, "cleared operation records");
        Ok(statuses + results)
    }

    /// Counter and queue depths as currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn snapshot(&self) -> anyhow::Result<GatewaySnapshot> {
        Ok(GatewaySnapshot {
            active_requests: self.counter.current().await?,
            queues: self.queues.depths().await?,
        })
    }

    /// Round-trips the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    // -- internals ----------------------------------------------------------

    async fn admit_and_enqueue(&self, op: &Operation) -> Result<(), OperationError> {
        if op.id.is_empty() {
            record_admission(op.kind, "missing_id");
            return Err(OperationError::MissingId);
        }

        let outcome = self
            .store
            .try_admit(
                &keys::status_key(&op.id),
                OperationStatus::Pending.as_str(),
                keys::ACTIVE_REQUESTS,
                self.max_requests,
            )
            .await
            .inspect_err(|_| record_admission(op.kind, "store_unavailable"))?;

        match outcome {
            AdmissionOutcome::Admitted { active } => {
                debug!(id = %op.id, kind = %op.kind, active, "operation admitted");
            }
            AdmissionOutcome::Duplicate => {
                record_admission(op.kind, "duplicate");
                return Err(OperationError::DuplicateOperation { id: op.id.clone() });
            }
            AdmissionOutcome::Overloaded { active } => {
                record_admission(op.kind, "overloaded");
                warn!(
                    id = %op.id,
                    kind = %op.kind,
                    active,
                    limit = self.max_requests,
                    "admission rejected"
                );
                return Err(OperationError::Overloaded);
            }
        }

        if let Err(e) = self.queues.push(op).await {
            self.roll_back(&op.id).await;
            record_admission(op.kind, "store_unavailable");
            return Err(e.into());
        }
        record_admission(op.kind, "admitted");

        if let Some(wake) = &self.wake {
            // A full channel already has a wake-up pending.
            let _ = wake.try_send(DispatchTask::Wake);
        }
        Ok(())
    }

    /// Undoes an admission whose enqueue failed so the id can be resubmitted
    /// and the slot is not leaked.
    async fn roll_back(&self, id: &str) {
        warn!(id, "enqueue failed after admission, rolling back");
        if let Err(e) = self.store.delete(&[keys::status_key(id)]).await {
            warn!(id, error = %e, "failed to remove status record during rollback");
        }
        if let Err(e) = self.counter.release().await {
            warn!(id, error = %e, "failed to release slot during rollback");
        }
    }
}

fn record_admission(kind: OperationKind, outcome: &'static str) {
    metrics::counter!(
        "opgate_admissions_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::service::dispatcher::Dispatcher;
    use crate::service::executor::{OperationExecutor, SimulatedExecutor};
    use crate::service::worker::BackgroundWorker;
    use crate::storage::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: SubmissionGateway,
        worker: BackgroundWorker<Dispatcher>,
    }

    fn config(max_requests: u32, exec_ms: u64, budget_ms: u64) -> ServiceConfig {
        ServiceConfig {
            max_requests,
            sync_wait_budget_ms: budget_ms,
            execution_duration_ms: exec_ms,
            idle_poll_interval_ms: 10,
            ..ServiceConfig::default()
        }
    }

    fn harness_with(config: &ServiceConfig, executor: Arc<dyn OperationExecutor>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(store.clone(), executor, config);
        let worker = BackgroundWorker::start(dispatcher, config.idle_poll_interval());
        let gateway = SubmissionGateway::new(store.clone(), config);
        Harness {
            store,
            gateway,
            worker,
        }
    }

    fn harness(config: &ServiceConfig) -> Harness {
        let executor = Arc::new(SimulatedExecutor::new(config.execution_duration()));
        harness_with(config, executor)
    }

    #[tokio::test]
    async fn sync_happy_path_returns_completed() {
        let mut h = harness(&config(5, 200, 2_000));

        let start = Instant::now();
        let outcome = h.gateway.submit_sync("a", json!({})).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome.status, OperationStatus::Completed);
        assert_eq!(outcome.id, "a");
        assert!(elapsed >= Duration::from_millis(200), "took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_000), "took {elapsed:?}");
        assert_eq!(
            h.gateway.get_status("a").await.unwrap(),
            OperationStatus::Completed
        );
        assert_eq!(h.gateway.snapshot().await.unwrap().active_requests, 0);
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn sync_timeout_leaves_operation_running() {
        let mut h = harness(&config(5, 5_000, 500));

        let start = Instant::now();
        let err = h.gateway.submit_sync("slow", json!({})).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, OperationError::Timeout { ref id, .. } if id == "slow"));
        assert!(elapsed >= Duration::from_millis(500), "took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_500), "took {elapsed:?}");
        assert_eq!(
            h.gateway.get_status("slow").await.unwrap(),
            OperationStatus::Pending
        );

        tokio::time::sleep(Duration::from_millis(4_800)).await;
        assert_eq!(
            h.gateway.get_status("slow").await.unwrap(),
            OperationStatus::Completed
        );
        // The marker nobody consumed stays behind until the next clear.
        assert_eq!(h.store.list_len("operation-result:slow").await.unwrap(), 1);
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn async_submission_returns_immediately() {
        let mut h = harness(&config(5, 300, 2_000));

        let start = Instant::now();
        let accepted = h.gateway.submit_async("a", json!({"n": 1})).await.unwrap();
        assert_eq!(accepted.id, "a");
        assert!(start.elapsed() < Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            h.gateway.get_status("a").await.unwrap(),
            OperationStatus::Completed
        );
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn resubmission_conflicts_across_kinds() {
        let mut h = harness(&config(5, 50, 2_000));

        h.gateway.submit_async("x", json!({})).await.unwrap();
        assert!(matches!(
            h.gateway.submit_async("x", json!({})).await,
            Err(OperationError::DuplicateOperation { .. })
        ));
        assert!(matches!(
            h.gateway.submit_sync("x", json!({})).await,
            Err(OperationError::DuplicateOperation { .. })
        ));

        // Still a conflict after the first submission finished.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(
            h.gateway.submit_sync("x", json!({})).await,
            Err(OperationError::DuplicateOperation { .. })
        ));
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn admission_cap_rejects_both_paths() {
        let mut h = harness(&config(2, 1_000, 2_000));

        h.gateway.submit_async("a", json!({})).await.unwrap();
        h.gateway.submit_async("b", json!({})).await.unwrap();

        assert!(matches!(
            h.gateway.submit_async("c", json!({})).await,
            Err(OperationError::Overloaded)
        ));
        assert!(matches!(
            h.gateway.submit_sync("d", json!({})).await,
            Err(OperationError::Overloaded)
        ));
        // Rejected submissions leave no trace.
        assert_eq!(
            h.gateway.get_status("c").await.unwrap(),
            OperationStatus::Unknown
        );
        assert_eq!(h.gateway.snapshot().await.unwrap().active_requests, 2);
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn empty_id_is_rejected_before_admission() {
        let mut h = harness(&config(5, 50, 500));

        assert!(matches!(
            h.gateway.submit_sync("", json!({})).await,
            Err(OperationError::MissingId)
        ));
        assert!(matches!(
            h.gateway.submit_async("", json!({})).await,
            Err(OperationError::MissingId)
        ));
        assert_eq!(h.gateway.snapshot().await.unwrap().active_requests, 0);
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn observed_statuses_never_regress() {
        let mut h = harness(&config(5, 200, 2_000));

        let mut seen = vec![h.gateway.get_status("m").await.unwrap()];
        h.gateway.submit_async("m", json!({})).await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(600);
        while Instant::now() < deadline {
            let status = h.gateway.get_status("m").await.unwrap();
            if seen.last() != Some(&status) {
                seen.push(status);
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
        }

        assert_eq!(
            seen,
            vec![
                OperationStatus::Unknown,
                OperationStatus::Pending,
                OperationStatus::Completed
            ]
        );
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_forgets_ids() {
        let mut h = harness(&config(5, 20, 2_000));

        assert_eq!(h.gateway.clear_all().await.unwrap(), 0);

        h.gateway.submit_sync("a", json!({})).await.unwrap();
        h.gateway.submit_async("b", json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(h.gateway.clear_all().await.unwrap(), 2);
        for id in ["a", "b"] {
            assert_eq!(
                h.gateway.get_status(id).await.unwrap(),
                OperationStatus::Unknown
            );
        }
        assert_eq!(h.gateway.clear_all().await.unwrap(), 0);

        // A cleared id can be submitted again.
        h.gateway.submit_sync("a", json!({})).await.unwrap();
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn never_submitted_id_is_unknown() {
        let mut h = harness(&config(5, 20, 500));
        assert_eq!(
            h.gateway.get_status("ghost").await.unwrap(),
            OperationStatus::Unknown
        );
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn status_text_passes_stored_state_through() {
        let mut h = harness(&config(5, 20, 500));

        assert_eq!(h.gateway.status_text("ghost").await.unwrap(), "Unknown");
        h.store
            .set(&keys::status_key("legacy"), "InProgress")
            .await
            .unwrap();
        assert_eq!(h.gateway.status_text("legacy").await.unwrap(), "InProgress");

        h.gateway.submit_sync("a", json!({})).await.unwrap();
        assert_eq!(h.gateway.status_text("a").await.unwrap(), "Completed");
        h.worker.stop().await;
    }

    struct FailingExecutor;

    #[async_trait]
    impl OperationExecutor for FailingExecutor {
        async fn execute(&self, _op: &Operation) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("downstream rejected the operation"))
        }
    }

    #[tokio::test]
    async fn failing_executor_surfaces_failed() {
        let mut h = harness_with(&config(5, 0, 2_000), Arc::new(FailingExecutor));

        assert!(matches!(
            h.gateway.submit_sync("f", json!({})).await,
            Err(OperationError::ExecutionFailed { ref id }) if id == "f"
        ));
        assert_eq!(
            h.gateway.get_status("f").await.unwrap(),
            OperationStatus::Failed
        );
        assert_eq!(h.gateway.snapshot().await.unwrap().active_requests, 0);
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn wake_skips_idle_wait() {
        let config = ServiceConfig {
            idle_poll_interval_ms: 60_000,
            ..config(5, 10, 2_000)
        };
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(SimulatedExecutor::new(config.execution_duration()));
        let dispatcher = Dispatcher::new(store.clone(), executor, &config);
        let mut worker = BackgroundWorker::start(dispatcher, config.idle_poll_interval());
        let gateway =
            SubmissionGateway::new(store, &config).with_dispatcher(worker.sender().unwrap());

        // Let the startup tick run on empty queues first.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let start = Instant::now();
        gateway.submit_sync("w", json!({})).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
        worker.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_respect_cap_and_uniqueness() {
        // No dispatcher: nothing finishes, so admitted slots stay taken.
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let gateway = SubmissionGateway::new(store, &config(5, 0, 100));

        let mut handles = Vec::new();
        for i in 0..40 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway.submit_async(&format!("op-{i}"), json!({})).await
            }));
        }
        for _ in 0..10 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway.submit_async("same", json!({})).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(gateway.snapshot().await.unwrap().active_requests, 5);
    }

    /// Store whose list pushes always fail.
    struct PushFailsStore(MemoryStore);

    #[async_trait]
    impl SharedStore for PushFailsStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.set(key, value).await
        }
        async fn decrement_saturating(&self, key: &str) -> anyhow::Result<i64> {
            self.0.decrement_saturating(key).await
        }
        async fn push_front(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("list push refused"))
        }
        async fn push_back(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("list push refused"))
        }
        async fn pop_front(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.pop_front(key).await
        }
        async fn pop_front_wait(
            &self,
            key: &str,
            timeout: Duration,
        ) -> anyhow::Result<Option<String>> {
            self.0.pop_front_wait(key, timeout).await
        }
        async fn list_len(&self, key: &str) -> anyhow::Result<u64> {
            self.0.list_len(key).await
        }
        async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
            self.0.keys_with_prefix(prefix).await
        }
        async fn delete(&self, keys: &[String]) -> anyhow::Result<u64> {
            self.0.delete(keys).await
        }
        async fn try_admit(
            &self,
            status_key: &str,
            status: &str,
            counter_key: &str,
            limit: u32,
        ) -> anyhow::Result<AdmissionOutcome> {
            self.0.try_admit(status_key, status, counter_key, limit).await
        }
        async fn ping(&self) -> anyhow::Result<()> {
            self.0.ping().await
        }
    }

    #[tokio::test]
    async fn failed_enqueue_rolls_back_admission() {
        let store = Arc::new(PushFailsStore(MemoryStore::new()));
        let gateway = SubmissionGateway::new(store.clone(), &config(5, 0, 100));

        assert!(matches!(
            gateway.submit_async("r", json!({})).await,
            Err(OperationError::StoreUnavailable(_))
        ));
        assert_eq!(
            gateway.get_status("r").await.unwrap(),
            OperationStatus::Unknown
        );
        assert_eq!(gateway.snapshot().await.unwrap().active_requests, 0);
    }
}
