//! Dispatcher: drains the operation queues and supervises execution tasks.
//!
//! The dispatcher is a [`BackgroundRunnable`]. Every worker tick (the idle
//! poll interval) and every [`DispatchTask::Wake`] pops records until both
//! queues are empty or the in-flight limit is reached. Each operation runs in
//! its own task inside a [`JoinSet`], so a slow operation never stalls the
//! drain loop, and every task's outcome is observed.
//!
//! Per operation: mark `Pending`, run the executor, mark `Completed` or
//! `Failed`, deliver the marker (sync only), release the admission slot.
//! Operations still running when the drain timeout expires on stop are
//! aborted and closed out as `Failed`, so their slots are released too.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opgate_core::{Operation, OperationKind, OperationStatus};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::ServiceConfig;
use super::counter::ActiveRequestCounter;
use super::executor::OperationExecutor;
use super::queues::{Dequeued, OperationQueues};
use super::result_channel::ResultChannel;
use super::status::StatusStore;
use super::worker::BackgroundRunnable;
use crate::traits::SharedStore;

/// On-demand requests accepted by the dispatcher worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTask {
    /// Drain the queues now instead of waiting for the next tick.
    Wake,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Everything an execution task needs, cloned into each task.
#[derive(Clone)]
struct ExecutionContext {
    status: StatusStore,
    results: ResultChannel,
    counter: ActiveRequestCounter,
    executor: Arc<dyn OperationExecutor>,
}

impl ExecutionContext {
    async fn run(&self, op: Operation) {
        let started = Instant::now();

        if let Err(e) = self.status.advance(&op.id, OperationStatus::Pending).await {
            warn!(id = %op.id, error = %e, "failed to mark operation pending");
        }

        // The executor runs in its own task so a panic surfaces as a JoinError
        // here instead of unwinding through the bookkeeping below.
        let executor = Arc::clone(&self.executor);
        let work = op.clone();
        let outcome = match tokio::spawn(async move { executor.execute(&work).await }).await {
            Ok(Ok(())) => OperationStatus::Completed,
            Ok(Err(e)) => {
                warn!(id = %op.id, kind = %op.kind, error = %e, "operation failed");
                OperationStatus::Failed
            }
            Err(e) => {
                error!(id = %op.id, kind = %op.kind, error = %e, "operation task aborted");
                OperationStatus::Failed
            }
        };

        self.finish(&op.id, op.kind, outcome).await;

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(id = %op.id, kind = %op.kind, outcome = %outcome, elapsed_ms, "operation finished");
        metrics::counter!(
            "opgate_executions_total",
            "kind" => op.kind.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    /// Terminal bookkeeping. Each step is attempted even if an earlier one
    /// failed so the admission slot is always released.
    async fn finish(&self, id: &str, kind: OperationKind, outcome: OperationStatus) {
        if let Err(e) = self.status.advance(id, outcome).await {
            warn!(id, error = %e, "failed to record terminal status");
        }
        if kind == OperationKind::Sync {
            if let Err(e) = self.results.deliver(id, outcome).await {
                warn!(id, error = %e, "failed to deliver sync result");
            }
        }
        if let Err(e) = self.counter.release().await {
            warn!(id, error = %e, "failed to release admission slot");
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    /// Distinguishes dispatcher processes sharing one store in the logs.
    id: Uuid,
    queues: OperationQueues,
    ctx: ExecutionContext,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    /// Operations whose terminal bookkeeping has not completed yet.
    running: Arc<Mutex<HashMap<String, OperationKind>>>,
    drain_timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        executor: Arc<dyn OperationExecutor>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            queues: OperationQueues::new(Arc::clone(&store)),
            ctx: ExecutionContext {
                status: StatusStore::new(Arc::clone(&store)),
                results: ResultChannel::new(Arc::clone(&store)),
                counter: ActiveRequestCounter::new(store),
                executor,
            },
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            tasks: JoinSet::new(),
            running: Arc::new(Mutex::new(HashMap::new())),
            drain_timeout: config.drain_timeout(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of execution tasks not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Pops and launches operations until both queues are empty or the
    /// in-flight limit is reached. Returns how many were launched.
    pub async fn drain(&mut self) -> usize {
        self.reap();

        let mut launched = 0;
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                debug!(in_flight = self.tasks.len(), "in-flight limit reached");
                break;
            };

            let next = match self.queues.pop_next().await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "queue poll failed");
                    break;
                }
            };

            match Operation::from_record(&next.record, next.kind) {
                Ok(op) => {
                    self.launch(op, permit);
                    launched += 1;
                }
                Err(e) => self.discard_malformed(&next, &e).await,
            }
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("opgate_in_flight_tasks").set(self.tasks.len() as f64);
        launched
    }

    fn launch(&mut self, op: Operation, permit: OwnedSemaphorePermit) {
        debug!(dispatcher = %self.id, id = %op.id, kind = %op.kind, "launching operation");

        self.running.lock().insert(op.id.clone(), op.kind);
        let running = Arc::clone(&self.running);
        let ctx = self.ctx.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            let id = op.id.clone();
            ctx.run(op).await;
            running.lock().remove(&id);
        });
    }

    /// Drops an undecodable record. If its id is still readable the
    /// operation is closed out as `Failed` so its slot is released.
    async fn discard_malformed(&self, next: &Dequeued, err: &serde_json::Error) {
        warn!(kind = %next.kind, error = %err, "discarding malformed queue record");

        let id = serde_json::from_str::<serde_json::Value>(&next.record)
            .ok()
            .and_then(|doc| doc.get("id")?.as_str().map(str::to_owned));
        if let Some(id) = id {
            self.ctx
                .finish(&id, next.kind, OperationStatus::Failed)
                .await;
        }
    }

    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "execution task terminated abnormally");
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for Dispatcher {
    type Task = DispatchTask;

    async fn run(&mut self, task: DispatchTask) {
        match task {
            DispatchTask::Wake => {
                self.drain().await;
            }
        }
    }

    async fn on_tick(&mut self) {
        self.drain().await;
    }

    async fn shutdown(&mut self) {
        let pending = self.tasks.len();
        if pending == 0 {
            return;
        }
        info!(dispatcher = %self.id, pending, "waiting for in-flight operations");

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "execution task terminated abnormally");
                }
            }
        })
        .await;

        if drained.is_ok() {
            return;
        }

        warn!(
            remaining = self.tasks.len(),
            "drain timeout expired, aborting remaining operations"
        );
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}

        let abandoned: Vec<(String, OperationKind)> = self.running.lock().drain().collect();
        for (id, kind) in abandoned {
            warn!(dispatcher = %self.id, id = %id, kind = %kind, "operation abandoned on stop");
            self.ctx.finish(&id, kind, OperationStatus::Failed).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
