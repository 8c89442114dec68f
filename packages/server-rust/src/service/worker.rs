//! Background worker for polling loops and on-demand tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that feeds tasks from an mpsc
//! channel into a `BackgroundRunnable` and calls its tick hook at a fixed
//! interval. The dispatcher runs on top of it: every tick drains the queues.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
///
/// Implementors define how individual tasks are processed, what happens on
/// each periodic tick, and how to clean up on shutdown.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on every tick, starting immediately at startup. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The worker spawns a tokio task that:
/// 1. Calls `BackgroundRunnable::on_tick()` right away and then every tick
/// 2. Calls `BackgroundRunnable::run()` for each submitted task
/// 3. Calls `BackgroundRunnable::shutdown()` when stopped
///
/// A tick that overruns its interval delays the next one instead of
/// bursting to catch up, so a slow drain is followed by a full idle interval.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the background worker with the given runnable and tick interval.
    ///
    /// The channel capacity is fixed at 64.
    pub fn start(mut runnable: R, tick: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(64);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval = tokio::time::interval(tick);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break, // Channel closed.
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Submit a task to the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// A cloneable handle for submitting tasks from elsewhere.
    ///
    /// Returns `None` once the worker has been stopped.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::Sender<R::Task>> {
        self.tx.clone()
    }

    /// Stop the worker, waiting for `shutdown()` of the runnable to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Counts {
        runs: AtomicU32,
        ticks: AtomicU32,
        shutdowns: AtomicU32,
    }

    struct CountingRunnable(Arc<Counts>);

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = ();

        async fn run(&mut self, _task: ()) {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn first_tick_fires_at_startup() {
        let counts = Arc::new(Counts::default());
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counts.clone()), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counts.ticks.load(Ordering::SeqCst), 1);

        worker.stop().await;
        assert_eq!(counts.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submitted_tasks_and_ticks_both_run() {
        let counts = Arc::new(Counts::default());
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counts.clone()), Duration::from_millis(20));

        worker.submit(()).await.unwrap();
        worker.submit(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(110)).await;
        worker.stop().await;

        assert_eq!(counts.runs.load(Ordering::SeqCst), 2);
        assert!(counts.ticks.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let counts = Arc::new(Counts::default());
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counts), Duration::from_secs(60));
        worker.stop().await;

        assert!(worker.submit(()).await.is_err());
    }
}
