//! Background worker for periodic and on-demand tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from an mpsc channel
//! via a `BackgroundRunnable` implementation, with periodic tick callbacks.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Capacity of the task channel. `submit` waits when it is full.
const TASK_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Name used in log events.
    fn name(&self) -> &'static str;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called once per tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The spawned task handles submitted tasks, calls `on_tick` at the configured
/// interval (the first tick fires one full interval after start, and missed
/// ticks are not bunched up), and calls `shutdown` when stopped.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    name: &'static str,
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Starts the worker on the current tokio runtime.
    pub fn start(mut runnable: R, tick_interval: Duration) -> Self {
        let name = runnable.name();
        let (tx, mut rx) = mpsc::channel::<R::Task>(TASK_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + tick_interval;
            let mut ticks = tokio::time::interval_at(start, tick_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(worker = name, interval_ms = tick_interval.as_millis(), "worker started");

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = ticks.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
            debug!(worker = name, "worker stopped");
        });

        Self {
            name,
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
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
                .map_err(|_| anyhow::anyhow!("{} worker channel closed", self.name)),
            None => Err(anyhow::anyhow!("{} worker not running", self.name)),
        }
    }

    /// Stops the worker, waiting for the task in progress and `shutdown` to finish.
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
    struct Counters {
        runs: AtomicU32,
        ticks: AtomicU32,
        shutdowns: AtomicU32,
    }

    struct CountingRunnable(Arc<Counters>);

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&mut self, _task: String) {
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
    async fn processes_submitted_tasks_then_shuts_down() {
        let counters = Arc::new(Counters::default());
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_secs(60));

        worker.submit("sweep".to_string()).await.unwrap();
        worker.submit("probe".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
        assert!(worker.is_running());

        worker.stop().await;
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!worker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_fire_once_per_interval() {
        let counters = Arc::new(Counters::default());
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 3);

        worker.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let mut worker = BackgroundWorker::start(
            CountingRunnable(Arc::new(Counters::default())),
            Duration::from_secs(60),
        );
        worker.stop().await;

        let err = worker.submit("late".to_string()).await.unwrap_err();
        assert!(err.to_string().contains("counting"));
    }
}
