//! Periodic background workers (outbox relay, statistics reconciler).

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Work performed on every tick of a periodic worker.
#[async_trait]
pub trait PeriodicTask: Send + 'static {
    /// Worker name used in logs.
    fn name(&self) -> &str;

    /// One unit of work. Errors are logged and counted; the worker keeps running.
    async fn tick(&mut self) -> Result<()>;
}

/// Statistics for a periodic worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Total ticks run
    pub runs: Arc<AtomicU64>,
    /// Ticks that returned an error
    pub failed: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle for controlling a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: WorkerStats,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the worker to stop after its current tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the worker task to finish.
    pub async fn stop(self) {
        self.shutdown();
        if let Err(err) = self.join.await {
            tracing::warn!(worker = %self.name, error = %err, "Worker task ended abnormally");
        }
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

/// Run `task` every `interval` until the returned handle is shut down.
pub fn spawn_periodic<T: PeriodicTask>(mut task: T, interval: Duration) -> WorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let stats = WorkerStats::new();
    let name = task.name().to_string();
    let worker_stats = stats.clone();
    let worker_name = name.clone();

    let join = tokio::spawn(async move {
        tracing::info!(worker = %worker_name, interval = ?interval, "Worker started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!(worker = %worker_name, "Worker shutting down");
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    worker_stats.runs.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = task.tick().await {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(worker = %worker_name, error = %err, "Worker tick failed");
                    }
                }
            }
        }

        tracing::info!(worker = %worker_name, "Worker stopped");
    });

    WorkerHandle {
        name,
        shutdown: shutdown_tx,
        join,
        stats,
    }
}
