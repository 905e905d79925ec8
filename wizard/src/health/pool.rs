//! Bounded pool of concurrently running health checks.

use metrics::counter;
use std::future::Future;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

/// Outcome counts of the checks harvested since the last [`BoundedTaskPool::completed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: usize,
    pub failed: usize,
}

/// Runs at most `max_tasks` checks at once on the tokio runtime.
///
/// A check that returns an error or panics is logged and counted; it never affects the other
/// checks or the caller.
pub struct BoundedTaskPool {
    max_tasks: usize,
    tasks: JoinSet<anyhow::Result<()>>,
    stats: PoolStats,
}

impl BoundedTaskPool {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            max_tasks: max_tasks.max(1),
            tasks: JoinSet::new(),
            stats: PoolStats::default(),
        }
    }

    /// Number of checks currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Start `task`, first waiting for a free slot if the pool is full.
    pub async fn append<F>(&mut self, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }

        while self.tasks.len() >= self.max_tasks {
            match self.tasks.join_next().await {
                Some(result) => self.record(result),
                None => break,
            }
        }

        self.tasks.spawn(task.in_current_span());
    }

    /// Wait for every check in flight and return the counts since the last call.
    pub async fn completed(&mut self) -> PoolStats {
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }
        std::mem::take(&mut self.stats)
    }

    fn record(&mut self, result: Result<anyhow::Result<()>, JoinError>) {
        match result {
            Ok(Ok(())) => {
                self.stats.completed += 1;
            }
            Ok(Err(e)) => {
                tracing::error!("Health check failed: {:#}", e);
                self.stats.failed += 1;
                counter!("wizard_health_checks_failed_total").increment(1);
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "Health check panicked");
                self.stats.failed += 1;
                counter!("wizard_health_checks_failed_total").increment(1);
            }
        }
    }
}
