//! The cluster health scan.
//!
//! A scan streams every metadata document and submits the per-metric checks to a
//! [`BoundedTaskPool`]. Only one scan runs at a time; a second request while one is in progress
//! is refused immediately with [`ScanError::AlreadyRunning`].

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::checks::{CheckKind, MetricHealthChecks};
use super::pool::{BoundedTaskPool, PoolStats};
use crate::config::HealthScanConfig;
use crate::db::errors::DbError;
use crate::db::models::issues::{IssueKey, ScopeType};
use crate::db::models::metadata::MetricMetadata;
use crate::storage::{IssueStore, MetadataStore};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("health scan already running")]
    AlreadyRunning,

    /// The metadata or issue store failed mid-scan. Reports written so far stay in place.
    #[error("health scan aborted: {0}")]
    Aborted(#[source] DbError),
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_tasks: usize,
    pub check_metric_names: bool,
    pub prune_stale_issues: bool,
}

impl From<&HealthScanConfig> for ScanOptions {
    fn from(config: &HealthScanConfig) -> Self {
        Self {
            max_tasks: config.max_tasks,
            check_metric_names: config.check_metric_names,
            prune_stale_issues: config.prune_stale_issues,
        }
    }
}

/// Result of one completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub metrics: usize,
    pub checks: PoolStats,
    pub pruned: usize,
}

/// Progress of the current scan, or the outcome of the last one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ScanStatus {
    pub running: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub started_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics_seen: u64,
    pub checks_submitted: u64,
    pub checks_failed: u64,
    pub issues_pruned: u64,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct ClusterScanner {
    metadata: Arc<dyn MetadataStore>,
    issues: Arc<dyn IssueStore>,
    checks: MetricHealthChecks,
    options: ScanOptions,
    lock: Arc<Mutex<()>>,
    status: Arc<RwLock<ScanStatus>>,
}

impl ClusterScanner {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        issues: Arc<dyn IssueStore>,
        checks: MetricHealthChecks,
        options: ScanOptions,
    ) -> Self {
        Self {
            metadata,
            issues,
            checks,
            options,
            lock: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(ScanStatus::default())),
        }
    }

    pub fn running(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// A scan accepted by [`trigger`](Self::trigger) counts as running before its task starts.
    pub fn status(&self) -> ScanStatus {
        let mut status = self.status.read().clone();
        status.running = self.running();
        status
    }

    /// Run a scan to completion on the current task.
    pub async fn run_once(&self) -> Result<ScanSummary, ScanError> {
        let guard = self.lock.clone().try_lock_owned().map_err(|_| ScanError::AlreadyRunning)?;
        self.run_locked(guard).await
    }

    /// Start a scan in the background. The lock is taken before returning, so a second call
    /// fails even if the spawned scan has not been polled yet.
    pub fn trigger(&self) -> Result<(), ScanError> {
        let guard = self.lock.clone().try_lock_owned().map_err(|_| ScanError::AlreadyRunning)?;
        let scanner = self.clone();
        tokio::spawn(async move {
            // Failures are logged by run_locked
            let _ = scanner.run_locked(guard).await;
        });
        Ok(())
    }

    async fn run_locked(&self, _guard: OwnedMutexGuard<()>) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        *self.status.write() = ScanStatus {
            running: true,
            started_at: Some(Utc::now()),
            ..ScanStatus::default()
        };
        counter!("wizard_health_scans_started_total").increment(1);

        let result = self.scan().await;

        let elapsed = started.elapsed();
        histogram!("wizard_health_scan_duration_seconds").record(elapsed.as_secs_f64());
        let mut status = self.status.write();
        status.running = false;
        status.finished_at = Some(Utc::now());
        match &result {
            Ok(summary) => {
                counter!("wizard_health_scans_finished_total").increment(1);
                status.checks_failed = summary.checks.failed as u64;
                status.issues_pruned = summary.pruned as u64;
                info!(
                    metrics = summary.metrics,
                    completed = summary.checks.completed,
                    failed = summary.checks.failed,
                    pruned = summary.pruned,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Health scan finished"
                );
            }
            Err(e) => {
                counter!("wizard_health_scans_aborted_total").increment(1);
                status.last_error = Some(e.to_string());
                error!(error = %e, "Health scan aborted");
            }
        }
        result
    }

    #[instrument(skip_all, name = "health_scan")]
    async fn scan(&self) -> Result<ScanSummary, ScanError> {
        info!("Health scan started");
        let mut pool = BoundedTaskPool::new(self.options.max_tasks);
        let mut seen = HashSet::new();
        let mut metrics = 0;

        let mut documents = self.metadata.stream();
        while let Some(entry) = documents.next().await {
            let (metric, metadata) = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Let submitted checks finish so nothing writes after the lock is released
                    pool.completed().await;
                    return Err(ScanError::Aborted(e));
                }
            };
            metrics += 1;

            let historic = metadata.historic() == Some(true);
            let mut kinds = vec![CheckKind::Metadata];
            if historic {
                kinds.push(CheckKind::History);
            } else if self.options.prune_stale_issues {
                kinds.push(CheckKind::ClearHistoric);
            }
            if self.options.check_metric_names {
                kinds.push(CheckKind::Name);
            }

            let metric: Arc<str> = Arc::from(metric);
            let metadata: Arc<MetricMetadata> = Arc::new(metadata);
            for kind in &kinds {
                self.submit(&mut pool, *kind, metric.clone(), metadata.clone()).await;
            }

            {
                let mut status = self.status.write();
                status.metrics_seen += 1;
                status.checks_submitted += kinds.len() as u64;
            }
            if self.options.prune_stale_issues {
                seen.insert(metric.to_string());
            }
        }
        drop(documents);

        let checks = pool.completed().await;
        let pruned = if self.options.prune_stale_issues {
            self.prune(&seen).await.map_err(ScanError::Aborted)?
        } else {
            0
        };

        Ok(ScanSummary { metrics, checks, pruned })
    }

    async fn submit(&self, pool: &mut BoundedTaskPool, kind: CheckKind, metric: Arc<str>, metadata: Arc<MetricMetadata>) {
        let checks = self.checks.clone();
        pool.append(async move {
            checks
                .run(kind, &metric, &metadata)
                .await
                .with_context(|| format!("{kind} check of {metric}"))
        })
        .await;
    }

    /// Delete every report of metrics that were not part of this scan.
    async fn prune(&self, seen: &HashSet<String>) -> Result<usize, DbError> {
        let mut pruned = 0;
        for scope in self.issues.scopes(ScopeType::Metric).await? {
            if seen.contains(&scope) {
                continue;
            }
            for report in self.issues.find_by_scope(ScopeType::Metric, &scope).await? {
                let key: IssueKey = report.key();
                if self.issues.delete(&key.id()).await? {
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            info!(pruned, "Removed issues of metrics without metadata");
        }
        Ok(pruned)
    }
}
