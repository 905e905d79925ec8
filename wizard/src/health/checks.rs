//! Per-metric health checks.
//!
//! Each check observes one aspect of a metric and reconciles the matching issue reports through
//! the [`IssueReporter`], so after a check has run the stored reports describe exactly what it
//! saw. Checks only fail on storage errors; problems with the metric itself become reports.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::reports::IssueReporter;
use crate::config::{HealthScanConfig, HistoryConfig};
use crate::db::errors::Result;
use crate::db::models::issues::{IssueKey, IssueType, Severity};
use crate::db::models::metadata::{Archived, MetricMetadata};
use crate::history::{HistoryClient, HistoryError};

static METRIC_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z][a-zA-Z0-9_]+\.)+[a-zA-Z][a-zA-Z0-9_]+$").expect("metric name pattern is valid")
});

/// Issue types owned by the liveness check; at most one of them survives each run.
/// `errored` is shared with the numeric check and reconciled by [`MetricHealthChecks::check_history`].
const LIVENESS_ISSUES: [IssueType; 4] = [IssueType::NoValue, IssueType::Timeout, IssueType::Dead, IssueType::Undead];

/// The checks a scan can submit for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Metadata,
    /// Liveness and numeric sanity, which share the `errored` report
    History,
    Name,
    /// Drop history-related reports of a metric that is no longer historic
    ClearHistoric,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CheckKind::Metadata => "metadata",
            CheckKind::History => "history",
            CheckKind::Name => "name",
            CheckKind::ClearHistoric => "clear-historic",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CheckSettings {
    /// Base allowed age of the last value
    pub liveness_tolerance: Duration,
    /// Window of the numeric sanity aggregate, ending now
    pub aggregate_window: Duration,
    /// Timeout of each history request
    pub request_timeout: Duration,
}

impl CheckSettings {
    pub fn from_config(health_scan: &HealthScanConfig, history: &HistoryConfig) -> Self {
        Self {
            liveness_tolerance: health_scan.liveness_tolerance,
            aggregate_window: health_scan.aggregate_window,
            request_timeout: history.request_timeout,
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self::from_config(&HealthScanConfig::default(), &HistoryConfig::default())
    }
}

#[derive(Clone)]
pub struct MetricHealthChecks {
    reporter: IssueReporter,
    history: Arc<dyn HistoryClient>,
    settings: CheckSettings,
}

fn source_field(metadata: &MetricMetadata) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("source".to_string(), metadata.get("source").cloned().unwrap_or(Value::Null));
    fields
}

fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl MetricHealthChecks {
    pub fn new(reporter: IssueReporter, history: Arc<dyn HistoryClient>, settings: CheckSettings) -> Self {
        Self {
            reporter,
            history,
            settings,
        }
    }

    pub async fn run(&self, kind: CheckKind, metric: &str, metadata: &MetricMetadata) -> Result<()> {
        match kind {
            CheckKind::Metadata => self.check_metadata(metric, metadata).await,
            CheckKind::History => self.check_history(metric, metadata).await,
            CheckKind::Name => self.check_name(metric, metadata).await,
            CheckKind::ClearHistoric => self.clear_historic(metric).await,
        }
    }

    /// How old the last value of a metric may be before it counts as dead, not counting the
    /// time the history request itself takes.
    pub fn allowed_age(&self, metadata: &MetricMetadata) -> Duration {
        let tolerance = self.settings.liveness_tolerance;

        if let Some(rate) = metadata.rate().filter(|r| *r > 0.0 && r.is_finite()) {
            if let Ok(period) = Duration::try_from_secs_f64(1.0 / rate) {
                return tolerance.saturating_add(period);
            }
        } else if metadata.get("rate").is_some() {
            debug!(rate = ?metadata.get("rate"), "Ignoring unusable rate");
        }

        match metadata.interval() {
            Some(interval) => tolerance.saturating_add(interval),
            None => {
                if let Some(raw) = metadata.get("interval") {
                    debug!(interval = %raw, "Ignoring unusable interval");
                }
                tolerance
            }
        }
    }

    /// Presence and types of the metadata fields every metric should carry.
    pub async fn check_metadata(&self, metric: &str, metadata: &MetricMetadata) -> Result<()> {
        self.reporter
            .handle(
                metadata.historic().is_none(),
                &IssueKey::metric(IssueType::MissingHistoric, metric),
                Severity::Warning,
                source_field(metadata),
            )
            .await?;

        let mut missing = Vec::new();
        if metadata.rate().is_none() {
            missing.push("rate");
        }
        for field in ["description", "unit", "source"] {
            if !metadata.has_text(field) {
                missing.push(field);
            }
        }

        let severity = if missing.contains(&"source") {
            Severity::Error
        } else {
            Severity::Info
        };
        let mut fields = source_field(metadata);
        fields.insert("missing_metadata".to_string(), json!(missing));

        self.reporter
            .handle(
                !missing.is_empty(),
                &IssueKey::metric(IssueType::MissingMetadata, metric),
                severity,
                fields,
            )
            .await
    }

    /// Liveness and numeric sanity of a historic metric. Both history requests run concurrently;
    /// `errored` exists afterwards iff either of them failed with a query error.
    pub async fn check_history(&self, metric: &str, metadata: &MetricMetadata) -> Result<()> {
        let (liveness, numeric) = tokio::join!(
            self.check_liveness(metric, metadata),
            self.check_numeric(metric, metadata)
        );
        let errors: Vec<String> = [liveness?, numeric?].into_iter().flatten().collect();

        let mut fields = source_field(metadata);
        fields.insert("error".to_string(), Value::String(errors.join("; ")));
        self.reporter
            .handle(
                !errors.is_empty(),
                &IssueKey::metric(IssueType::Errored, metric),
                Severity::Info,
                fields,
            )
            .await
    }

    /// Whether a historic metric still receives values, or receives values although archived.
    ///
    /// Returns the message of a failed last-value query; the caller owns the `errored` report.
    pub async fn check_liveness(&self, metric: &str, metadata: &MetricMetadata) -> Result<Option<String>> {
        let allowed_age = self.allowed_age(metadata);
        let started = Instant::now();
        let result = self.history.last_value(metric, self.settings.request_timeout).await;
        // Slow answers must not make a healthy metric look dead
        let allowed_age = allowed_age.saturating_add(started.elapsed());

        let mut query_error = None;
        let observed: Option<(IssueType, Severity, Map<String, Value>)> = match result {
            Ok(None) => Some((IssueType::NoValue, Severity::Warning, source_field(metadata))),
            Err(HistoryError::Timeout) => Some((IssueType::Timeout, Severity::Warning, source_field(metadata))),
            Err(HistoryError::Query(message)) => {
                query_error = Some(message);
                None
            }
            Ok(Some(last)) => {
                let age = Utc::now() - last.timestamp;
                let too_old = chrono::Duration::from_std(allowed_age).map(|allowed| age > allowed).unwrap_or(false);

                let mut fields = source_field(metadata);
                fields.insert("last_timestamp".to_string(), timestamp_value(last.timestamp));

                match metadata.archived() {
                    Archived::No if too_old => Some((IssueType::Dead, Severity::Error, fields)),
                    Archived::No => None,
                    Archived::At(archived_at) if last.timestamp > archived_at => {
                        fields.insert("archived".to_string(), timestamp_value(archived_at));
                        Some((IssueType::Undead, Severity::Warning, fields))
                    }
                    Archived::At(_) => None,
                    Archived::Unparseable(raw) => {
                        warn!(metric, archived = %raw, "Unparseable archived timestamp, judging by age");
                        if too_old {
                            None
                        } else {
                            fields.insert("archived".to_string(), raw);
                            Some((IssueType::Undead, Severity::Warning, fields))
                        }
                    }
                }
            }
        };

        let (observed_type, severity, fields) = match observed {
            Some((t, s, f)) => (Some(t), s, f),
            None => (None, Severity::Info, Map::new()),
        };

        for issue_type in LIVENESS_ISSUES {
            let key = IssueKey::metric(issue_type, metric);
            if observed_type == Some(issue_type) {
                self.reporter.create_or_update(&key, severity, fields.clone()).await?;
            } else {
                self.reporter.delete_if_exists(&key).await?;
            }
        }
        Ok(query_error)
    }

    /// Whether NaN or infinite values were stored recently.
    ///
    /// Returns the message of a failed aggregate query, in which case `infinite` is left as is.
    pub async fn check_numeric(&self, metric: &str, metadata: &MetricMetadata) -> Result<Option<String>> {
        let end = Utc::now();
        let window = chrono::Duration::from_std(self.settings.aggregate_window).unwrap_or(chrono::Duration::days(7));
        let start = end - window;

        match self
            .history
            .aggregate(metric, start, end, self.settings.request_timeout)
            .await
        {
            Err(HistoryError::Query(message)) => Ok(Some(message)),
            Err(HistoryError::Timeout) => {
                debug!(metric, "Aggregate request timed out, skipping numeric check");
                Ok(None)
            }
            Ok(aggregate) => {
                let mut fields = source_field(metadata);
                fields.insert("last_timestamp".to_string(), timestamp_value(aggregate.timestamp));
                self.reporter
                    .handle(
                        aggregate.has_non_finite(),
                        &IssueKey::metric(IssueType::Infinite, metric),
                        Severity::Info,
                        fields,
                    )
                    .await?;
                Ok(None)
            }
        }
    }

    pub async fn clear_historic(&self, metric: &str) -> Result<()> {
        for issue_type in IssueType::HISTORIC {
            self.reporter.delete_if_exists(&IssueKey::metric(issue_type, metric)).await?;
        }
        Ok(())
    }

    /// Whether the metric id follows the dotted naming convention.
    pub async fn check_name(&self, metric: &str, metadata: &MetricMetadata) -> Result<()> {
        self.reporter
            .handle(
                !METRIC_NAME.is_match(metric),
                &IssueKey::metric(IssueType::InvalidName, metric),
                Severity::Info,
                source_field(metadata),
            )
            .await
    }
}
