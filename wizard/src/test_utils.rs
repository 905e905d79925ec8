//! Test utilities: a scriptable history client and an in-memory application harness.

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{Config, DatabaseConfig};
use crate::health::ClusterScanner;
use crate::history::{Aggregate, HistoryClient, HistoryError, TimeValue};
use crate::storage::Stores;
use crate::{AppState, build_router};

#[derive(Default)]
struct FakeHistory {
    last_values: Mutex<HashMap<String, Result<Option<TimeValue>, HistoryError>>>,
    aggregates: Mutex<HashMap<String, Result<Aggregate, HistoryError>>>,
    delay: Mutex<Option<Duration>>,
    last_value_delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

/// History client answering from scripted responses. Clones share the script.
///
/// Metrics without a scripted last value have none; metrics without a scripted aggregate have
/// an empty one.
#[derive(Clone, Default)]
pub struct FakeHistoryClient {
    inner: Arc<FakeHistory>,
}

impl FakeHistoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_value(&self, metric: &str, response: Result<Option<TimeValue>, HistoryError>) {
        self.inner.last_values.lock().insert(metric.to_string(), response);
    }

    pub fn set_aggregate(&self, metric: &str, response: Result<Aggregate, HistoryError>) {
        self.inner.aggregates.lock().insert(metric.to_string(), response);
    }

    /// Delay every answer by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = Some(delay);
    }

    /// Delay last-value answers by `delay`, on top of [`set_delay`](Self::set_delay).
    pub fn set_last_value_delay(&self, delay: Duration) {
        *self.inner.last_value_delay.lock() = Some(delay);
    }

    /// Number of requests answered so far.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl HistoryClient for FakeHistoryClient {
    async fn last_value(&self, metric: &str, _timeout: Duration) -> Result<Option<TimeValue>, HistoryError> {
        self.answer().await;
        let delay = *self.inner.last_value_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.last_values.lock().get(metric).cloned().unwrap_or(Ok(None))
    }

    async fn aggregate(
        &self,
        metric: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _timeout: Duration,
    ) -> Result<Aggregate, HistoryError> {
        self.answer().await;
        self.inner.aggregates.lock().get(metric).cloned().unwrap_or_else(|| {
            Ok(Aggregate {
                minimum: 0.0,
                maximum: 0.0,
                count: 0,
                timestamp: Utc::now(),
            })
        })
    }
}

/// In-memory configuration with every background service off.
pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: None,
        database: DatabaseConfig::Memory,
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    };
    config.background_services.health_scan.enabled = false;
    config.background_services.leader_election.enabled = false;
    config.health_scan.check_metric_names = false;
    config.health_scan.prune_stale_issues = false;
    config
}

/// Application state over in-memory stores and a [`FakeHistoryClient`], with direct access to
/// both for seeding.
pub struct TestHarness {
    pub stores: Stores,
    pub history: FakeHistoryClient,
    pub config: Config,
    pub state: AppState,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(create_test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let stores = Stores::in_memory();
        let history = FakeHistoryClient::new();
        let state = AppState::from_parts(config.clone(), &stores, Arc::new(history.clone()));
        Self {
            stores,
            history,
            config,
            state,
        }
    }

    /// Test server over the full router, sharing this harness' stores and scanner.
    pub fn server(&self) -> TestServer {
        TestServer::new(build_router(&self.state)).expect("Failed to create test server")
    }

    pub fn scanner(&self) -> ClusterScanner {
        self.state.scanner.clone()
    }
}
