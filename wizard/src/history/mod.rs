//! Client side of the metric history service.
//!
//! The health checks only need two queries: the most recent value of a metric and min/max/count
//! aggregates over a window. [`HistoryClient`] abstracts those so the checks can be exercised
//! against a fake; [`http::HttpHistoryClient`] talks to the history gateway over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use std::time::Duration;
use thiserror::Error;

pub mod http;

pub use http::HttpHistoryClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// No answer within the request timeout
    #[error("history request timed out")]
    Timeout,

    /// The history service answered with an error, or the answer could not be understood
    #[error("{0}")]
    Query(String),
}

/// A single data point.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub timestamp: DateTime<Utc>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub value: f64,
}

/// Aggregate over a time window. Non-finite values arrive as strings (`"inf"`, `"-inf"`, `"nan"`).
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub minimum: f64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub maximum: f64,
    pub count: u64,
    pub timestamp: DateTime<Utc>,
}

impl Aggregate {
    /// True if data points exist and at least one extreme is NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        self.count > 0 && !(self.minimum.is_finite() && self.maximum.is_finite())
    }
}

#[async_trait]
pub trait HistoryClient: Send + Sync {
    /// Most recent value of `metric`, `None` if nothing was ever stored.
    async fn last_value(&self, metric: &str, timeout: Duration) -> Result<Option<TimeValue>, HistoryError>;

    /// Aggregate of `metric` over `[start, end]`.
    async fn aggregate(
        &self,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Aggregate, HistoryError>;
}
