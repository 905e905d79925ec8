use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use utoipa::ToSchema;

/// Metadata document of one metric, as published by its source.
///
/// Sources are free to publish whatever they like, so the raw object is kept and fields are
/// interpreted on access. A wrong-typed field reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct MetricMetadata(pub Map<String, Value>);

/// State of the `archived` metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum Archived {
    /// Absent or `null`
    No,
    /// Archived at the given instant
    At(DateTime<Utc>),
    /// Set, but not an ISO-8601 timestamp
    Unparseable(Value),
}

impl MetricMetadata {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn source(&self) -> Option<&str> {
        self.0.get("source").and_then(Value::as_str)
    }

    pub fn historic(&self) -> Option<bool> {
        self.0.get("historic").and_then(Value::as_bool)
    }

    pub fn rate(&self) -> Option<f64> {
        self.0.get("rate").and_then(Value::as_f64)
    }

    /// Publication interval, given either as a duration string (`"10s"`, `"1min"`, `"0.5s"`) or
    /// as a number of seconds.
    pub fn interval(&self) -> Option<Duration> {
        match self.0.get("interval")? {
            Value::String(s) => parse_duration(s),
            Value::Number(n) => n.as_f64().and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            _ => None,
        }
    }

    pub fn archived(&self) -> Archived {
        match self.0.get("archived") {
            None | Some(Value::Null) => Archived::No,
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(at) => Archived::At(at.with_timezone(&Utc)),
                Err(_) => Archived::Unparseable(Value::String(s.clone())),
            },
            Some(other) => Archived::Unparseable(other.clone()),
        }
    }

    /// Whether `field` holds a non-empty string.
    pub fn has_text(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(Value::String(s)) if !s.is_empty())
    }
}

impl From<Map<String, Value>> for MetricMetadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Parse a duration string. Accepts everything `humantime` does, plus decimal values with a
/// single unit suffix such as `"0.5s"` or `"2.5min"`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(duration) = humantime::parse_duration(raw) {
        return Some(duration);
    }

    let split = raw.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;
    let scale = match unit.trim() {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86400.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(value * scale).ok()
}

/// Filter for listing metric ids.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    /// Only ids starting with this prefix
    pub prefix: Option<String>,
    /// Only metrics whose `historic` flag equals this
    pub historic: Option<bool>,
    /// Only metrics published by this source
    pub source: Option<String>,
    /// Maximum number of ids returned
    pub limit: usize,
}

impl MetadataFilter {
    pub fn matches(&self, id: &str, metadata: &MetricMetadata) -> bool {
        self.prefix.as_deref().is_none_or(|p| id.starts_with(p))
            && self.historic.is_none_or(|h| metadata.historic().unwrap_or(false) == h)
            && self.source.as_deref().is_none_or(|s| metadata.source() == Some(s))
    }
}
