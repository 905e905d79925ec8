use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use utoipa::ToSchema;

/// Kind of anomaly an issue report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum IssueType {
    MissingHistoric,
    MissingMetadata,
    NoValue,
    Timeout,
    Errored,
    Dead,
    Undead,
    Infinite,
    InvalidName,
}

impl IssueType {
    pub const ALL: [IssueType; 9] = [
        IssueType::MissingHistoric,
        IssueType::MissingMetadata,
        IssueType::NoValue,
        IssueType::Timeout,
        IssueType::Errored,
        IssueType::Dead,
        IssueType::Undead,
        IssueType::Infinite,
        IssueType::InvalidName,
    ];

    /// Issue types that only make sense for metrics with a history.
    pub const HISTORIC: [IssueType; 6] = [
        IssueType::NoValue,
        IssueType::Timeout,
        IssueType::Errored,
        IssueType::Dead,
        IssueType::Undead,
        IssueType::Infinite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MissingHistoric => "missing_historic",
            IssueType::MissingMetadata => "missing_metadata",
            IssueType::NoValue => "no_value",
            IssueType::Timeout => "timeout",
            IssueType::Errored => "errored",
            IssueType::Dead => "dead",
            IssueType::Undead => "undead",
            IssueType::Infinite => "infinite",
            IssueType::InvalidName => "invalid_name",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Sort rank: error < warning < info.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an issue is attached to. Only metrics today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ScopeType {
    Metric,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Metric => "metric",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an issue report. At most one document exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    pub issue_type: IssueType,
    pub scope_type: ScopeType,
    pub scope: String,
}

impl IssueKey {
    pub fn new(issue_type: IssueType, scope_type: ScopeType, scope: impl Into<String>) -> Self {
        Self {
            issue_type,
            scope_type,
            scope: scope.into(),
        }
    }

    pub fn metric(issue_type: IssueType, metric: impl Into<String>) -> Self {
        Self::new(issue_type, ScopeType::Metric, metric)
    }

    /// Document id, e.g. `dead-metric-foo.bar`.
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.issue_type, self.scope_type, self.scope)
    }
}

/// A persisted issue report.
///
/// Extra fields (`source`, `last_timestamp`, `error`, `missing_metadata`, `archived`) are kept
/// in `fields` and serialized flat next to the fixed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IssueReport {
    /// Composite id `<type>-<scope_type>-<scope>`
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub scope_type: ScopeType,
    /// Metric id the issue refers to
    pub scope: String,
    pub severity: Severity,
    /// When the condition was first observed; never changes once set
    #[schema(value_type = String, format = "date-time")]
    pub first_detection_date: DateTime<Utc>,
    /// Last time the condition was observed
    #[schema(value_type = String, format = "date-time")]
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub fields: Map<String, Value>,
}

impl IssueReport {
    pub fn key(&self) -> IssueKey {
        IssueKey::new(self.issue_type, self.scope_type, self.scope.clone())
    }
}

/// Column an issue listing is sorted by. Ties are always broken by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueSort {
    #[default]
    Id,
    Severity,
    Scope,
    #[serde(rename = "type")]
    IssueType,
}

/// Listing request for issue reports: optional filters, sort order and offset pagination.
#[derive(Debug, Clone)]
pub struct IssueListQuery {
    pub issue_type: Option<IssueType>,
    pub severity: Option<Severity>,
    pub scope_type: Option<ScopeType>,
    pub sort: IssueSort,
    pub descending: bool,
    pub skip: i64,
    pub limit: i64,
}

impl Default for IssueListQuery {
    fn default() -> Self {
        Self {
            issue_type: None,
            severity: None,
            scope_type: None,
            sort: IssueSort::Id,
            descending: false,
            skip: 0,
            limit: i64::MAX,
        }
    }
}

impl IssueListQuery {
    pub fn matches(&self, report: &IssueReport) -> bool {
        self.issue_type.is_none_or(|t| report.issue_type == t)
            && self.severity.is_none_or(|s| report.severity == s)
            && self.scope_type.is_none_or(|s| report.scope_type == s)
    }

    /// Order `reports` in place as requested.
    pub fn sort(&self, reports: &mut [IssueReport]) {
        reports.sort_by(|a, b| {
            let primary = match self.sort {
                IssueSort::Id => std::cmp::Ordering::Equal,
                IssueSort::Severity => a.severity.rank().cmp(&b.severity.rank()),
                IssueSort::Scope => a.scope.cmp(&b.scope),
                IssueSort::IssueType => a.issue_type.as_str().cmp(b.issue_type.as_str()),
            };
            let ordering = primary.then_with(|| a.id.cmp(&b.id));
            if self.descending { ordering.reverse() } else { ordering }
        });
    }
}
