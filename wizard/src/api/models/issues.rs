//! API models for issue reports and health scans.

use super::pagination::Pagination;
use crate::db::models::issues::{IssueListQuery, IssueReport, IssueSort, IssueType, ScopeType, Severity};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing issues
#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListIssuesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only issues of this type
    #[serde(rename = "type")]
    pub issue_type: Option<IssueType>,

    /// Only issues of this severity
    pub severity: Option<Severity>,

    /// Only issues attached to this kind of scope
    pub scope_type: Option<ScopeType>,

    /// Sort key (default: id)
    pub sort: Option<IssueSort>,

    /// Reverse the sort order
    #[param(default = false)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub descending: Option<bool>,
}

impl ListIssuesQuery {
    pub fn to_store_query(&self) -> IssueListQuery {
        let (skip, limit) = self.pagination.params();
        IssueListQuery {
            issue_type: self.issue_type,
            severity: self.severity,
            scope_type: self.scope_type,
            sort: self.sort.unwrap_or_default(),
            descending: self.descending.unwrap_or(false),
            skip,
            limit,
        }
    }
}

/// All issues of one metric
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetricIssuesResponse {
    pub issues: Vec<IssueReport>,
}

/// Answer to a health scan request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScanRequestResponse {
    /// `created`, or `already running`
    #[schema(example = "created")]
    pub status: String,
}
