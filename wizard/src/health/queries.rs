//! Read path over the stored issue reports.

use std::sync::Arc;
use tracing::info;

use crate::db::errors::Result;
use crate::db::models::issues::{IssueListQuery, IssueReport, ScopeType};
use crate::storage::IssueStore;

#[derive(Clone)]
pub struct IssueQueryService {
    store: Arc<dyn IssueStore>,
}

impl IssueQueryService {
    pub fn new(store: Arc<dyn IssueStore>) -> Self {
        Self { store }
    }

    /// One page of reports matching `query`, plus the total number of matches.
    pub async fn list(&self, query: &IssueListQuery) -> Result<(Vec<IssueReport>, i64)> {
        self.store.list(query).await
    }

    pub async fn for_scope(&self, scope_type: ScopeType, scope: &str) -> Result<Vec<IssueReport>> {
        self.store.find_by_scope(scope_type, scope).await
    }

    /// Dismiss a report. Deleting a report that does not exist is not an error; if the
    /// condition still holds the next scan recreates it.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(issue = id, "Issue dismissed");
        }
        Ok(deleted)
    }
}
