//! Reconciliation of issue reports with what a check observed.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::errors::Result;
use crate::db::models::issues::{IssueKey, IssueReport, Severity};
use crate::storage::IssueStore;

/// Creates, refreshes and removes issue reports so that exactly one report exists per key
/// while its condition holds.
#[derive(Clone)]
pub struct IssueReporter {
    store: Arc<dyn IssueStore>,
}

impl IssueReporter {
    pub fn new(store: Arc<dyn IssueStore>) -> Self {
        Self { store }
    }

    /// Record that the condition of `key` holds now.
    ///
    /// A new report gets `first_detection_date = now`; an existing one keeps it. `fields` are
    /// merged over the fields already stored.
    pub async fn create_or_update(&self, key: &IssueKey, severity: Severity, fields: Map<String, Value>) -> Result<IssueReport> {
        let id = key.id();
        let now = Utc::now();

        let (first_detection_date, mut merged) = match self.store.get(&id).await? {
            Some(existing) => (existing.first_detection_date, existing.fields),
            None => {
                info!(issue = %id, %severity, "New issue detected");
                (now, Map::new())
            }
        };
        merged.extend(fields);

        let report = IssueReport {
            id,
            issue_type: key.issue_type,
            scope_type: key.scope_type,
            scope: key.scope.clone(),
            severity,
            first_detection_date,
            date: now,
            fields: merged,
        };
        self.store.upsert(&report).await
    }

    /// Remove the report of `key`. Returns whether one existed.
    pub async fn delete_if_exists(&self, key: &IssueKey) -> Result<bool> {
        let id = key.id();
        let deleted = self.store.delete(&id).await?;
        if deleted {
            debug!(issue = %id, "Issue resolved");
        }
        Ok(deleted)
    }

    /// Make the existence of the report of `key` match `condition`.
    pub async fn handle(&self, condition: bool, key: &IssueKey, severity: Severity, fields: Map<String, Value>) -> Result<()> {
        if condition {
            self.create_or_update(key, severity, fields).await?;
        } else {
            self.delete_if_exists(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::issues::IssueType;
    use crate::storage::in_memory::InMemoryIssueStore;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn report_exists_iff_last_call_was_true() {
        let store = Arc::new(InMemoryIssueStore::new());
        let reporter = IssueReporter::new(store.clone());
        let key = IssueKey::metric(IssueType::Dead, "foo.bar");

        let sequence = [true, true, false, false, true, false, true];
        let mut first_detection = None;
        let mut previous = false;
        for condition in sequence {
            reporter
                .handle(condition, &key, Severity::Error, fields(json!({"source": "s"})))
                .await
                .unwrap();

            let stored = store.get(&key.id()).await.unwrap();
            assert_eq!(stored.is_some(), condition);

            if let Some(report) = stored {
                if previous {
                    // Continuous detection keeps the original date
                    assert_eq!(Some(report.first_detection_date), first_detection);
                }
                first_detection = Some(report.first_detection_date);
            }
            previous = condition;
        }
    }

    #[tokio::test]
    async fn repeated_creation_keeps_first_detection_and_merges_fields() {
        let store = Arc::new(InMemoryIssueStore::new());
        let reporter = IssueReporter::new(store.clone());
        let key = IssueKey::metric(IssueType::Dead, "foo.bar");

        let first = reporter
            .create_or_update(&key, Severity::Error, fields(json!({"source": "source-foo", "last_timestamp": "a"})))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = reporter
            .create_or_update(&key, Severity::Error, fields(json!({"last_timestamp": "b"})))
            .await
            .unwrap();

        assert_eq!(second.first_detection_date, first.first_detection_date);
        assert!(second.date > first.date);
        assert_eq!(second.fields["source"], "source-foo");
        assert_eq!(second.fields["last_timestamp"], "b");
        assert_eq!(second.id, "dead-metric-foo.bar");
    }

    #[tokio::test]
    async fn deleting_missing_report_is_a_noop() {
        let reporter = IssueReporter::new(Arc::new(InMemoryIssueStore::new()));
        let key = IssueKey::metric(IssueType::Undead, "never.seen");
        assert!(!reporter.delete_if_exists(&key).await.unwrap());
        assert!(!reporter.delete_if_exists(&key).await.unwrap());
    }
}
