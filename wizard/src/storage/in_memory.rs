//! In-memory stores.
//!
//! Every store keeps its documents in an `Arc<RwLock<BTreeMap>>`, so clones share state and
//! iteration is ordered by key. Contents are lost on restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use super::{ConfigStore, IssueStore, MetadataStore};
use crate::db::errors::Result;
use crate::db::models::configs::{ClientConfig, ConfigBackup};
use crate::db::models::issues::{IssueListQuery, IssueReport, ScopeType};
use crate::db::models::metadata::{MetadataFilter, MetricMetadata};

#[derive(Clone, Default)]
pub struct InMemoryMetadataStore {
    documents: Arc<RwLock<BTreeMap<String, MetricMetadata>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    fn stream(&self) -> BoxStream<'_, Result<(String, MetricMetadata)>> {
        // Snapshot so writers are never blocked by a long scan
        let snapshot: Vec<_> = self
            .documents
            .read()
            .iter()
            .map(|(id, md)| Ok((id.clone(), md.clone())))
            .collect();
        stream::iter(snapshot).boxed()
    }

    async fn get(&self, id: &str) -> Result<Option<MetricMetadata>> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn put(&self, id: &str, metadata: MetricMetadata) -> Result<()> {
        self.documents.write().insert(id.to_string(), metadata);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.documents.write().remove(id).is_some())
    }

    async fn list(&self, filter: &MetadataFilter) -> Result<Vec<String>> {
        Ok(self
            .documents
            .read()
            .iter()
            .filter(|(id, md)| filter.matches(id, md))
            .take(filter.limit)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryIssueStore {
    reports: Arc<RwLock<BTreeMap<String, IssueReport>>>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    async fn get(&self, id: &str) -> Result<Option<IssueReport>> {
        Ok(self.reports.read().get(id).cloned())
    }

    async fn upsert(&self, report: &IssueReport) -> Result<IssueReport> {
        let mut reports = self.reports.write();
        let mut stored = report.clone();
        if let Some(existing) = reports.get(&report.id) {
            stored.first_detection_date = existing.first_detection_date;
        }
        reports.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.reports.write().remove(id).is_some())
    }

    async fn list(&self, query: &IssueListQuery) -> Result<(Vec<IssueReport>, i64)> {
        let mut matching: Vec<_> = self.reports.read().values().filter(|r| query.matches(r)).cloned().collect();
        let total = matching.len() as i64;
        query.sort(&mut matching);

        let page = matching
            .into_iter()
            .skip(query.skip.max(0) as usize)
            .take(query.limit.max(0).try_into().unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn find_by_scope(&self, scope_type: ScopeType, scope: &str) -> Result<Vec<IssueReport>> {
        Ok(self
            .reports
            .read()
            .values()
            .filter(|r| r.scope_type == scope_type && r.scope == scope)
            .cloned()
            .collect())
    }

    async fn scopes(&self, scope_type: ScopeType) -> Result<Vec<String>> {
        let mut scopes: Vec<_> = self
            .reports
            .read()
            .values()
            .filter(|r| r.scope_type == scope_type)
            .map(|r| r.scope.clone())
            .collect();
        scopes.sort();
        scopes.dedup();
        Ok(scopes)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    configs: Arc<RwLock<BTreeMap<String, ClientConfig>>>,
    backups: Arc<RwLock<BTreeMap<String, ConfigBackup>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn tokens(&self) -> Result<Vec<String>> {
        Ok(self.configs.read().keys().cloned().collect())
    }

    async fn get(&self, token: &str) -> Result<Option<ClientConfig>> {
        Ok(self.configs.read().get(token).cloned())
    }

    async fn replace(&self, token: &str, config: ClientConfig) -> Result<()> {
        self.configs.write().insert(token.to_string(), config);
        Ok(())
    }

    async fn save_backup(&self, backup: &ConfigBackup) -> Result<()> {
        self.backups.write().insert(backup.id.clone(), backup.clone());
        Ok(())
    }

    async fn backups(&self, token: &str) -> Result<Vec<String>> {
        let mut backups: Vec<_> = self
            .backups
            .read()
            .values()
            .filter(|b| b.token == token)
            .map(|b| (b.created_at, b.id.clone()))
            .collect();
        backups.sort();
        Ok(backups.into_iter().map(|(_, id)| id).collect())
    }

    async fn get_backup(&self, id: &str) -> Result<Option<ConfigBackup>> {
        Ok(self.backups.read().get(id).cloned())
    }
}
