//! Document stores behind the health scan, the issue API and the client configuration API.
//!
//! Each store is a trait with two implementations: [`postgres`] for deployments and
//! [`in_memory`] for tests and single-process development. Handlers and the scanner only ever
//! see `Arc<dyn ...>`, bundled in [`Stores`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::db::errors::Result;
use crate::db::models::configs::{ClientConfig, ConfigBackup};
use crate::db::models::issues::{IssueListQuery, IssueReport, ScopeType};
use crate::db::models::metadata::{MetadataFilter, MetricMetadata};

pub mod in_memory;
pub mod postgres;

#[cfg(test)]
mod tests;

/// Metric metadata documents keyed by metric id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Stream every metadata document. Errors are yielded in-stream; a consumer should treat
    /// one as the end of the stream.
    fn stream(&self) -> BoxStream<'_, Result<(String, MetricMetadata)>>;

    async fn get(&self, id: &str) -> Result<Option<MetricMetadata>>;

    /// Insert or replace the document of `id`.
    async fn put(&self, id: &str, metadata: MetricMetadata) -> Result<()>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Metric ids matching `filter`, ascending, at most `filter.limit` of them.
    async fn list(&self, filter: &MetadataFilter) -> Result<Vec<String>>;
}

/// Issue report documents keyed by their composite id.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<IssueReport>>;

    /// Insert or replace `report`. If a document with the same id exists, its
    /// `first_detection_date` is kept. Returns the document as stored.
    async fn upsert(&self, report: &IssueReport) -> Result<IssueReport>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// One page of matching reports plus the total number of matches.
    async fn list(&self, query: &IssueListQuery) -> Result<(Vec<IssueReport>, i64)>;

    /// All reports attached to one scope, ordered by id.
    async fn find_by_scope(&self, scope_type: ScopeType, scope: &str) -> Result<Vec<IssueReport>>;

    /// Distinct scopes that currently have at least one report.
    async fn scopes(&self, scope_type: ScopeType) -> Result<Vec<String>>;
}

/// Client configuration documents and their backups.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Tokens of all clients with a configuration, ascending.
    async fn tokens(&self) -> Result<Vec<String>>;

    async fn get(&self, token: &str) -> Result<Option<ClientConfig>>;

    /// Replace the whole document of `token`, creating it if needed.
    async fn replace(&self, token: &str, config: ClientConfig) -> Result<()>;

    async fn save_backup(&self, backup: &ConfigBackup) -> Result<()>;

    /// Backup ids of `token`, oldest first.
    async fn backups(&self, token: &str) -> Result<Vec<String>>;

    async fn get_backup(&self, id: &str) -> Result<Option<ConfigBackup>>;
}

/// The set of stores the application runs against.
#[derive(Clone)]
pub struct Stores {
    pub metadata: Arc<dyn MetadataStore>,
    pub issues: Arc<dyn IssueStore>,
    pub configs: Arc<dyn ConfigStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            metadata: Arc::new(in_memory::InMemoryMetadataStore::new()),
            issues: Arc::new(in_memory::InMemoryIssueStore::new()),
            configs: Arc::new(in_memory::InMemoryConfigStore::new()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            metadata: Arc::new(postgres::PostgresMetadataStore::new(pool.clone())),
            issues: Arc::new(postgres::PostgresIssueStore::new(pool.clone())),
            configs: Arc::new(postgres::PostgresConfigStore::new(pool)),
        }
    }
}
