//! PostgreSQL stores.
//!
//! Documents are stored as JSONB next to the columns they are queried by (see `migrations/`).
//! Queries are checked at runtime so the crate builds without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use super::{ConfigStore, IssueStore, MetadataStore};
use crate::db::errors::{DbError, Result};
use crate::db::models::configs::{ClientConfig, ConfigBackup, ConfigBackupRow};
use crate::db::models::issues::{IssueListQuery, IssueReport, IssueSort, IssueType, ScopeType, Severity};
use crate::db::models::metadata::{MetadataFilter, MetricMetadata};

#[derive(sqlx::FromRow)]
struct MetadataRow {
    id: String,
    document: Json<Map<String, Value>>,
}

#[derive(sqlx::FromRow)]
struct IssueRow {
    id: String,
    issue_type: IssueType,
    scope_type: ScopeType,
    scope: String,
    severity: Severity,
    first_detection_date: DateTime<Utc>,
    date: DateTime<Utc>,
    fields: Json<Map<String, Value>>,
}

impl From<IssueRow> for IssueReport {
    fn from(row: IssueRow) -> Self {
        Self {
            id: row.id,
            issue_type: row.issue_type,
            scope_type: row.scope_type,
            scope: row.scope,
            severity: row.severity,
            first_detection_date: row.first_detection_date,
            date: row.date,
            fields: row.fields.0,
        }
    }
}

const ISSUE_COLUMNS: &str = "id, issue_type, scope_type, scope, severity, first_detection_date, date, fields";

/// Metric metadata in the `metadata` table.
#[derive(Clone)]
pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    fn stream(&self) -> BoxStream<'_, Result<(String, MetricMetadata)>> {
        sqlx::query_as::<_, MetadataRow>("SELECT id, document FROM metadata ORDER BY id")
            .fetch(&self.pool)
            .map(|row| {
                row.map(|row| (row.id, MetricMetadata(row.document.0)))
                    .map_err(DbError::from)
            })
            .boxed()
    }

    async fn get(&self, id: &str) -> Result<Option<MetricMetadata>> {
        let row = sqlx::query_as::<_, MetadataRow>("SELECT id, document FROM metadata WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| MetricMetadata(row.document.0)))
    }

    async fn put(&self, id: &str, metadata: MetricMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metadata (id, document) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()
            "#,
        )
        .bind(id)
        .bind(Json(metadata.0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM metadata WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &MetadataFilter) -> Result<Vec<String>> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM metadata
            WHERE ($1::text IS NULL OR left(id, length($1)) = $1)
              AND ($2::boolean IS NULL OR COALESCE(document -> 'historic' = 'true'::jsonb, false) = $2)
              AND ($3::text IS NULL OR (jsonb_typeof(document -> 'source') = 'string' AND document ->> 'source' = $3))
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(filter.prefix.as_deref())
        .bind(filter.historic)
        .bind(filter.source.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

/// Issue reports in the `issues` table.
#[derive(Clone)]
pub struct PostgresIssueStore {
    pool: PgPool,
}

impl PostgresIssueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_clause(query: &IssueListQuery) -> String {
    let column = match query.sort {
        IssueSort::Id => None,
        IssueSort::Severity => {
            Some("CASE severity WHEN 'error' THEN 1 WHEN 'warning' THEN 2 ELSE 3 END")
        }
        IssueSort::Scope => Some("scope"),
        IssueSort::IssueType => Some("issue_type"),
    };
    let direction = if query.descending { "DESC" } else { "ASC" };
    match column {
        Some(column) => format!("ORDER BY {column} {direction}, id {direction}"),
        None => format!("ORDER BY id {direction}"),
    }
}

#[async_trait]
impl IssueStore for PostgresIssueStore {
    async fn get(&self, id: &str) -> Result<Option<IssueReport>> {
        let row = sqlx::query_as::<_, IssueRow>(&format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(IssueReport::from))
    }

    async fn upsert(&self, report: &IssueReport) -> Result<IssueReport> {
        // first_detection_date is deliberately absent from the update list
        let row = sqlx::query_as::<_, IssueRow>(&format!(
            r#"
            INSERT INTO issues (id, issue_type, scope_type, scope, severity, first_detection_date, date, fields)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                severity = EXCLUDED.severity,
                date = EXCLUDED.date,
                fields = EXCLUDED.fields
            RETURNING {ISSUE_COLUMNS}
            "#
        ))
        .bind(&report.id)
        .bind(report.issue_type)
        .bind(report.scope_type)
        .bind(&report.scope)
        .bind(report.severity)
        .bind(report.first_detection_date)
        .bind(report.date)
        .bind(Json(&report.fields))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM issues WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &IssueListQuery) -> Result<(Vec<IssueReport>, i64)> {
        const FILTER: &str = r#"
            WHERE ($1::text IS NULL OR issue_type = $1)
              AND ($2::text IS NULL OR severity = $2)
              AND ($3::text IS NULL OR scope_type = $3)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM issues {FILTER}"))
            .bind(query.issue_type)
            .bind(query.severity)
            .bind(query.scope_type)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues {FILTER} {} OFFSET $4 LIMIT $5",
            order_clause(query)
        ))
        .bind(query.issue_type)
        .bind(query.severity)
        .bind(query.scope_type)
        .bind(query.skip.max(0))
        .bind(query.limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(IssueReport::from).collect(), total))
    }

    async fn find_by_scope(&self, scope_type: ScopeType, scope: &str) -> Result<Vec<IssueReport>> {
        let rows = sqlx::query_as::<_, IssueRow>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE scope_type = $1 AND scope = $2 ORDER BY id"
        ))
        .bind(scope_type)
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(IssueReport::from).collect())
    }

    async fn scopes(&self, scope_type: ScopeType) -> Result<Vec<String>> {
        let scopes = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT scope FROM issues WHERE scope_type = $1 ORDER BY scope",
        )
        .bind(scope_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(scopes)
    }
}

/// Client configurations in `client_configs`, backups in `config_backups`.
#[derive(Clone)]
pub struct PostgresConfigStore {
    pool: PgPool,
}

impl PostgresConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PostgresConfigStore {
    async fn tokens(&self) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>("SELECT token FROM client_configs ORDER BY token")
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens)
    }

    async fn get(&self, token: &str) -> Result<Option<ClientConfig>> {
        let config = sqlx::query_scalar::<_, Json<ClientConfig>>("SELECT config FROM client_configs WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(config.map(|c| c.0))
    }

    async fn replace(&self, token: &str, config: ClientConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO client_configs (token, config) VALUES ($1, $2)
            ON CONFLICT (token) DO UPDATE SET config = EXCLUDED.config, updated_at = NOW()
            "#,
        )
        .bind(token)
        .bind(Json(config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_backup(&self, backup: &ConfigBackup) -> Result<()> {
        sqlx::query("INSERT INTO config_backups (id, token, config, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&backup.id)
            .bind(&backup.token)
            .bind(Json(&backup.config))
            .bind(backup.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn backups(&self, token: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM config_backups WHERE token = $1 ORDER BY created_at, id",
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_backup(&self, id: &str) -> Result<Option<ConfigBackup>> {
        let row = sqlx::query_as::<_, ConfigBackupRow>(
            "SELECT id, token, config, created_at FROM config_backups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ConfigBackup::from))
    }
}
