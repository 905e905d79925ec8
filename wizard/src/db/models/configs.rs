use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Configuration document of one cluster client (source, transformer, database...).
pub type ClientConfig = Map<String, Value>;

/// Snapshot of a client configuration taken right before it was replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConfigBackup {
    /// `backup-<token>-<RFC3339 timestamp>`
    pub id: String,
    /// Client the configuration belonged to
    pub token: String,
    /// The configuration as it was before the change
    #[schema(value_type = Object)]
    pub config: ClientConfig,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl ConfigBackup {
    pub fn new(token: &str, config: ClientConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::backup_id(token, created_at),
            token: token.to_string(),
            config,
            created_at,
        }
    }

    pub fn backup_id(token: &str, created_at: DateTime<Utc>) -> String {
        format!(
            "backup-{token}-{}",
            created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        )
    }

    /// Whether `backup_id` names a backup of `token`.
    pub fn belongs_to(backup_id: &str, token: &str) -> bool {
        backup_id
            .strip_prefix("backup-")
            .and_then(|rest| rest.strip_prefix(token))
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Row shape of the `config_backups` table.
#[derive(Debug, Clone, FromRow)]
pub struct ConfigBackupRow {
    pub id: String,
    pub token: String,
    pub config: sqlx::types::Json<ClientConfig>,
    pub created_at: DateTime<Utc>,
}

impl From<ConfigBackupRow> for ConfigBackup {
    fn from(row: ConfigBackupRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            config: row.config.0,
            created_at: row.created_at,
        }
    }
}
