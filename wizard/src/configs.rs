//! Client configuration documents and metric metadata administration.
//!
//! Edits of one client's configuration are serialised by a per-token async lock, and every edit
//! first stores a backup of the document it replaces.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::db::models::configs::{ClientConfig, ConfigBackup};
use crate::db::models::metadata::{MetadataFilter, MetricMetadata};
use crate::errors::{Error, Result};
use crate::storage::{ConfigStore, MetadataStore};

#[derive(Clone)]
pub struct ConfigManager {
    configs: Arc<dyn ConfigStore>,
    metadata: Arc<dyn MetadataStore>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConfigManager {
    pub fn new(configs: Arc<dyn ConfigStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            configs,
            metadata,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, token: &str) -> Arc<Mutex<()>> {
        self.locks.entry(token.to_string()).or_default().clone()
    }

    pub async fn tokens(&self) -> Result<Vec<String>> {
        Ok(self.configs.tokens().await?)
    }

    pub async fn get_config(&self, token: &str) -> Result<ClientConfig> {
        self.configs.get(token).await?.ok_or_else(|| Error::NotFound {
            resource: "Client config".to_string(),
            id: token.to_string(),
        })
    }

    /// Replace the configuration of `token`, backing up the previous one first.
    ///
    /// A failed backup is logged and does not prevent the update.
    #[instrument(skip(self, config))]
    pub async fn set_config(&self, token: &str, config: ClientConfig) -> Result<()> {
        let lock = self.lock_for(token);
        let _guard = lock.lock().await;

        match self.configs.get(token).await {
            Ok(Some(previous)) => {
                let backup = ConfigBackup::new(token, previous, Utc::now());
                if let Err(e) = self.configs.save_backup(&backup).await {
                    warn!(error = %e, "Failed to back up client config");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read client config for backup"),
        }

        self.configs.replace(token, config).await?;
        info!("Client config updated");
        Ok(())
    }

    pub async fn list_backups(&self, token: &str) -> Result<Vec<String>> {
        Ok(self.configs.backups(token).await?)
    }

    pub async fn get_backup(&self, token: &str, backup_id: &str) -> Result<ConfigBackup> {
        let not_found = || Error::NotFound {
            resource: "Config backup".to_string(),
            id: backup_id.to_string(),
        };
        if !ConfigBackup::belongs_to(backup_id, token) {
            return Err(not_found());
        }
        match self.configs.get_backup(backup_id).await? {
            Some(backup) if backup.token == token => Ok(backup),
            _ => Err(not_found()),
        }
    }

    pub async fn list_metrics(&self, filter: &MetadataFilter) -> Result<Vec<String>> {
        Ok(self.metadata.list(filter).await?)
    }

    pub async fn get_metadata(&self, metric: &str) -> Result<MetricMetadata> {
        self.metadata.get(metric).await?.ok_or_else(|| Error::NotFound {
            resource: "Metric".to_string(),
            id: metric.to_string(),
        })
    }

    /// Delete the metadata of non-historic metrics. Historic and unknown ids are skipped.
    /// Returns the ids that were deleted.
    #[instrument(skip_all, fields(requested = metrics.len()))]
    pub async fn delete_metadata(&self, metrics: &[String]) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for metric in metrics {
            let Some(metadata) = self.metadata.get(metric).await? else {
                continue;
            };
            if metadata.historic() == Some(true) {
                info!(metric, "Not deleting metadata of historic metric");
                continue;
            }
            if self.metadata.delete(metric).await? {
                deleted.push(metric.clone());
            }
        }
        info!(deleted = deleted.len(), "Deleted metric metadata");
        Ok(deleted)
    }
}
