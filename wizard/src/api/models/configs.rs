//! API models for client configurations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClientListResponse {
    /// Tokens of all clients with a stored configuration
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackupListResponse {
    /// Backup ids, oldest first
    #[schema(example = json!(["backup-source-a-2024-05-01T12:00:00.000000Z"]))]
    pub backups: Vec<String>,
}
