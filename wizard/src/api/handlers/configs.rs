use crate::{
    AppState,
    api::models::configs::{BackupListResponse, ClientListResponse},
    db::models::configs::{ClientConfig, ConfigBackup},
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/clients",
    tag = "clients",
    summary = "List clients",
    responses(
        (status = 200, description = "Tokens of all configured clients", body = ClientListResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_clients(State(state): State<AppState>) -> Result<Json<ClientListResponse>> {
    let clients = state.configs.tokens().await?;
    Ok(Json(ClientListResponse { clients }))
}

#[utoipa::path(
    get,
    path = "/client/{token}/config",
    tag = "clients",
    summary = "Get client config",
    params(("token" = String, Path, description = "Client token")),
    responses(
        (status = 200, description = "The configuration document", body = Object),
        (status = 404, description = "Client has no configuration"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(token = %token))]
pub async fn get_client_config(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<ClientConfig>> {
    Ok(Json(state.configs.get_config(&token).await?))
}

#[utoipa::path(
    put,
    path = "/client/{token}/config",
    tag = "clients",
    summary = "Replace client config",
    params(("token" = String, Path, description = "Client token")),
    request_body(content = Object, description = "The new configuration document"),
    responses(
        (status = 204, description = "Configuration replaced; the previous one was backed up"),
        (status = 400, description = "Body is not a JSON object"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(token = %token))]
pub async fn put_client_config(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(config): Json<ClientConfig>,
) -> Result<StatusCode> {
    state.configs.set_config(&token, config).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/client/{token}/config/backups",
    tag = "clients",
    summary = "List config backups",
    params(("token" = String, Path, description = "Client token")),
    responses(
        (status = 200, description = "Backup ids, oldest first", body = BackupListResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(token = %token))]
pub async fn list_config_backups(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<BackupListResponse>> {
    let backups = state.configs.list_backups(&token).await?;
    Ok(Json(BackupListResponse { backups }))
}

#[utoipa::path(
    get,
    path = "/client/{token}/config/backups/{backup_id}",
    tag = "clients",
    summary = "Get config backup",
    params(
        ("token" = String, Path, description = "Client token"),
        ("backup_id" = String, Path, description = "Backup id"),
    ),
    responses(
        (status = 200, description = "The backup", body = ConfigBackup),
        (status = 404, description = "No such backup for this client"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(token = %token, backup_id = %backup_id))]
pub async fn get_config_backup(
    State(state): State<AppState>,
    Path((token, backup_id)): Path<(String, String)>,
) -> Result<Json<ConfigBackup>> {
    Ok(Json(state.configs.get_backup(&token, &backup_id).await?))
}
