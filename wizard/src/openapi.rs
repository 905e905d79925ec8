//! OpenAPI document of the `/api` surface, served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::api;
use crate::db::models::{
    configs::ConfigBackup,
    issues::{IssueReport, IssueSort, IssueType, ScopeType, Severity},
    metadata::MetricMetadata,
};
use crate::health::ScanStatus;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "wizard",
        description = "Configuration and health-scan backend for a metric-collection cluster"
    ),
    servers(
        (url = "/api", description = "Wizard API")
    ),
    paths(
        api::handlers::cluster::start_health_scan,
        api::handlers::cluster::get_health_scan,
        api::handlers::cluster::list_issues,
        api::handlers::cluster::delete_issue,
        api::handlers::cluster::get_metric_issues,
        api::handlers::metrics::list_metrics,
        api::handlers::metrics::get_metric,
        api::handlers::metrics::delete_metrics,
        api::handlers::configs::list_clients,
        api::handlers::configs::get_client_config,
        api::handlers::configs::put_client_config,
        api::handlers::configs::list_config_backups,
        api::handlers::configs::get_config_backup,
    ),
    components(
        schemas(
            IssueReport,
            IssueType,
            IssueSort,
            Severity,
            ScopeType,
            MetricMetadata,
            ConfigBackup,
            ScanStatus,
            api::models::issues::ScanRequestResponse,
            api::models::issues::MetricIssuesResponse,
            api::models::metrics::DeleteMetricsRequest,
            api::models::metrics::DeleteMetricsResponse,
            api::models::configs::ClientListResponse,
            api::models::configs::BackupListResponse,
        )
    ),
    tags(
        (name = "cluster", description = "Health scans and issue reports"),
        (name = "metrics", description = "Metric metadata"),
        (name = "clients", description = "Client configurations and their backups"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/cluster/health_scan",
            "/cluster/issues",
            "/cluster/issues/{issue_id}",
            "/metric/{metric_id}/issues",
            "/metrics",
            "/metric/{metric_id}",
            "/metrics/delete",
            "/clients",
            "/client/{token}/config",
            "/client/{token}/config/backups",
            "/client/{token}/config/backups/{backup_id}",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
