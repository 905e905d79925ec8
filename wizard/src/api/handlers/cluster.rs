use crate::{
    AppState,
    api::models::{
        issues::{ListIssuesQuery, MetricIssuesResponse, ScanRequestResponse},
        pagination::PaginatedResponse,
    },
    db::models::issues::{IssueReport, ScopeType},
    errors::{Error, Result},
    health::{ScanError, ScanStatus},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

/// Start a cluster health scan in the background.
#[utoipa::path(
    post,
    path = "/cluster/health_scan",
    tag = "cluster",
    summary = "Start health scan",
    responses(
        (status = 202, description = "Scan started", body = ScanRequestResponse),
        (status = 429, description = "A scan is already running", body = ScanRequestResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn start_health_scan(State(state): State<AppState>) -> Result<(StatusCode, Json<ScanRequestResponse>)> {
    match state.scanner.trigger() {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(ScanRequestResponse {
                status: "created".to_string(),
            }),
        )),
        Err(ScanError::AlreadyRunning) => Err(Error::TooManyRequests {
            operation: "Health scan".to_string(),
        }),
        Err(ScanError::Aborted(e)) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/cluster/health_scan",
    tag = "cluster",
    summary = "Health scan status",
    responses(
        (status = 200, description = "Progress of the running scan or outcome of the last one", body = ScanStatus),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_health_scan(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.scanner.status())
}

#[utoipa::path(
    get,
    path = "/cluster/issues",
    tag = "cluster",
    summary = "List issues",
    params(ListIssuesQuery),
    responses(
        (status = 200, description = "One page of issue reports", body = PaginatedResponse<IssueReport>),
        (status = 400, description = "Invalid query"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<ListIssuesQuery>,
) -> Result<Json<PaginatedResponse<IssueReport>>> {
    let store_query = query.to_store_query();
    let (issues, total_count) = state.issues.list(&store_query).await?;
    Ok(Json(PaginatedResponse::new(
        issues,
        total_count,
        store_query.skip,
        store_query.limit,
    )))
}

#[utoipa::path(
    delete,
    path = "/cluster/issues/{issue_id}",
    tag = "cluster",
    summary = "Dismiss issue",
    params(("issue_id" = String, Path, description = "Issue id, `<type>-<scope_type>-<scope>`")),
    responses(
        (status = 204, description = "Issue removed, or it did not exist"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(issue_id = %issue_id))]
pub async fn delete_issue(State(state): State<AppState>, Path(issue_id): Path<String>) -> Result<StatusCode> {
    state.issues.delete(&issue_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/metric/{metric_id}/issues",
    tag = "cluster",
    summary = "Issues of one metric",
    params(("metric_id" = String, Path, description = "Metric id")),
    responses(
        (status = 200, description = "All issue reports of the metric", body = MetricIssuesResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_metric_issues(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
) -> Result<Json<MetricIssuesResponse>> {
    let issues = state.issues.for_scope(ScopeType::Metric, &metric_id).await?;
    Ok(Json(MetricIssuesResponse { issues }))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            issues::{MetricIssuesResponse, ScanRequestResponse},
            pagination::PaginatedResponse,
        },
        db::models::{issues::IssueReport, metadata::MetricMetadata},
        health::ScanStatus,
        history::TimeValue,
        test_utils::*,
    };
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn metadata(value: serde_json::Value) -> MetricMetadata {
        serde_json::from_value(value).unwrap()
    }

    async fn wait_for_scan(app: &axum_test::TestServer) -> ScanStatus {
        for _ in 0..200 {
            let status: ScanStatus = app.get("/api/cluster/health_scan").await.json();
            if !status.running && status.finished_at.is_some() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("health scan did not finish");
    }

    #[test_log::test(tokio::test)]
    async fn test_health_scan_creates_issues() {
        let harness = TestHarness::new();
        harness
            .stores
            .metadata
            .put(
                "room.a.power",
                metadata(json!({"historic": true, "rate": 1.0, "source": "s", "description": "d", "unit": "W"})),
            )
            .await
            .unwrap();
        harness.stores.metadata.put("room.b.power", metadata(json!({}))).await.unwrap();
        harness.history.set_last_value(
            "room.a.power",
            Ok(Some(TimeValue {
                timestamp: Utc::now() - chrono::Duration::hours(1),
                value: 3.0,
            })),
        );
        let app = harness.server();

        let response = app.post("/api/cluster/health_scan").await;
        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(response.json::<ScanRequestResponse>().status, "created");

        let status = wait_for_scan(&app).await;
        assert_eq!(status.metrics_seen, 2);
        assert_eq!(status.checks_failed, 0);

        let page: PaginatedResponse<IssueReport> = app.get("/api/cluster/issues?sort=severity").await.json();
        let ids: Vec<_> = page.data.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(page.total_count, 3);
        assert_eq!(
            ids,
            [
                "dead-metric-room.a.power",
                "missing_metadata-metric-room.b.power",
                "missing_historic-metric-room.b.power",
            ]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_second_scan_request_is_rejected_while_running() {
        let harness = TestHarness::new();
        harness
            .stores
            .metadata
            .put("slow.metric", metadata(json!({"historic": true})))
            .await
            .unwrap();
        harness.history.set_delay(Duration::from_millis(300));
        let app = harness.server();

        app.post("/api/cluster/health_scan").await.assert_status(StatusCode::ACCEPTED);

        let rejected = app.post("/api/cluster/health_scan").await;
        rejected.assert_status(StatusCode::TOO_MANY_REQUESTS);
        rejected.assert_json(&json!({"status": "already running"}));

        let status: ScanStatus = app.get("/api/cluster/health_scan").await.json();
        assert!(status.running);

        wait_for_scan(&app).await;
        app.post("/api/cluster/health_scan").await.assert_status(StatusCode::ACCEPTED);
    }

    #[test_log::test(tokio::test)]
    async fn test_issue_filters_pagination_and_delete() {
        let harness = TestHarness::new();
        for metric in ["a.metric", "b.metric", "c.metric"] {
            harness.stores.metadata.put(metric, metadata(json!({}))).await.unwrap();
        }
        harness.scanner().run_once().await.unwrap();
        let app = harness.server();

        let page: PaginatedResponse<IssueReport> = app
            .get("/api/cluster/issues?type=missing_historic&limit=2&skip=1&sort=scope&descending=true")
            .await
            .json();
        assert_eq!(page.total_count, 3);
        assert_eq!((page.skip, page.limit), (1, 2));
        let scopes: Vec<_> = page.data.iter().map(|r| r.scope.as_str()).collect();
        assert_eq!(scopes, ["b.metric", "a.metric"]);

        app.delete("/api/cluster/issues/missing_historic-metric-a.metric")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        // Dismissing twice is fine
        app.delete("/api/cluster/issues/missing_historic-metric-a.metric")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let issues: MetricIssuesResponse = app.get("/api/metric/a.metric/issues").await.json();
        assert_eq!(issues.issues.len(), 1);
        assert_eq!(issues.issues[0].id, "missing_metadata-metric-a.metric");

        app.get("/api/cluster/issues?type=bogus")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
