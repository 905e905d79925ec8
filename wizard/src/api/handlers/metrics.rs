use crate::{
    AppState,
    api::models::metrics::{DeleteMetricsRequest, DeleteMetricsResponse, ListMetricsQuery},
    db::models::metadata::MetricMetadata,
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    summary = "List metrics",
    params(ListMetricsQuery),
    responses(
        (status = 200, description = "Matching metric ids, ascending", body = Vec<String>),
        (status = 400, description = "Invalid query"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_metrics(
    State(state): State<AppState>,
    Query(query): Query<ListMetricsQuery>,
) -> Result<Json<Vec<String>>> {
    let metrics = state.configs.list_metrics(&query.to_filter()).await?;
    Ok(Json(metrics))
}

#[utoipa::path(
    get,
    path = "/metric/{metric_id}",
    tag = "metrics",
    summary = "Get metric metadata",
    params(("metric_id" = String, Path, description = "Metric id")),
    responses(
        (status = 200, description = "The metadata document", body = MetricMetadata),
        (status = 404, description = "Unknown metric"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_metric(State(state): State<AppState>, Path(metric_id): Path<String>) -> Result<Json<MetricMetadata>> {
    Ok(Json(state.configs.get_metadata(&metric_id).await?))
}

#[utoipa::path(
    post,
    path = "/metrics/delete",
    tag = "metrics",
    summary = "Delete metric metadata",
    request_body = DeleteMetricsRequest,
    responses(
        (status = 200, description = "Ids whose metadata was removed", body = DeleteMetricsResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_metrics(
    State(state): State<AppState>,
    Json(request): Json<DeleteMetricsRequest>,
) -> Result<Json<DeleteMetricsResponse>> {
    let deleted = state.configs.delete_metadata(&request.metrics).await?;
    Ok(Json(DeleteMetricsResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use crate::{api::models::metrics::DeleteMetricsResponse, db::models::metadata::MetricMetadata, test_utils::*};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    async fn seeded() -> TestHarness {
        let harness = TestHarness::new();
        for (id, md) in [
            ("room.a.power", json!({"historic": true, "source": "source-a"})),
            ("room.a.temp", json!({"historic": false, "source": "source-a"})),
            ("room.b.power", json!({"historic": true, "source": "source-b"})),
            ("hall.light", json!({})),
        ] {
            let md: MetricMetadata = serde_json::from_value(md).unwrap();
            harness.stores.metadata.put(id, md).await.unwrap();
        }
        harness
    }

    #[test_log::test(tokio::test)]
    async fn test_list_metrics_with_filters() {
        let app = seeded().await.server();

        let all: Vec<String> = app.get("/api/metrics").await.json();
        assert_eq!(all, ["hall.light", "room.a.power", "room.a.temp", "room.b.power"]);

        let prefixed: Vec<String> = app.get("/api/metrics?prefix=room.a").await.json();
        assert_eq!(prefixed, ["room.a.power", "room.a.temp"]);

        let historic: Vec<String> = app.get("/api/metrics?historic=true&source=source-a").await.json();
        assert_eq!(historic, ["room.a.power"]);

        let not_historic: Vec<String> = app.get("/api/metrics?historic=false").await.json();
        assert_eq!(not_historic, ["hall.light", "room.a.temp"]);

        let limited: Vec<String> = app.get("/api/metrics?limit=2").await.json();
        assert_eq!(limited, ["hall.light", "room.a.power"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_get_metric() {
        let app = seeded().await.server();

        let response = app.get("/api/metric/room.b.power").await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({"historic": true, "source": "source-b"})
        );

        app.get("/api/metric/room.c.power").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_metrics_keeps_historic() {
        let harness = seeded().await;
        let app = harness.server();

        let response = app
            .post("/api/metrics/delete")
            .json(&json!({"metrics": ["room.a.power", "room.a.temp", "hall.light", "unknown.metric"]}))
            .await;
        response.assert_status_ok();
        let body: DeleteMetricsResponse = response.json();
        assert_eq!(body.deleted, ["room.a.temp", "hall.light"]);

        let remaining: Vec<String> = app.get("/api/metrics").await.json();
        assert_eq!(remaining, ["room.a.power", "room.b.power"]);
    }
}
