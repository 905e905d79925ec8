//! HTTP adapter for the history gateway.
//!
//! - `GET {url}/metrics/{id}/last` answers `{"timestamp", "value"}`, or 404 when the metric has
//!   no stored values
//! - `GET {url}/metrics/{id}/aggregate?start=..&end=..` answers
//!   `{"minimum", "maximum", "count", "timestamp"}`

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::{Aggregate, HistoryClient, HistoryError, TimeValue};
use crate::config::HistoryConfig;

pub struct HttpHistoryClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpHistoryClient {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            token: config.token.clone(),
        }
    }

    fn endpoint(&self, metric: &str, action: &str) -> Result<Url, HistoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HistoryError::Query(format!("history url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["metrics", metric, action]);
        Ok(url)
    }

    /// Send a GET and decode the JSON answer. `Ok(None)` on 404.
    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Option<T>, HistoryError> {
        let mut request = self.client.get(url).query(query).timeout(timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(HistoryError::Query(format!("HTTP {} - {}", status.as_u16(), message)));
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| HistoryError::Query(format!("Failed to parse history response: {e}. Response body: {body}")))
    }
}

fn map_transport_error(e: reqwest::Error) -> HistoryError {
    if e.is_timeout() {
        HistoryError::Timeout
    } else {
        HistoryError::Query(e.to_string())
    }
}

#[async_trait]
impl HistoryClient for HttpHistoryClient {
    async fn last_value(&self, metric: &str, timeout: Duration) -> Result<Option<TimeValue>, HistoryError> {
        let url = self.endpoint(metric, "last")?;
        self.get(url, &[], timeout).await
    }

    async fn aggregate(
        &self,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Aggregate, HistoryError> {
        let url = self.endpoint(metric, "aggregate")?;
        let query = [
            ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        self.get(url, &query, timeout)
            .await?
            .ok_or_else(|| HistoryError::Query(format!("unknown metric {metric}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> HttpHistoryClient {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        HttpHistoryClient::new(&HistoryConfig {
            url: Url::parse(&server.uri()).unwrap(),
            token: token.map(str::to_string),
            request_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn last_value_decodes_and_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/room.a.power/last"))
            .and(header("authorization", "Bearer reader"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "timestamp": "2024-05-01T12:00:00Z",
                "value": 42.5
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("reader"));
        let value = client
            .last_value("room.a.power", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.value, 42.5);
        assert_eq!(value.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn last_value_404_means_no_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/empty.metric/last"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        assert_eq!(client.last_value("empty.metric", Duration::from_secs(5)).await, Ok(None));
    }

    #[tokio::test]
    async fn server_errors_become_query_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/broken.metric/last"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "database offline"})))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.last_value("broken.metric", Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, HistoryError::Query("HTTP 500 - database offline".to_string()));
    }

    #[tokio::test]
    async fn slow_answers_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/slow.metric/last"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"timestamp": "2024-05-01T12:00:00Z", "value": 1.0}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.last_value("slow.metric", Duration::from_millis(100)).await.unwrap_err();
        assert_eq!(err, HistoryError::Timeout);
    }

    #[tokio::test]
    async fn aggregate_sends_window_and_parses_infinities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/room.a.power/aggregate"))
            .and(query_param("start", "2024-04-24T00:00:00Z"))
            .and(query_param("end", "2024-05-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "minimum": "-inf",
                "maximum": 12.0,
                "count": 10,
                "timestamp": "2024-04-30T23:59:00Z"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let end = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let start = end - chrono::Duration::days(7);
        let agg = client
            .aggregate("room.a.power", start, end, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(agg.count, 10);
        assert!(agg.minimum.is_infinite());
        assert!(agg.has_non_finite());
    }
}
