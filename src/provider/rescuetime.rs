use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::utils::{clock::Clock, time::date_to_iso};

use super::{
    pacing::{with_retries, Pacer, RetryPolicy},
    HourlyKind, ProviderError, RawRow, StatsProvider,
};

pub const RESCUETIME_API_URL: &str = "https://www.rescuetime.com/anapi/data";

/// RescueTime allows roughly one request per second per key.
pub const MIN_CALL_INTERVAL: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the RescueTime analytic data API.
pub struct RescueTimeClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    pacer: Pacer,
    retry: RetryPolicy,
    clock: Box<dyn Clock>,
}

impl RescueTimeClient {
    pub fn new(api_key: String, clock: Box<dyn Clock>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key,
            base_url: RESCUETIME_API_URL.into(),
            client,
            pacer: Pacer::new(MIN_CALL_INTERVAL),
            retry: RetryPolicy::default(),
            clock,
        })
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    pub fn with_pacing(self, min_interval: Duration) -> Self {
        Self {
            pacer: Pacer::new(min_interval),
            ..self
        }
    }

    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    fn params(
        &self,
        perspective: &'static str,
        resolution: &'static str,
        restrict_kind: &'static str,
        date: NaiveDate,
    ) -> Vec<(&'static str, String)> {
        let date = date_to_iso(date);
        vec![
            ("key", self.api_key.clone()),
            ("format", "json".into()),
            ("perspective", perspective.into()),
            ("resolution_time", resolution.into()),
            ("restrict_begin", date.clone()),
            ("restrict_end", date),
            ("restrict_kind", restrict_kind.into()),
        ]
    }

    async fn call_api(&self, params: &[(&'static str, String)]) -> Result<Vec<RawRow>, ProviderError> {
        with_retries(self.clock.as_ref(), self.retry, || self.call_once(params)).await
    }

    async fn call_once(&self, params: &[(&'static str, String)]) -> Result<Vec<RawRow>, ProviderError> {
        self.pacer.wait_turn(self.clock.as_ref()).await;

        let response = self.client.get(&self.base_url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Provider answered {status} with {} bytes", body.len());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ProviderError::Unauthorized(body))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
            status if !status.is_success() => Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            }),
            _ => parse_rows(&body),
        }
    }
}

/// Extracts `rows` from a response body. The API reports some failures, like an unknown key,
/// inside a successful response.
pub(crate) fn parse_rows(body: &str) -> Result<Vec<RawRow>, ProviderError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return if error.contains("key") {
            Err(ProviderError::Unauthorized(error.to_string()))
        } else {
            Err(ProviderError::Decode(error.to_string()))
        };
    }

    let Some(rows) = value.get("rows").and_then(Value::as_array) else {
        return Err(ProviderError::Decode("response has no rows".into()));
    };

    rows.iter()
        .map(|row| match row {
            Value::Array(fields) => Ok(fields.clone()),
            other => Err(ProviderError::Decode(format!("row is not an array: {other}"))),
        })
        .collect()
}

#[async_trait]
impl StatsProvider for RescueTimeClient {
    #[instrument(skip(self))]
    async fn fetch_hourly(
        &self,
        kind: HourlyKind,
        date: NaiveDate,
    ) -> Result<Vec<RawRow>, ProviderError> {
        let params = self.params("interval", "hour", kind.restrict_kind(), date);
        self.call_api(&params).await
    }

    #[instrument(skip(self))]
    async fn fetch_daily_productivity(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RawRow>, ProviderError> {
        let params = self.params("rank", "day", HourlyKind::Productivity.restrict_kind(), date);
        self.call_api(&params).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use chrono::NaiveDate;
    use mockito::{Matcher, Server};
    use serde_json::json;

    use crate::{
        provider::{pacing::RetryPolicy, HourlyKind, ProviderError, StatsProvider},
        utils::clock::DefaultClock,
    };

    use super::{parse_rows, RescueTimeClient, MIN_CALL_INTERVAL};

    const DAY: NaiveDate = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

    fn test_client(server: &Server) -> RescueTimeClient {
        RescueTimeClient::new("test-key".into(), Box::new(DefaultClock))
            .unwrap()
            .with_base_url(format!("{}/anapi/data", server.url()))
            .with_pacing(Duration::ZERO)
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
            })
    }

    #[test]
    fn test_parse_rows() {
        let body = json!({
            "notes": "data is an array of arrays",
            "row_headers": ["Date", "Time Spent (seconds)", "Number of People", "Category"],
            "rows": [["2024-01-02T09:00:00", 120, 1, "Software Development"]]
        })
        .to_string();
        let rows = parse_rows(&body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][3], json!("Software Development"));
    }

    #[test]
    fn test_parse_rows_errors() {
        let unknown_key = json!({"error": "# key not found", "messages": "key not found"});
        assert!(matches!(
            parse_rows(&unknown_key.to_string()),
            Err(ProviderError::Unauthorized(_))
        ));
        assert!(matches!(
            parse_rows("<html>"),
            Err(ProviderError::Decode(_))
        ));
        assert!(matches!(
            parse_rows(&json!({"rows": [1, 2]}).to_string()),
            Err(ProviderError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_hourly_sends_expected_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/anapi/data")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "test-key".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
                Matcher::UrlEncoded("perspective".into(), "interval".into()),
                Matcher::UrlEncoded("resolution_time".into(), "hour".into()),
                Matcher::UrlEncoded("restrict_begin".into(), "2024-01-02".into()),
                Matcher::UrlEncoded("restrict_end".into(), "2024-01-02".into()),
                Matcher::UrlEncoded("restrict_kind".into(), "overview".into()),
            ]))
            .with_status(200)
            .with_body(json!({"rows": [["2024-01-02T10:00:00", 60, 1, "Reference & Learning"]]}).to_string())
            .create_async()
            .await;

        let rows = test_client(&server)
            .fetch_hourly(HourlyKind::Categories, DAY)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_daily_productivity_uses_rank_perspective() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/anapi/data")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("perspective".into(), "rank".into()),
                Matcher::UrlEncoded("resolution_time".into(), "day".into()),
                Matcher::UrlEncoded("restrict_kind".into(), "productivity".into()),
            ]))
            .with_status(200)
            .with_body(json!({"rows": [[1, 3600, 1, 2], [2, 600, 1, -2]]}).to_string())
            .create_async()
            .await;

        let rows = test_client(&server)
            .fetch_daily_productivity(DAY)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_surfaced() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/anapi/data")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .expect(2)
            .create_async()
            .await;

        let result = test_client(&server)
            .fetch_hourly(HourlyKind::Activities, DAY)
            .await;
        assert!(matches!(result, Err(ProviderError::Status { status: 502, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/anapi/data")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .expect(1)
            .create_async()
            .await;

        let result = test_client(&server)
            .fetch_hourly(HourlyKind::Productivity, DAY)
            .await;
        assert!(matches!(result, Err(ProviderError::Unauthorized(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_paced() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/anapi/data")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"rows": []}).to_string())
            .expect(2)
            .create_async()
            .await;
        let client = RescueTimeClient::new("test-key".into(), Box::new(DefaultClock))
            .unwrap()
            .with_base_url(format!("{}/anapi/data", server.url()));

        let started = Instant::now();
        client
            .fetch_hourly(HourlyKind::Activities, DAY)
            .await
            .unwrap();
        client
            .fetch_hourly(HourlyKind::Categories, DAY)
            .await
            .unwrap();
        assert!(started.elapsed() >= MIN_CALL_INTERVAL);
        mock.assert_async().await;
    }

    #[tokio::test]
    #[ignore] // Requires actual API key
    async fn test_live_hourly_activities() {
        let api_key = std::env::var("RESCUETIME_API_KEY").expect("RESCUETIME_API_KEY not set");
        let client = RescueTimeClient::new(api_key, Box::new(DefaultClock)).unwrap();
        let rows = client
            .fetch_hourly(HourlyKind::Activities, DAY)
            .await
            .unwrap();
        assert!(rows.iter().all(|row| row[0].is_string()));
    }
}
