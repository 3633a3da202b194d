//! # Remote System Client
//!
//! The system of record, as the sync engine sees it, and its HTTP
//! implementation.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     One Remote Call (HttpRemote)                        │
//! │                                                                         │
//! │  build request ──► send ──► 2xx ──────────────────────────► decode     │
//! │                      │                                                  │
//! │                      ├──► connect error / timeout / 5xx / 429          │
//! │                      │        │                                         │
//! │                      │        ▼                                         │
//! │                      │   ExponentialBackoff (500ms, 1s, 2s ... ≤ max)  │
//! │                      │   up to max_request_retries, then               │
//! │                      │   SyncError::Network / Timeout / Remote          │
//! │                      │                                                  │
//! │                      └──► 4xx ──► SyncError::Remote (no retry)         │
//! │                                   404 ──► SyncError::NotFound          │
//! │                                                                         │
//! │  Retries stay INSIDE one call. Undelivered orders are never given up   │
//! │  on here; the next drain sends them again.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    DeltaBatch, FullSnapshot, OrderPushResult, OrderUpload, PushOrdersRequest, PushOrdersResponse,
};

// =============================================================================
// Remote System Contract
// =============================================================================

/// What the sync engine needs from the system of record.
#[async_trait]
pub trait RemoteSystem: Send + Sync {
    /// Complete current catalog, customers, pricing and promotions.
    async fn pull_full_snapshot(&self, include_assets: bool) -> SyncResult<FullSnapshot>;

    /// Changes after `since`.
    async fn pull_deltas_since(&self, since: DateTime<Utc>) -> SyncResult<DeltaBatch>;

    /// Submits orders in one call. The reply carries one verdict per order.
    async fn push_orders(&self, batch: Vec<OrderUpload>) -> SyncResult<Vec<OrderPushResult>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// REST client for the remote system.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    device_id: String,
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl HttpRemote {
    /// Creates a client from the `[remote]` config section.
    ///
    /// ## Arguments
    /// * `config` - Remote settings (base URL, token, timeouts, retries)
    /// * `device_id` - Sent with every order push
    pub fn new(config: &RemoteConfig, device_id: impl Into<String>) -> SyncResult<Self> {
        let parsed = Url::parse(&config.base_url)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SyncError::InvalidUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {e}")))?;

        Ok(HttpRemote {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            device_id: device_id.into(),
            timeout: config.request_timeout(),
            max_retries: config.max_request_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}{path}`; `path` starts with `/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =========================================================================
    // Request Helpers (shared with RemoteDataSource)
    // =========================================================================

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        self.query_json(Method::GET, path, query).await
    }

    /// Bodyless request with a JSON response.
    pub(crate) async fn query_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let url = self.endpoint(path);
        let resp = self
            .send_with_retry(|| self.request(method.clone(), &url).query(query))
            .await?;
        Ok(resp.json::<T>().await?)
    }

    /// Like [`Self::get_json`], with 404 mapped to `None`.
    pub(crate) async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> SyncResult<Option<T>> {
        match self.get_json(path, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let resp = self
            .send_with_retry(|| self.request(method.clone(), &url).json(body))
            .await?;
        Ok(resp.json::<T>().await?)
    }

    /// Sends a request whose response body is ignored.
    pub(crate) async fn send_empty(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<()> {
        let url = self.endpoint(path);
        self.send_with_retry(|| self.request(method.clone(), &url).query(query))
            .await?;
        Ok(())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends, retrying transient failures with exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> SyncResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            let err = match self.send_once(build()).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }
            attempt += 1;

            match backoff.next_backoff() {
                Some(delay) => {
                    debug!(attempt, ?delay, error = %err, "Retrying remote request");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }

    async fn send_once(&self, request: RequestBuilder) -> SyncResult<Response> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.timeout.as_secs())
            } else {
                SyncError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let url = resp.url().to_string();
        let message = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(url));
        }

        warn!(status = status.as_u16(), url = %url, "Remote system returned an error");
        Err(SyncError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RemoteSystem for HttpRemote {
    async fn pull_full_snapshot(&self, include_assets: bool) -> SyncResult<FullSnapshot> {
        self.get_json("/sync/initial", &[("includeImages", include_assets.to_string())])
            .await
    }

    async fn pull_deltas_since(&self, since: DateTime<Utc>) -> SyncResult<DeltaBatch> {
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.get_json("/sync/updates", &[("since", since)]).await
    }

    async fn push_orders(&self, batch: Vec<OrderUpload>) -> SyncResult<Vec<OrderPushResult>> {
        let request = PushOrdersRequest {
            device_id: self.device_id.clone(),
            orders: batch,
        };
        let response: PushOrdersResponse = self
            .send_json(Method::POST, "/sync/orders", &request)
            .await?;
        Ok(response.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog_record, order_upload};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote_for(server: &MockServer) -> HttpRemote {
        let config = RemoteConfig {
            base_url: format!("{}/api/", server.uri()),
            api_token: Some("secret".to_string()),
            request_timeout_secs: 5,
            max_request_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_secs: 1,
        };
        HttpRemote::new(&config, "tablet-1").unwrap()
    }

    #[tokio::test]
    async fn test_pull_full_snapshot() {
        let server = MockServer::start().await;
        let snapshot = FullSnapshot {
            catalog: vec![catalog_record("p-1", None)],
            variants: vec![],
            customers: vec![],
            pricing: vec![],
            promotions: vec![],
            server_timestamp: Utc::now(),
        };

        Mock::given(method("GET"))
            .and(path("/api/sync/initial"))
            .and(query_param("includeImages", "true"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&snapshot))
            .expect(1)
            .mount(&server)
            .await;

        let pulled = remote_for(&server).pull_full_snapshot(true).await.unwrap();
        assert_eq!(pulled, snapshot);
    }

    #[tokio::test]
    async fn test_push_orders_sends_device_and_local_ids() {
        let server = MockServer::start().await;
        let upload = order_upload("local_1_abc");

        Mock::given(method("POST"))
            .and(path("/api/sync/orders"))
            .and(body_partial_json(json!({
                "deviceId": "tablet-1",
                "orders": [{ "localId": "local_1_abc" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "localId": "local_1_abc", "serverId": "srv-1" }]
            })))
            .mount(&server)
            .await;

        let results = remote_for(&server).push_orders(vec![upload]).await.unwrap();
        assert_eq!(results, vec![OrderPushResult::accepted("local_1_abc", "srv-1")]);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sync/updates"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = remote_for(&server)
            .pull_deltas_since(Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sync/updates"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired token"))
            .expect(1)
            .mount(&server)
            .await;

        let err = remote_for(&server)
            .pull_deltas_since(Utc::now())
            .await
            .unwrap_err();
        match err {
            SyncError::Remote { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "expired token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_a_network_error() {
        let config = RemoteConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            max_request_retries: 0,
            ..RemoteConfig::default()
        };
        let remote = HttpRemote::new(&config, "tablet-1").unwrap();

        let err = remote.pull_full_snapshot(false).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_) | SyncError::Timeout(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let config = RemoteConfig {
            base_url: "ftp://example.com".to_string(),
            ..RemoteConfig::default()
        };
        assert!(HttpRemote::new(&config, "tablet-1").is_err());
    }
}
