//! HTTP client on top of reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("vod-strm/", env!("CARGO_PKG_VERSION"));

/// URL without its query string
///
/// Legacy panel URLs carry account credentials as query parameters, so only
/// this form may appear in logs and error messages.
fn loggable_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Map a reqwest failure onto the bridge taxonomy, dropping the URL
fn classify(err: reqwest::Error, url: &str) -> BridgeError {
    let target = loggable_url(url);
    if err.is_timeout() {
        BridgeError::Timeout(target.to_string())
    } else if err.is_connect() || err.is_request() {
        BridgeError::Connection(format!("{}: {}", target, err.without_url()))
    } else {
        BridgeError::OperationFailed(format!("{}: {}", target, err.without_url()))
    }
}

/// `HttpClient` backed by a pooled reqwest client
///
/// Retries 5xx, 429 and transport failures with the policy's backoff. A
/// retryable status that outlives the last attempt is returned as a response
/// so callers can classify it.
pub struct ReqwestHttpClient {
    client: Client,
    default_policy: RetryPolicy,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(60))
    }

    /// Client whose requests time out after `timeout` unless the request
    /// sets its own
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_policy: RetryPolicy::default(),
        })
    }

    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }

    /// One attempt, body fully read
    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, &request.url))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, &request.url))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, self.default_policy.clone())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let target = loggable_url(&request.url);
        let mut attempt = 1;

        loop {
            debug!(attempt, attempts, url = target, "HTTP {:?}", request.method);

            let failure = match self.send_once(&request).await {
                Ok(response) if !response.is_retryable() || attempt == attempts => {
                    return Ok(response);
                }
                Ok(response) => format!("status {}", response.status),
                Err(e) if !e.is_transport() || attempt == attempts => return Err(e),
                Err(e) => e.to_string(),
            };

            let delay = policy.delay_for(attempt);
            warn!(
                attempt,
                url = target,
                delay_ms = delay.as_millis() as u64,
                "HTTP request failed ({}), retrying",
                failure
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loggable_url_drops_credentials() {
        assert_eq!(
            loggable_url("http://panel:8080/player_api.php?username=u&password=p"),
            "http://panel:8080/player_api.php"
        );
        assert_eq!(
            loggable_url("http://dispatcharr/api/m3u/accounts/"),
            "http://dispatcharr/api/m3u/accounts/"
        );
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Post), reqwest::Method::POST);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        let request = HttpRequest::new(
            HttpMethod::Get,
            "http://127.0.0.1:9/player_api.php?username=u&password=hunter2",
        );

        let err = client
            .execute_with_retry(request, RetryPolicy::none())
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(!err.to_string().contains("hunter2"));
    }
}
