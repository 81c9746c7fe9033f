//! Legacy Xtream-Codes episode source
//!
//! Used when the Dispatcharr provider-info endpoint keeps failing for a
//! series. Requests go straight to the upstream panel with the account's own
//! credentials, so every URL is redacted before it reaches a log line.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use core_library::models::{Account, EpisodeInfo, EpisodeList, Series};
use core_library::{CatalogResult, FallbackClient};
use core_runtime::config::{CatalogApiConfig, SyncTuning};
use core_runtime::logging::redact_url;
use core_runtime::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{DispatcharrError, Result};
use crate::types::{flatten_episodes, loose_i64, loose_string, XcEpisode, XcSeriesInfo};

const DEFAULT_EXTENSION: &str = "mp4";

/// Credentials of an account that can reach the legacy API
struct LegacyLogin<'a> {
    server: &'a str,
    username: &'a str,
    password: &'a str,
}

impl<'a> LegacyLogin<'a> {
    fn from_account(account: &'a Account) -> Result<Self> {
        match (
            account.server_url.as_deref().map(str::trim),
            account.username.as_deref(),
            account.password.as_deref(),
        ) {
            (Some(server), Some(username), Some(password))
                if !server.is_empty() && !username.is_empty() && !password.is_empty() =>
            {
                Ok(Self {
                    server: server.trim_end_matches('/'),
                    username,
                    password,
                })
            }
            _ => Err(DispatcharrError::FallbackUnavailable(format!(
                "account '{}' has no legacy credentials",
                account.name
            ))),
        }
    }
}

/// Xtream-Codes `player_api.php` client
pub struct XtreamClient {
    http_client: Arc<dyn HttpClient>,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl XtreamClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        config: &CatalogApiConfig,
        tuning: &SyncTuning,
    ) -> Self {
        Self::with_clock(http_client, config, tuning, Arc::new(SystemClock))
    }

    pub fn with_clock(
        http_client: Arc<dyn HttpClient>,
        config: &CatalogApiConfig,
        tuning: &SyncTuning,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            rate_limiter: RateLimiter::shared(tuning.fallback_rate_limit_ms, clock),
            request_timeout: config.request_timeout,
            retry_policy: RetryPolicy::default()
                .with_max_attempts(tuning.retry_attempts.max(1))
                .with_base_delay(Duration::from_millis(tuning.retry_base_delay_ms)),
        }
    }

    async fn fetch(&self, login: &LegacyLogin<'_>, series_id: &str) -> Result<XcSeriesInfo> {
        let url = format!(
            "{}/player_api.php?username={}&password={}&action=get_series_info&series_id={}",
            login.server,
            urlencoding::encode(login.username),
            urlencoding::encode(login.password),
            urlencoding::encode(series_id)
        );

        self.rate_limiter.lock().await.wait_if_needed().await;

        let request = HttpRequest::new(HttpMethod::Get, url.clone())
            .header("Accept", "application/json")
            .timeout(self.request_timeout);
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;
        debug!(url = %redact_url(&url), status = response.status, "Legacy API GET");

        if !response.is_success() {
            return Err(DispatcharrError::from_status(
                response.status,
                &String::from_utf8_lossy(&response.body),
            ));
        }
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(XcSeriesInfo::default());
        }

        // Panels answer `[]` instead of an object for unknown series.
        let value: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| DispatcharrError::ParseError(format!("get_series_info: {}", e)))?;
        if !value.is_object() {
            return Ok(XcSeriesInfo::default());
        }
        serde_json::from_value(value)
            .map_err(|e| DispatcharrError::ParseError(format!("get_series_info: {}", e)))
    }

    fn convert(login: &LegacyLogin<'_>, info: XcSeriesInfo) -> EpisodeList {
        let Some(raw) = info.episodes else {
            return Vec::new();
        };

        let mut episodes: EpisodeList = flatten_episodes(&raw)
            .into_iter()
            .filter_map(|(season_key, row)| {
                let episode: XcEpisode = serde_json::from_value(row).ok()?;
                let id = episode.id.as_ref().and_then(loose_string)?;
                let number = episode
                    .episode_num
                    .as_ref()
                    .and_then(loose_i64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0);
                let season = episode
                    .season
                    .as_ref()
                    .and_then(loose_i64)
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|s| *s > 0)
                    .or(season_key)
                    .unwrap_or(0);
                let extension = episode
                    .container_extension
                    .as_deref()
                    .map(str::trim)
                    .filter(|ext| !ext.is_empty())
                    .unwrap_or(DEFAULT_EXTENSION);
                let title = episode
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Episode {}", number));
                let info = episode.info.unwrap_or_default();

                Some(EpisodeInfo {
                    stream_url: format!(
                        "{}/series/{}/{}/{}.{}",
                        login.server, login.username, login.password, id, extension
                    ),
                    id,
                    season,
                    episode: number,
                    title,
                    plot: info.plot.filter(|p| !p.trim().is_empty()),
                    air_date: info.releasedate.filter(|d| !d.trim().is_empty()),
                })
            })
            .collect();

        episodes.sort_by(|a, b| (a.season, a.episode).cmp(&(b.season, b.episode)));
        episodes
    }
}

#[async_trait]
impl FallbackClient for XtreamClient {
    #[instrument(skip(self, account, series), fields(account = %account.name, series_id = series.id))]
    async fn get_series_episodes(
        &self,
        account: &Account,
        series: &Series,
    ) -> CatalogResult<EpisodeList> {
        let login = LegacyLogin::from_account(account)?;
        let external_id = series
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                DispatcharrError::FallbackUnavailable(format!(
                    "series {} has no legacy id",
                    series.id
                ))
            })?;

        let info = self.fetch(&login, external_id).await?;
        let episodes = Self::convert(&login, info);
        info!("Legacy API returned {} episode(s)", episodes.len());
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use core_library::CatalogError;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn respond(status: u16, body: &str) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn client(mock: MockHttpClient) -> XtreamClient {
        let tuning = SyncTuning {
            fallback_rate_limit_ms: 0,
            ..SyncTuning::default()
        };
        XtreamClient::new(Arc::new(mock), &CatalogApiConfig::default(), &tuning)
    }

    fn account() -> Account {
        Account {
            id: 1,
            name: "Demo".to_string(),
            server_url: Some("http://panel.example:8080/".to_string()),
            username: Some("alice".to_string()),
            password: Some("pw".to_string()),
            account_type: Some("XC".to_string()),
        }
    }

    fn series(external_id: Option<&str>) -> Series {
        Series {
            id: 9,
            raw_title: "Dark".to_string(),
            year: None,
            category: None,
            external_id: external_id.map(str::to_string),
            plot: None,
            artwork_url: None,
        }
    }

    #[tokio::test]
    async fn test_series_info_is_converted() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|req| {
            assert_eq!(
                req.url,
                "http://panel.example:8080/player_api.php?username=alice&password=pw&action=get_series_info&series_id=4411"
            );
            respond(
                200,
                r#"{"info": {"name": "Dark"}, "episodes": {
                    "1": [
                        {"id": "102", "episode_num": 2, "title": "Lies", "container_extension": "mkv"},
                        {"id": 101, "episode_num": "1", "season": 1, "title": "Secrets",
                         "info": {"plot": "A boy vanishes.", "releasedate": "2017-12-01"}}
                    ],
                    "2": [{"id": "201", "episode_num": 1, "container_extension": ""}]
                }}"#,
            )
        });

        let episodes = client(mock)
            .get_series_episodes(&account(), &series(Some("4411")))
            .await
            .unwrap();

        assert_eq!(episodes.len(), 3);
        assert_eq!(episodes[0].id, "101");
        assert_eq!(episodes[0].plot.as_deref(), Some("A boy vanishes."));
        assert_eq!(
            episodes[0].stream_url,
            "http://panel.example:8080/series/alice/pw/101.mp4"
        );
        assert_eq!(
            episodes[1].stream_url,
            "http://panel.example:8080/series/alice/pw/102.mkv"
        );
        assert_eq!((episodes[2].season, episodes[2].episode), (2, 1));
        assert_eq!(episodes[2].title, "Episode 1");
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_the_request() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().never();
        let client = client(mock);

        let mut no_login = account();
        no_login.password = None;
        let err = client
            .get_series_episodes(&no_login, &series(Some("4411")))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Fatal(_)));

        let err = client
            .get_series_episodes(&account(), &series(None))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_unknown_series_yields_no_episodes() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| respond(200, "[]"));

        let episodes = client(mock)
            .get_series_episodes(&account(), &series(Some("1")))
            .await
            .unwrap();
        assert!(episodes.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_recoverable() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| respond(502, "bad gateway"));

        let err = client(mock)
            .get_series_episodes(&account(), &series(Some("1")))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
