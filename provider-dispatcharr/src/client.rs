//! Dispatcharr API connector
//!
//! Implements [`CatalogClient`] over the JWT-protected Dispatcharr REST API.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use core_library::models::{Account, EpisodeInfo, EpisodeList, Movie, ProviderInfo, Series};
use core_library::{CatalogClient, CatalogResult};
use core_runtime::config::{CatalogApiConfig, SyncTuning};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{DispatcharrError, Result};
use crate::types::{
    flatten_episodes, ApiAccount, ApiEpisode, ApiVodItem, Listing, ProviderInfoResponse,
    TokenRequest, TokenResponse,
};

const TOKEN_PATH: &str = "/api/accounts/token/";
const ACCOUNTS_PATH: &str = "/api/m3u/accounts/";
const MOVIES_PATH: &str = "/api/vod/movies/";
const SERIES_PATH: &str = "/api/vod/series/";

/// Host part of the base URL, as used in proxy stream URLs
pub fn proxy_host(base_url: &str) -> String {
    let trimmed = base_url.trim();
    let lower = trimmed.to_ascii_lowercase();
    let without_scheme = if lower.starts_with("https://") {
        &trimmed[8..]
    } else if lower.starts_with("http://") {
        &trimmed[7..]
    } else {
        trimmed
    };
    without_scheme.trim().trim_matches('/').to_string()
}

/// Dispatcharr API connector
///
/// # Features
///
/// - JWT login on first use, repeated once when the token is rejected
/// - DRF pagination for movie and series listings
/// - Proxy stream URLs for movies and episodes
/// - Bounded retry on 5xx and 429 through the `HttpClient` retry policy
///
/// # Example
///
/// ```ignore
/// use provider_dispatcharr::DispatcharrClient;
/// use core_library::CatalogClient;
///
/// let client = DispatcharrClient::new(http_client, &config.catalog, &config.tuning);
/// let accounts = client.list_accounts().await?;
/// ```
pub struct DispatcharrClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    proxy_host: String,
    username: String,
    password: String,
    movie_page_size: u32,
    series_page_size: u32,
    series_max_pages: u32,
    request_timeout: Duration,
    provider_info_timeout: Duration,
    retry_policy: RetryPolicy,
    access_token: Mutex<Option<String>>,
}

impl DispatcharrClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        config: &CatalogApiConfig,
        tuning: &SyncTuning,
    ) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            http_client,
            proxy_host: proxy_host(&base_url),
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            movie_page_size: config.movie_page_size.max(1),
            series_page_size: config.series_page_size.max(1),
            series_max_pages: config.series_max_pages.max(1),
            request_timeout: config.request_timeout,
            provider_info_timeout: config.provider_info_timeout,
            retry_policy: RetryPolicy::default()
                .with_max_attempts(tuning.retry_attempts.max(1))
                .with_base_delay(Duration::from_millis(tuning.retry_base_delay_ms)),
            access_token: Mutex::new(None),
        }
    }

    /// Obtain a fresh access token
    #[instrument(skip(self))]
    async fn login(&self) -> Result<String> {
        let request = HttpRequest::new(HttpMethod::Post, format!("{}{}", self.base_url, TOKEN_PATH))
            .json(&TokenRequest {
                username: &self.username,
                password: &self.password,
            })?
            .timeout(self.request_timeout);

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| DispatcharrError::LoginFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(DispatcharrError::LoginFailed(format!(
                "token endpoint answered status {}",
                response.status
            )));
        }

        let body: TokenResponse = response
            .json()
            .map_err(|e| DispatcharrError::LoginFailed(e.to_string()))?;
        let token = body
            .access
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DispatcharrError::LoginFailed("response carried no access token".to_string()))?;

        info!("Logged in to Dispatcharr as {}", self.username);
        Ok(token)
    }

    /// Cached access token, logging in when there is none
    async fn token(&self) -> Result<String> {
        let mut guard = self.access_token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        if params.is_empty() {
            return format!("{}{}", self.base_url, path);
        }
        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();
        format!("{}{}?{}", self.base_url, path, query.join("&"))
    }

    /// GET a JSON document; an empty body reads as `{}`
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let url = self.url(path, params);
        let mut relogged = false;

        loop {
            let request = HttpRequest::new(HttpMethod::Get, url.clone())
                .bearer_token(self.token().await?)
                .header("Accept", "application/json")
                .timeout(timeout);

            let response = self
                .http_client
                .execute_with_retry(request, self.retry_policy.clone())
                .await?;
            debug!(url = %url, status = response.status, "API GET");

            if response.status == 401 && !relogged {
                warn!("Access token rejected, logging in again");
                *self.access_token.lock().await = None;
                relogged = true;
                continue;
            }

            if !response.is_success() {
                return Err(DispatcharrError::from_status(
                    response.status,
                    &String::from_utf8_lossy(&response.body),
                ));
            }

            let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
                b"{}"
            } else {
                &response.body
            };
            return serde_json::from_slice(body)
                .map_err(|e| DispatcharrError::ParseError(format!("{}: {}", path, e)));
        }
    }

    /// Walk a DRF list endpoint
    ///
    /// Stops on an empty page, a short page, a page without `next`, or after
    /// `max_pages`.
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        page_size: u32,
        max_pages: Option<u32>,
    ) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut query = params.to_vec();
            query.push(("page", page.to_string()));
            query.push(("page_size", page_size.to_string()));

            let listing: Listing<T> = self.get_json(path, &query, self.request_timeout).await?;
            let (batch, has_next) = listing.into_parts();
            debug!(path, page, rows = batch.len(), "Fetched page");

            if batch.is_empty() {
                break;
            }
            let short = batch.len() < page_size as usize;
            rows.extend(batch);
            if short || has_next == Some(false) {
                break;
            }

            page += 1;
            if max_pages.is_some_and(|max| page > max) {
                warn!(path, "Reached page limit, stopping pagination");
                break;
            }
        }

        Ok(rows)
    }

    fn convert_account(account: ApiAccount) -> Account {
        Account {
            name: account
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Account-{}", account.id)),
            id: account.id,
            server_url: account.server_url,
            username: account.username,
            password: account.password,
            account_type: account.account_type,
        }
    }

    fn convert_movie(&self, item: ApiVodItem) -> Option<Movie> {
        let Some(uuid) = item.uuid.clone().filter(|u| !u.trim().is_empty()) else {
            debug!(movie_id = item.id, "Skipping movie without uuid");
            return None;
        };

        Some(Movie {
            id: item.id,
            raw_title: item
                .display_name()
                .unwrap_or_else(|| format!("Movie-{}", item.id)),
            year: item.year(),
            category: item.category(),
            stream_url: format!("http://{}/proxy/vod/movie/{}", self.proxy_host, uuid),
            plot: item.plot(),
            artwork_url: item.artwork_url(),
            uuid,
        })
    }

    fn convert_series(item: ApiVodItem) -> Series {
        Series {
            id: item.id,
            raw_title: item
                .display_name()
                .unwrap_or_else(|| format!("Series-{}", item.id)),
            year: item.year(),
            category: item.category(),
            external_id: item.external_id(),
            plot: item.plot(),
            artwork_url: item.artwork_url(),
        }
    }

    /// Episodes with a uuid, sorted by season then number
    fn convert_episodes(&self, response: ProviderInfoResponse) -> EpisodeList {
        let Some(raw) = response.episodes else {
            return Vec::new();
        };

        let mut episodes: EpisodeList = flatten_episodes(&raw)
            .into_iter()
            .filter_map(|(season_key, row)| {
                let episode: ApiEpisode = serde_json::from_value(row).ok()?;
                let Some(uuid) = episode.uuid.clone().filter(|u| !u.trim().is_empty()) else {
                    debug!("Skipping episode without uuid");
                    return None;
                };
                let season = match episode.season() {
                    0 => season_key.unwrap_or(0),
                    season => season,
                };
                Some(EpisodeInfo {
                    stream_url: format!("http://{}/proxy/vod/episode/{}", self.proxy_host, uuid),
                    id: uuid,
                    season,
                    episode: episode.number(),
                    title: episode.title(),
                    plot: episode.plot(),
                    air_date: episode.air_date.clone(),
                })
            })
            .collect();

        episodes.sort_by(|a, b| (a.season, a.episode).cmp(&(b.season, b.episode)));
        episodes
    }
}

#[async_trait]
impl CatalogClient for DispatcharrClient {
    #[instrument(skip(self))]
    async fn list_accounts(&self) -> CatalogResult<Vec<Account>> {
        let listing: Listing<ApiAccount> = self
            .get_json(ACCOUNTS_PATH, &[], self.request_timeout)
            .await?;
        let (accounts, _) = listing.into_parts();

        info!("Catalog lists {} account(s)", accounts.len());
        Ok(accounts.into_iter().map(Self::convert_account).collect())
    }

    #[instrument(skip(self, account), fields(account = %account.name))]
    async fn list_movies(&self, account: &Account) -> CatalogResult<Vec<Movie>> {
        let rows: Vec<ApiVodItem> = self
            .paginate(
                MOVIES_PATH,
                &[("m3u_account", account.id.to_string())],
                self.movie_page_size,
                None,
            )
            .await?;

        let total = rows.len();
        let movies: Vec<Movie> = rows
            .into_iter()
            .filter_map(|item| self.convert_movie(item))
            .collect();
        if movies.len() < total {
            warn!("Skipped {} movie(s) without uuid", total - movies.len());
        }

        info!("Listed {} movies", movies.len());
        Ok(movies)
    }

    #[instrument(skip(self, account), fields(account = %account.name))]
    async fn list_series(&self, account: &Account) -> CatalogResult<Vec<Series>> {
        let rows: Vec<ApiVodItem> = self
            .paginate(
                SERIES_PATH,
                &[("m3u_account", account.id.to_string())],
                self.series_page_size,
                Some(self.series_max_pages),
            )
            .await?;

        info!("Listed {} series", rows.len());
        Ok(rows.into_iter().map(Self::convert_series).collect())
    }

    #[instrument(skip(self, account, series), fields(account = %account.name, series_id = series.id))]
    async fn get_series_episodes(
        &self,
        account: &Account,
        series: &Series,
    ) -> CatalogResult<ProviderInfo> {
        let path = format!("{}{}/provider-info/", SERIES_PATH, series.id);
        let response: ProviderInfoResponse = self
            .get_json(
                &path,
                &[("include_episodes", "true".to_string())],
                self.provider_info_timeout,
            )
            .await?;

        let episodes = self.convert_episodes(response);
        debug!(episodes = episodes.len(), "Fetched provider info");
        Ok(ProviderInfo::primary(series.id, episodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use core_library::CatalogError;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    fn token_response() -> BridgeResult<HttpResponse> {
        respond(200, r#"{"access": "jwt-1", "refresh": "r"}"#)
    }

    fn config() -> CatalogApiConfig {
        CatalogApiConfig {
            base_url: "http://dispatcharr:9191/".to_string(),
            password: "secret".to_string(),
            movie_page_size: 2,
            ..CatalogApiConfig::default()
        }
    }

    fn client(mock: MockHttpClient) -> DispatcharrClient {
        DispatcharrClient::new(Arc::new(mock), &config(), &SyncTuning::default())
    }

    fn account() -> Account {
        Account {
            id: 5,
            name: "Demo".to_string(),
            server_url: None,
            username: None,
            password: None,
            account_type: None,
        }
    }

    #[test]
    fn test_proxy_host() {
        assert_eq!(proxy_host("http://dispatcharr:9191/"), "dispatcharr:9191");
        assert_eq!(proxy_host("HTTPS://media.example.com"), "media.example.com");
        assert_eq!(proxy_host("10.0.0.2:9191"), "10.0.0.2:9191");
    }

    #[tokio::test]
    async fn test_list_accounts_logs_in_once() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH) && req.method == HttpMethod::Post)
            .times(1)
            .returning(|_| token_response());
        mock.expect_execute()
            .withf(|req| req.url.ends_with(ACCOUNTS_PATH))
            .times(2)
            .returning(|req| {
                assert_eq!(
                    req.headers.get("Authorization").map(String::as_str),
                    Some("Bearer jwt-1")
                );
                respond(
                    200,
                    r#"[{"id": 1, "name": "Demo", "server_url": "http://xc", "username": "u", "password": "p"},
                        {"id": 2, "name": ""}]"#,
                )
            });

        let client = client(mock);
        let accounts = client.list_accounts().await.unwrap();
        client.list_accounts().await.unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "Demo");
        assert!(accounts[0].has_legacy_credentials());
        assert_eq!(accounts[1].name, "Account-2");
    }

    #[tokio::test]
    async fn test_login_failure_is_connectivity() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| respond(401, r#"{"detail": "No active account"}"#));

        let err = client(mock).list_accounts().await.unwrap_err();
        assert!(matches!(err, CatalogError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_movies_are_paginated_and_converted() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH))
            .returning(|_| token_response());
        mock.expect_execute()
            .withf(|req| req.url.contains("page=1&"))
            .times(1)
            .returning(|req| {
                assert!(req.url.contains("m3u_account=5"));
                assert!(req.url.contains("page_size=2"));
                respond(
                    200,
                    r#"{"count": 3, "next": "http://dispatcharr:9191/api/vod/movies/?page=2",
                        "results": [
                          {"id": 10, "uuid": "u-10", "name": "Inception (2010)", "year": 2010,
                           "custom_properties": {"category_name": "Sci-Fi"},
                           "logo": {"url": "http://img/10.jpg"}},
                          {"id": 11, "name": "No Uuid"}
                        ]}"#,
                )
            });
        mock.expect_execute()
            .withf(|req| req.url.contains("page=2&"))
            .times(1)
            .returning(|_| {
                respond(
                    200,
                    r#"{"count": 3, "next": null,
                        "results": [{"id": 12, "uuid": "u-12", "title": "Heat", "year": "1995"}]}"#,
                )
            });

        let movies = client(mock).list_movies(&account()).await.unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].raw_title, "Inception (2010)");
        assert_eq!(movies[0].category.as_deref(), Some("Sci-Fi"));
        assert_eq!(
            movies[0].stream_url,
            "http://dispatcharr:9191/proxy/vod/movie/u-10"
        );
        assert_eq!(movies[0].artwork_url.as_deref(), Some("http://img/10.jpg"));
        assert_eq!(movies[1].year, Some(1995));
        assert_eq!(movies[1].category, None);
    }

    #[tokio::test]
    async fn test_provider_info_season_map() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH))
            .returning(|_| token_response());
        mock.expect_execute()
            .withf(|req| req.url.contains("/api/vod/series/7/provider-info/"))
            .times(1)
            .returning(|req| {
                assert!(req.url.ends_with("include_episodes=true"));
                assert_eq!(req.timeout, Some(Duration::from_secs(120)));
                respond(
                    200,
                    r#"{"episodes": {
                        "2": [{"uuid": "e-3", "episode_number": 1, "name": "Later"}],
                        "1": [{"uuid": "e-2", "season_number": 1, "episode_number": 2, "title": "Lies"},
                              {"uuid": "e-1", "episode_num": "1", "title": "Secrets"},
                              {"episode_number": 3, "title": "No uuid"}]
                    }}"#,
                )
            });

        let series = Series {
            id: 7,
            raw_title: "Dark".to_string(),
            year: None,
            category: None,
            external_id: None,
            plot: None,
            artwork_url: None,
        };
        let info = client(mock)
            .get_series_episodes(&account(), &series)
            .await
            .unwrap();

        let order: Vec<(u32, u32, &str)> = info
            .episodes
            .iter()
            .map(|e| (e.season, e.episode, e.title.as_str()))
            .collect();
        assert_eq!(order, vec![(1, 1, "Secrets"), (1, 2, "Lies"), (2, 1, "Later")]);
        assert_eq!(
            info.episodes[0].stream_url,
            "http://dispatcharr:9191/proxy/vod/episode/e-1"
        );
    }

    #[tokio::test]
    async fn test_rejected_token_triggers_one_relogin() {
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = logins.clone();

        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH))
            .returning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                token_response()
            });
        mock.expect_execute()
            .withf(|req| req.url.ends_with(ACCOUNTS_PATH))
            .times(2)
            .returning(|_| respond(401, ""));

        let err = client(mock).list_accounts().await.unwrap_err();

        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert!(matches!(err, CatalogError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_recoverable() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH))
            .returning(|_| token_response());
        mock.expect_execute()
            .withf(|req| req.url.contains(SERIES_PATH))
            .returning(|_| respond(503, "upstream busy"));

        let err = client(mock).list_series(&account()).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_transport_error_is_connectivity() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH))
            .returning(|_| token_response());
        mock.expect_execute()
            .withf(|req| req.url.contains(MOVIES_PATH))
            .returning(|_| Err(BridgeError::Connection("refused".to_string())));

        let err = client(mock).list_movies(&account()).await.unwrap_err();
        assert!(matches!(err, CatalogError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.url.ends_with(TOKEN_PATH))
            .returning(|_| token_response());
        mock.expect_execute()
            .withf(|req| req.url.contains(SERIES_PATH))
            .returning(|_| respond(200, "<html>oops</html>"));

        let err = client(mock).list_series(&account()).await.unwrap_err();
        assert!(matches!(err, CatalogError::Fatal(_)));
    }
}
