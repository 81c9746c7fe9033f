//! TMDB API Client
//!
//! Resolves movie and series titles to overview, genres, rating and artwork
//! through The Movie Database v3 API.
//!
//! ## API Endpoints
//!
//! - **Search**: `/3/search/movie`, `/3/search/tv`
//! - **Details**: `/3/movie/{id}`, `/3/tv/{id}` (genres are only on details)
//! - **Images**: `https://image.tmdb.org/t/p/{size}{path}`
//!
//! ## Rate Limiting
//!
//! Every request, images included, passes through a shared
//! [`RateLimiter`](core_runtime::RateLimiter) configured with the minimum
//! inter-call delay. A `429` answer becomes
//! [`MetadataError::RateLimited`] carrying the `Retry-After` value.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::providers::tmdb::TmdbClient;
//!
//! let client = TmdbClient::new(http_client, &config.metadata)?;
//! let meta = client.lookup(&LookupQuery { kind: EntityKind::Movie, .. }).await?;
//! ```

use crate::error::{MetadataError, Result};
use crate::provider::{LookupQuery, Metadata, MetadataProvider};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use core_library::models::EntityKind;
use core_runtime::config::MetadataApiConfig;
use core_runtime::RateLimiter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// TMDB API base URL
const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";

/// TMDB image CDN base URL
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TMDB API client
pub struct TmdbClient {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    api_base: String,
    image_base: String,
    poster_size: String,
    fanart_size: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Details {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    vote_average: Option<f32>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

impl TmdbClient {
    /// Creates a client from the metadata settings
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Config`] when no API key is configured.
    pub fn new(http_client: Arc<dyn HttpClient>, config: &MetadataApiConfig) -> Result<Self> {
        Self::with_clock(http_client, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        http_client: Arc<dyn HttpClient>,
        config: &MetadataApiConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let api_key = config
            .tmdb_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MetadataError::Config("TMDB API key is not set".to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            api_base: TMDB_API_BASE.to_string(),
            image_base: TMDB_IMAGE_BASE.to_string(),
            poster_size: config.poster_size.clone(),
            fanart_size: config.fanart_size.clone(),
            rate_limiter: RateLimiter::shared(config.rate_limit_delay_ms, clock),
        })
    }

    fn image_url(&self, size: &str, path: Option<&str>) -> Option<String> {
        path.filter(|p| !p.is_empty())
            .map(|p| format!("{}/{}{}", self.image_base, size, p))
    }

    async fn send(&self, url: String) -> Result<HttpResponse> {
        self.rate_limiter.lock().await.wait_if_needed().await;

        let request = HttpRequest::new(HttpMethod::Get, url)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| MetadataError::NetworkError(format!("TMDB request failed: {}", e)))?;

        match response.status {
            200..=299 => Ok(response),
            404 => Err(MetadataError::NotFound("TMDB resource not found".to_string())),
            429 => {
                let retry_after = response
                    .header("Retry-After")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(10);
                warn!(retry_after, "TMDB rate limit hit");
                Err(MetadataError::RateLimited {
                    provider: "TMDB".to_string(),
                    retry_after_seconds: retry_after,
                })
            }
            status => Err(MetadataError::HttpError {
                status,
                body: String::from_utf8_lossy(&response.body).chars().take(200).collect(),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.send(url).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| MetadataError::JsonParse(format!("TMDB response: {}", e)))
    }

    async fn search(&self, query: &LookupQuery, with_year: bool) -> Result<Vec<SearchResult>> {
        let (endpoint, year_param) = match query.kind {
            EntityKind::Series => ("tv", "first_air_date_year"),
            _ => ("movie", "year"),
        };

        let mut url = format!(
            "{}/search/{}?api_key={}&query={}&language={}&include_adult=false",
            self.api_base,
            endpoint,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&query.title),
            urlencoding::encode(&query.language),
        );
        if let (true, Some(year)) = (with_year, query.year) {
            url.push_str(&format!("&{}={}", year_param, year));
        }

        debug!(endpoint, title = %query.title, year = ?query.year, with_year, "Searching TMDB");
        let response: SearchResponse = self.get_json(url).await?;
        Ok(response.results)
    }

    async fn details(&self, kind: EntityKind, id: u64, language: &str) -> Result<Details> {
        let endpoint = match kind {
            EntityKind::Series => "tv",
            _ => "movie",
        };
        let url = format!(
            "{}/{}/{}?api_key={}&language={}",
            self.api_base,
            endpoint,
            id,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(language),
        );
        self.get_json(url).await
    }

    /// Pick the result whose release year matches, else the first one
    fn best_match(results: &[SearchResult], year: Option<i32>) -> Option<&SearchResult> {
        year.and_then(|y| {
            results.iter().find(|r| {
                r.release_date
                    .as_deref()
                    .or(r.first_air_date.as_deref())
                    .and_then(parse_year)
                    == Some(y)
            })
        })
        .or_else(|| results.first())
    }
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(..4).and_then(|y| y.parse().ok())
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    fn name(&self) -> &str {
        "TMDB"
    }

    #[instrument(skip(self, query), fields(kind = %query.kind, title = %query.title))]
    async fn lookup(&self, query: &LookupQuery) -> Result<Metadata> {
        if query.kind == EntityKind::Episode {
            return Err(MetadataError::NotFound(
                "Episode lookups are not supported".to_string(),
            ));
        }

        let mut results = self.search(query, true).await?;
        if results.is_empty() && query.year.is_some() {
            results = self.search(query, false).await?;
        }

        let found = Self::best_match(&results, query.year).ok_or_else(|| {
            MetadataError::NotFound(format!("No TMDB match for '{}'", query.title))
        })?;
        let fallback_title = found.title.clone().or_else(|| found.name.clone());

        let details = self.details(query.kind, found.id, &query.language).await?;

        let title = details
            .title
            .or(details.name)
            .or(fallback_title)
            .unwrap_or_else(|| query.title.clone());
        let year = details
            .release_date
            .as_deref()
            .or(details.first_air_date.as_deref())
            .and_then(parse_year);

        debug!(tmdb_id = details.id, %title, "TMDB match");

        Ok(Metadata {
            provider_id: format!("tmdb:{}", details.id),
            title,
            year,
            plot: details.overview.filter(|o| !o.trim().is_empty()),
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            rating: details.vote_average.filter(|r| *r > 0.0),
            poster_url: self.image_url(&self.poster_size, details.poster_path.as_deref()),
            fanart_url: self.image_url(&self.fanart_size, details.backdrop_path.as_deref()),
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes> {
        debug!("Fetching artwork: {}", url);
        let response = self.send(url.to_string()).await?;
        if response.body.is_empty() {
            return Err(MetadataError::NotFound(format!("Empty image at {}", url)));
        }
        Ok(response.body)
    }
}
