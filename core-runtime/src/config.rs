//! # Export Configuration Module
//!
//! Provides the immutable run configuration for the VOD exporter.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! `ExportConfig`. `build()` fails fast with an actionable
//! [`Error::Config`](crate::error::Error::Config) so that a bad setting aborts
//! the run before any account is touched.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ExportConfig;
//!
//! let config = ExportConfig::builder()
//!     .api_password("secret")
//!     .account_patterns("Strong%, Demo")
//!     .movies_dir_template("/mnt/vod/{XC_NAME}/Movies")
//!     .delete_stale(true)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::ExportConfig;
//!
//! // Panics: the catalog API password is required
//! let config = ExportConfig::builder()
//!     .build()
//!     .expect("Should fail - missing password");
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LogLevel};
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder substituted with the account name in directory templates
pub const ACCOUNT_PLACEHOLDER: &str = "{XC_NAME}";

/// Junk tokens stripped from provider titles by default
pub const DEFAULT_JUNK_TOKENS: &[&str] = &[
    "2160p", "1080p", "720p", "576p", "480p", "4K", "UHD", "FHD", "HD", "SD", "HDR", "EN", "ENG",
    "DUAL", "MULTI", "MULTI-AUDIO", "SUB", "SUBS", "DUBBED", "x264", "x265", "HEVC", "WEB-DL",
    "WEBRip", "BluRay", "HDRip", "YTS", "RARBG",
];

/// Core configuration for the exporter.
///
/// Use [`ExportConfigBuilder`] to construct instances.
#[derive(Clone, PartialEq)]
pub struct ExportConfig {
    /// Catalog (Dispatcharr) API access
    pub catalog: CatalogApiConfig,

    /// Comma-separated account name patterns (`%`, `_`, `*`, `?` wildcards)
    pub account_patterns: String,

    /// Output tree layout
    pub output: OutputConfig,

    /// Feature flags
    pub features: FeatureFlags,

    /// External metadata API configuration (TMDB)
    pub metadata: MetadataApiConfig,

    /// Concurrency, retry and rate limits
    pub tuning: SyncTuning,

    /// Minimum log level
    pub log_level: LogLevel,

    /// Log output format
    pub log_format: LogFormat,
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportConfig")
            .field("catalog", &self.catalog)
            .field("account_patterns", &self.account_patterns)
            .field("output", &self.output)
            .field("features", &self.features)
            .field("metadata", &self.metadata)
            .field("tuning", &self.tuning)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

/// Catalog API connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogApiConfig {
    /// Base URL of the media-management platform
    pub base_url: String,
    /// API user
    pub username: String,
    /// API password
    pub password: String,
    /// Page size for movie listings
    pub movie_page_size: u32,
    /// Page size for series listings
    pub series_page_size: u32,
    /// Upper bound on series pages fetched per account
    pub series_max_pages: u32,
    /// Timeout for ordinary API calls
    pub request_timeout: Duration,
    /// Timeout for per-series provider-info calls
    pub provider_info_timeout: Duration,
}

impl std::fmt::Debug for CatalogApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogApiConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("movie_page_size", &self.movie_page_size)
            .field("series_page_size", &self.series_page_size)
            .field("series_max_pages", &self.series_max_pages)
            .field("request_timeout", &self.request_timeout)
            .field("provider_info_timeout", &self.provider_info_timeout)
            .finish()
    }
}

impl Default for CatalogApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9191".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            movie_page_size: 250,
            series_page_size: 100,
            series_max_pages: 500,
            request_timeout: Duration::from_secs(60),
            provider_info_timeout: Duration::from_secs(120),
        }
    }
}

/// Where and how the pointer tree is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Movies root, `{XC_NAME}` replaced by the account name
    pub movies_dir_template: String,
    /// Series root, `{XC_NAME}` replaced by the account name
    pub series_dir_template: String,
    /// SQLite file backing the cache store
    pub cache_db_path: PathBuf,
    /// Bucket used when an entity has no category
    pub default_category: String,
    /// Maximum characters per path component before shortening
    pub max_component_len: usize,
    /// Tokens stripped from provider titles
    pub junk_tokens: Vec<String>,
    /// Replacement for characters illegal in paths
    pub unsafe_char_substitute: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            movies_dir_template: "/mnt/Share-VOD/{XC_NAME}/Movies".to_string(),
            series_dir_template: "/mnt/Share-VOD/{XC_NAME}/Series".to_string(),
            cache_db_path: PathBuf::from("/opt/dispatcharr_vod/cache/vod_cache.db"),
            default_category: "Uncategorized".to_string(),
            max_component_len: 80,
            junk_tokens: DEFAULT_JUNK_TOKENS.iter().map(|t| t.to_string()).collect(),
            unsafe_char_substitute: String::new(),
        }
    }
}

impl OutputConfig {
    /// Movies root for one account
    pub fn movies_root(&self, account_dir_name: &str) -> PathBuf {
        PathBuf::from(
            self.movies_dir_template
                .replace(ACCOUNT_PLACEHOLDER, account_dir_name),
        )
    }

    /// Series root for one account
    pub fn series_root(&self, account_dir_name: &str) -> PathBuf {
        PathBuf::from(
            self.series_dir_template
                .replace(ACCOUNT_PLACEHOLDER, account_dir_name),
        )
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Export movie pointers
    pub export_movies: bool,

    /// Export series/episode pointers
    pub export_series: bool,

    /// Write NFO sidecars
    pub write_sidecars: bool,

    /// Download poster/fanart artwork
    pub write_artwork: bool,

    /// Remove pointers for entities gone from the catalog
    pub delete_stale: bool,

    /// Discard cache and output subtree before exporting
    pub full_reset: bool,

    /// Plan only, never mutate the filesystem or the cache
    pub dry_run: bool,

    /// Rewrite sidecars even when already present
    pub overwrite_sidecars: bool,

    /// Re-download artwork even when already present
    pub overwrite_artwork: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            export_movies: true,
            export_series: true,
            write_sidecars: false,
            write_artwork: false,
            delete_stale: true,
            full_reset: false,
            dry_run: false,
            overwrite_sidecars: false,
            overwrite_artwork: false,
        }
    }
}

/// Configuration for the external metadata API (TMDB).
///
/// # Security Note
///
/// The API key should come from the vars file or the environment, never from
/// source.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataApiConfig {
    /// TMDB v3 API key; sidecars fall back to catalog fields without it
    pub tmdb_api_key: Option<String>,

    /// Metadata language (e.g. "en-US")
    pub language: String,

    /// Minimum delay in milliseconds between API requests
    ///
    /// Default: 250ms (4 requests per second)
    pub rate_limit_delay_ms: u64,

    /// TMDB image size used for posters
    pub poster_size: String,

    /// TMDB image size used for fanart
    pub fanart_size: String,
}

impl std::fmt::Debug for MetadataApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataApiConfig")
            .field(
                "tmdb_api_key",
                &self.tmdb_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("language", &self.language)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .field("poster_size", &self.poster_size)
            .field("fanart_size", &self.fanart_size)
            .finish()
    }
}

impl Default for MetadataApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataApiConfig {
    /// Creates a new MetadataApiConfig with no API key configured
    pub fn new() -> Self {
        Self {
            tmdb_api_key: None,
            language: "en-US".to_string(),
            rate_limit_delay_ms: 250,
            poster_size: "w500".to_string(),
            fanart_size: "original".to_string(),
        }
    }

    /// Sets the TMDB API key
    pub fn with_tmdb_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.tmdb_api_key = Some(api_key.into());
        self
    }

    /// Sets the metadata language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the rate limit delay in milliseconds
    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.tmdb_api_key {
            if key.trim().is_empty() {
                return Err(Error::Config("TMDB API key cannot be empty".to_string()));
            }
        }

        if self.language.trim().is_empty() {
            return Err(Error::Config(
                "Metadata language cannot be empty".to_string(),
            ));
        }

        if self.rate_limit_delay_ms == 0 {
            return Err(Error::Config(
                "Rate limit delay must be greater than 0ms".to_string(),
            ));
        }

        if self.rate_limit_delay_ms > 60000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        for (name, size) in [("poster", &self.poster_size), ("fanart", &self.fanart_size)] {
            if size != "original" && !is_tmdb_width(size) {
                return Err(Error::Config(format!(
                    "Invalid {} size '{}': expected 'original' or a width like 'w500'",
                    name, size
                )));
            }
        }

        Ok(())
    }

    /// Checks if TMDB is configured
    pub fn has_tmdb(&self) -> bool {
        self.tmdb_api_key.is_some()
    }
}

fn is_tmdb_width(size: &str) -> bool {
    size.strip_prefix('w')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Concurrency, retry and rate-limit knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTuning {
    /// Series whose episodes are fetched concurrently within one account
    pub series_concurrency: usize,
    /// Accounts processed concurrently
    pub account_concurrency: usize,
    /// Attempts per network call for transient failures
    pub retry_attempts: u32,
    /// Base backoff delay between attempts
    pub retry_base_delay_ms: u64,
    /// Minimum delay between legacy fallback API calls
    pub fallback_rate_limit_ms: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            series_concurrency: 4,
            account_concurrency: 2,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            fallback_rate_limit_ms: 500,
        }
    }
}

impl ExportConfig {
    /// Creates a new builder for constructing an `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Catalog URL, credentials and page sizes
    /// - Directory templates and cache path
    /// - Naming limits
    /// - Metadata settings and tuning bounds
    pub fn validate(&self) -> Result<()> {
        let catalog = &self.catalog;
        if !(catalog.base_url.starts_with("http://") || catalog.base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "Catalog base URL must start with http:// or https://, got '{}'",
                catalog.base_url
            )));
        }

        if catalog.username.trim().is_empty() {
            return Err(Error::Config("Catalog API user cannot be empty".to_string()));
        }

        if catalog.password.is_empty() {
            return Err(Error::Config(
                "Catalog API password is required. Set DISPATCHARR_API_PASS.".to_string(),
            ));
        }

        if catalog.movie_page_size == 0 || catalog.series_page_size == 0 {
            return Err(Error::Config(
                "Page sizes must be greater than 0".to_string(),
            ));
        }

        if catalog.series_max_pages == 0 {
            return Err(Error::Config(
                "Series max pages must be greater than 0".to_string(),
            ));
        }

        let output = &self.output;
        for (name, template) in [
            ("Movies", &output.movies_dir_template),
            ("Series", &output.series_dir_template),
        ] {
            if template.trim().is_empty() {
                return Err(Error::Config(format!(
                    "{} directory template cannot be empty",
                    name
                )));
            }
        }

        if output.movies_dir_template == output.series_dir_template {
            return Err(Error::Config(
                "Movies and series directory templates must differ".to_string(),
            ));
        }

        if output.cache_db_path.as_os_str().is_empty() {
            return Err(Error::Config("Cache database path cannot be empty".to_string()));
        }

        if output.default_category.trim().is_empty() {
            return Err(Error::Config("Default category cannot be empty".to_string()));
        }

        if output.max_component_len < 20 {
            return Err(Error::Config(
                "Max path component length must be at least 20 characters".to_string(),
            ));
        }

        if output
            .unsafe_char_substitute
            .chars()
            .any(|c| "\\/*?:\"<>|".contains(c))
        {
            return Err(Error::Config(
                "Unsafe character substitute must not contain path-illegal characters"
                    .to_string(),
            ));
        }

        self.metadata.validate()?;

        let tuning = &self.tuning;
        if tuning.series_concurrency == 0 || tuning.series_concurrency > 64 {
            return Err(Error::Config(
                "Series concurrency must be between 1 and 64".to_string(),
            ));
        }

        if tuning.account_concurrency == 0 || tuning.account_concurrency > 16 {
            return Err(Error::Config(
                "Account concurrency must be between 1 and 16".to_string(),
            ));
        }

        if tuning.retry_attempts == 0 || tuning.retry_attempts > 10 {
            return Err(Error::Config(
                "Retry attempts must be between 1 and 10".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug, Default)]
pub struct ExportConfigBuilder {
    catalog: CatalogApiConfig,
    account_patterns: Option<String>,
    output: OutputConfig,
    features: FeatureFlags,
    metadata: MetadataApiConfig,
    tuning: SyncTuning,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
}

impl ExportConfigBuilder {
    /// Sets the catalog API base URL
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.catalog.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the catalog API user
    pub fn api_username(mut self, username: impl Into<String>) -> Self {
        self.catalog.username = username.into();
        self
    }

    /// Sets the catalog API password
    pub fn api_password(mut self, password: impl Into<String>) -> Self {
        self.catalog.password = password.into();
        self
    }

    /// Sets the account name patterns (comma-separated)
    pub fn account_patterns(mut self, patterns: impl Into<String>) -> Self {
        self.account_patterns = Some(patterns.into());
        self
    }

    /// Sets the movies root template
    pub fn movies_dir_template(mut self, template: impl Into<String>) -> Self {
        self.output.movies_dir_template = template.into();
        self
    }

    /// Sets the series root template
    pub fn series_dir_template(mut self, template: impl Into<String>) -> Self {
        self.output.series_dir_template = template.into();
        self
    }

    /// Sets the cache database file
    pub fn cache_db_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output.cache_db_path = path.into();
        self
    }

    /// Sets the default category bucket
    pub fn default_category(mut self, category: impl Into<String>) -> Self {
        self.output.default_category = category.into();
        self
    }

    /// Sets the maximum path component length
    pub fn max_component_len(mut self, len: usize) -> Self {
        self.output.max_component_len = len;
        self
    }

    /// Replaces the junk token list
    pub fn junk_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output.junk_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the unsafe character substitute
    pub fn unsafe_char_substitute(mut self, substitute: impl Into<String>) -> Self {
        self.output.unsafe_char_substitute = substitute.into();
        self
    }

    /// Enables or disables movie export
    pub fn export_movies(mut self, enabled: bool) -> Self {
        self.features.export_movies = enabled;
        self
    }

    /// Enables or disables series export
    pub fn export_series(mut self, enabled: bool) -> Self {
        self.features.export_series = enabled;
        self
    }

    /// Enables or disables NFO sidecars
    pub fn write_sidecars(mut self, enabled: bool) -> Self {
        self.features.write_sidecars = enabled;
        self
    }

    /// Enables or disables artwork downloads
    pub fn write_artwork(mut self, enabled: bool) -> Self {
        self.features.write_artwork = enabled;
        self
    }

    /// Enables or disables stale pointer deletion
    pub fn delete_stale(mut self, enabled: bool) -> Self {
        self.features.delete_stale = enabled;
        self
    }

    /// Enables or disables full-reset mode
    pub fn full_reset(mut self, enabled: bool) -> Self {
        self.features.full_reset = enabled;
        self
    }

    /// Enables or disables dry-run mode
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.features.dry_run = enabled;
        self
    }

    /// Sets the sidecar overwrite flag
    pub fn overwrite_sidecars(mut self, enabled: bool) -> Self {
        self.features.overwrite_sidecars = enabled;
        self
    }

    /// Sets the artwork overwrite flag
    pub fn overwrite_artwork(mut self, enabled: bool) -> Self {
        self.features.overwrite_artwork = enabled;
        self
    }

    /// Replaces all feature flags at once
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Sets the metadata API configuration
    pub fn metadata_api_config(mut self, config: MetadataApiConfig) -> Self {
        self.metadata = config;
        self
    }

    /// Sets concurrency and retry tuning
    pub fn tuning(mut self, tuning: SyncTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Sets the number of series fetched concurrently
    pub fn series_concurrency(mut self, concurrency: usize) -> Self {
        self.tuning.series_concurrency = concurrency;
        self
    }

    /// Sets the number of accounts processed concurrently
    pub fn account_concurrency(mut self, concurrency: usize) -> Self {
        self.tuning.account_concurrency = concurrency;
        self
    }

    /// Sets the minimum log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Sets the log format
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    /// Builds the final `ExportConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any setting is missing or out of range.
    pub fn build(self) -> Result<ExportConfig> {
        let account_patterns = self
            .account_patterns
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "%".to_string());

        let config = ExportConfig {
            catalog: self.catalog,
            account_patterns,
            output: self.output,
            features: self.features,
            metadata: self.metadata,
            tuning: self.tuning,
            log_level: self.log_level.unwrap_or(LogLevel::Info),
            log_format: self.log_format.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
