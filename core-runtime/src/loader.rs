//! Vars-file and environment loading
//!
//! [`ConfigLoader`] is the only place in the workspace that reads the process
//! environment. It collects `KEY=VALUE` pairs from an optional shell-style vars
//! file, lets the environment override them, and maps the known keys onto an
//! [`ExportConfigBuilder`]. Callers apply command-line overrides on the returned
//! builder before calling `build()`.

use crate::config::{ExportConfig, ExportConfigBuilder, MetadataApiConfig};
use crate::error::{Error, Result};
use crate::logging::{LogFormat, LogLevel};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Every key the loader understands
pub const KNOWN_KEYS: &[&str] = &[
    "DISPATCHARR_BASE_URL",
    "DISPATCHARR_API_USER",
    "DISPATCHARR_API_PASS",
    "XC_NAMES",
    "VOD_MOVIES_DIR",
    "VOD_SERIES_DIR",
    "VOD_CACHE_DB",
    "VOD_DELETE_OLD",
    "VOD_CLEAR_CACHE",
    "VOD_DRY_RUN",
    "VOD_EXPORT_MOVIES",
    "VOD_EXPORT_SERIES",
    "VOD_WRITE_NFO",
    "VOD_WRITE_ARTWORK",
    "VOD_OVERWRITE_NFO",
    "VOD_OVERWRITE_ARTWORK",
    "VOD_DEFAULT_CATEGORY",
    "VOD_MAX_COMPONENT_LEN",
    "VOD_SERIES_CONCURRENCY",
    "VOD_ACCOUNT_CONCURRENCY",
    "TMDB_API_KEY",
    "TMDB_LANGUAGE",
    "TMDB_RATE_LIMIT_MS",
    "TMDB_POSTER_SIZE",
    "TMDB_FANART_SIZE",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

/// Collects configuration variables from a vars file and the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    vars: HashMap<String, String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Merge a shell-style vars file (`KEY=VALUE`, `export KEY=VALUE`, quoted values)
    ///
    /// Values already present are replaced.
    pub fn with_vars_file(mut self, path: &Path) -> Result<Self> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read vars file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut count = 0usize;
        for item in iter {
            let (key, value) = item.map_err(|e| {
                Error::Config(format!("Invalid line in {}: {}", path.display(), e))
            })?;
            self.vars.insert(key, value);
            count += 1;
        }

        debug!(path = %path.display(), count, "Loaded vars file");
        Ok(self)
    }

    /// Overlay the known keys from the process environment
    pub fn with_process_env(mut self) -> Self {
        for key in KNOWN_KEYS {
            if let Ok(value) = std::env::var(key) {
                self.vars.insert((*key).to_string(), value);
            }
        }
        self
    }

    /// Raw value of a variable, `None` when unset or blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|v| parse_bool(key, v)).transpose()
    }

    fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.parse::<T>().map_err(|e| {
                    Error::Config(format!("Invalid value for {}: '{}' ({})", key, v, e))
                })
            })
            .transpose()
    }

    /// Map the collected variables onto a builder
    pub fn builder(&self) -> Result<ExportConfigBuilder> {
        let mut builder = ExportConfig::builder();

        if let Some(v) = self.get("DISPATCHARR_BASE_URL") {
            builder = builder.api_base_url(v);
        }
        if let Some(v) = self.get("DISPATCHARR_API_USER") {
            builder = builder.api_username(v);
        }
        if let Some(v) = self.vars.get("DISPATCHARR_API_PASS") {
            builder = builder.api_password(v.as_str());
        }
        if let Some(v) = self.get("XC_NAMES") {
            builder = builder.account_patterns(v);
        }
        if let Some(v) = self.get("VOD_MOVIES_DIR") {
            builder = builder.movies_dir_template(v);
        }
        if let Some(v) = self.get("VOD_SERIES_DIR") {
            builder = builder.series_dir_template(v);
        }
        if let Some(v) = self.get("VOD_CACHE_DB") {
            builder = builder.cache_db_path(v);
        }
        if let Some(v) = self.get("VOD_DEFAULT_CATEGORY") {
            builder = builder.default_category(v);
        }
        if let Some(v) = self.get_parsed::<usize>("VOD_MAX_COMPONENT_LEN")? {
            builder = builder.max_component_len(v);
        }

        if let Some(v) = self.get_bool("VOD_DELETE_OLD")? {
            builder = builder.delete_stale(v);
        }
        if let Some(v) = self.get_bool("VOD_CLEAR_CACHE")? {
            builder = builder.full_reset(v);
        }
        if let Some(v) = self.get_bool("VOD_DRY_RUN")? {
            builder = builder.dry_run(v);
        }
        if let Some(v) = self.get_bool("VOD_EXPORT_MOVIES")? {
            builder = builder.export_movies(v);
        }
        if let Some(v) = self.get_bool("VOD_EXPORT_SERIES")? {
            builder = builder.export_series(v);
        }
        if let Some(v) = self.get_bool("VOD_WRITE_NFO")? {
            builder = builder.write_sidecars(v);
        }
        if let Some(v) = self.get_bool("VOD_WRITE_ARTWORK")? {
            builder = builder.write_artwork(v);
        }
        if let Some(v) = self.get_bool("VOD_OVERWRITE_NFO")? {
            builder = builder.overwrite_sidecars(v);
        }
        if let Some(v) = self.get_bool("VOD_OVERWRITE_ARTWORK")? {
            builder = builder.overwrite_artwork(v);
        }

        if let Some(v) = self.get_parsed::<usize>("VOD_SERIES_CONCURRENCY")? {
            builder = builder.series_concurrency(v);
        }
        if let Some(v) = self.get_parsed::<usize>("VOD_ACCOUNT_CONCURRENCY")? {
            builder = builder.account_concurrency(v);
        }

        let mut metadata = MetadataApiConfig::new();
        if let Some(v) = self.get("TMDB_API_KEY") {
            metadata = metadata.with_tmdb_api_key(v);
        }
        if let Some(v) = self.get("TMDB_LANGUAGE") {
            metadata = metadata.with_language(v);
        }
        if let Some(v) = self.get_parsed::<u64>("TMDB_RATE_LIMIT_MS")? {
            metadata = metadata.with_rate_limit_delay_ms(v);
        }
        if let Some(v) = self.get("TMDB_POSTER_SIZE") {
            metadata.poster_size = v.to_string();
        }
        if let Some(v) = self.get("TMDB_FANART_SIZE") {
            metadata.fanart_size = v.to_string();
        }
        builder = builder.metadata_api_config(metadata);

        if let Some(v) = self.get_parsed::<LogLevel>("LOG_LEVEL")? {
            builder = builder.log_level(v);
        }
        if let Some(v) = self.get_parsed::<LogFormat>("LOG_FORMAT")? {
            builder = builder.log_format(v);
        }

        Ok(builder)
    }
}

/// Parse a shell-style boolean
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "Invalid boolean for {}: '{}' (expected true/false/1/0/yes/no/on/off)",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::from_vars(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert!(parse_bool("K", v).unwrap());
        }
        for v in ["false", "0", "no", "Off"] {
            assert!(!parse_bool("K", v).unwrap());
        }
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn test_builder_maps_known_keys() {
        let loader = vars(&[
            ("DISPATCHARR_BASE_URL", "http://dispatcharr:9191/"),
            ("DISPATCHARR_API_PASS", "pw"),
            ("XC_NAMES", "Strong%,Demo"),
            ("VOD_MOVIES_DIR", "/srv/{XC_NAME}/Movies"),
            ("VOD_SERIES_DIR", "/srv/{XC_NAME}/Series"),
            ("VOD_DELETE_OLD", "false"),
            ("VOD_DRY_RUN", "yes"),
            ("VOD_WRITE_NFO", "1"),
            ("VOD_SERIES_CONCURRENCY", "8"),
            ("TMDB_API_KEY", "abc"),
            ("TMDB_POSTER_SIZE", "w342"),
            ("LOG_LEVEL", "debug"),
        ]);

        let config = loader.builder().unwrap().build().unwrap();

        assert_eq!(config.catalog.base_url, "http://dispatcharr:9191");
        assert_eq!(config.account_patterns, "Strong%,Demo");
        assert_eq!(config.output.movies_dir_template, "/srv/{XC_NAME}/Movies");
        assert!(!config.features.delete_stale);
        assert!(config.features.dry_run);
        assert!(config.features.write_sidecars);
        assert_eq!(config.tuning.series_concurrency, 8);
        assert_eq!(config.metadata.tmdb_api_key.as_deref(), Some("abc"));
        assert_eq!(config.metadata.poster_size, "w342");
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let loader = vars(&[("DISPATCHARR_API_PASS", "pw"), ("XC_NAMES", "  ")]);
        let config = loader.builder().unwrap().build().unwrap();
        assert_eq!(config.account_patterns, "%");
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let loader = vars(&[("DISPATCHARR_API_PASS", "pw"), ("VOD_MAX_COMPONENT_LEN", "long")]);
        let err = loader.builder().unwrap_err();
        assert!(err.to_string().contains("VOD_MAX_COMPONENT_LEN"));
    }

    #[test]
    fn test_vars_file_supports_export_and_quotes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# exporter settings").unwrap();
        writeln!(file, "export DISPATCHARR_API_PASS=\"s3cret\"").unwrap();
        writeln!(file, "XC_NAMES='Demo'").unwrap();
        writeln!(file, "VOD_CLEAR_CACHE=true").unwrap();

        let loader = ConfigLoader::new().with_vars_file(file.path()).unwrap();
        assert_eq!(loader.get("DISPATCHARR_API_PASS"), Some("s3cret"));
        assert_eq!(loader.get("XC_NAMES"), Some("Demo"));

        let config = loader.builder().unwrap().build().unwrap();
        assert!(config.features.full_reset);
    }

    #[test]
    fn test_missing_vars_file_is_config_error() {
        let result = ConfigLoader::new().with_vars_file(Path::new("/nonexistent/vod.vars"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
