//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - JSON, pretty and compact output formats
//! - Crate-level filtering with noisy dependencies held at `warn`
//! - Redaction helpers for credentials echoed in logs
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug);
//! init_logging(config)?;
//!
//! tracing::info!(account = "Demo", "Export started");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::str::FromStr;
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Crates whose events are shown at the configured level
const WORKSPACE_TARGETS: &[&str] = &[
    "vod_strm",
    "vod_export",
    "core_runtime",
    "core_library",
    "core_metadata",
    "core_sync",
    "core_service",
    "provider_dispatcharr",
    "bridge_desktop",
];

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(Error::Config(format!("Unknown log level '{}'", other))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact single-line format for cron logs
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format '{}'", other))),
        }
    }
}

/// Subscriber settings, built from `LOG_LEVEL`/`LOG_FORMAT`
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Full `EnvFilter` directive string; replaces the per-crate defaults
    pub filter: Option<String>,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Install the global subscriber
///
/// Only the first call in a process succeeds; later calls return
/// [`Error::Logging`]. A malformed custom filter is [`Error::Config`].
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);
    let output = match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        // one flat object per event
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Dependencies that stay at `warn` whatever the configured level
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls", "sqlx"];

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = config.level.as_str();
            let ours = WORKSPACE_TARGETS.iter().map(|t| format!("{}={}", t, level));
            let quiet = QUIET_TARGETS.iter().map(|t| format!("{}=warn", t));
            std::iter::once("warn".to_string())
                .chain(ours)
                .chain(quiet)
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Field-name fragments whose values never reach a log line
const SECRET_MARKERS: &[&str] = &[
    "pass",
    "token",
    "access",
    "secret",
    "api_key",
    "authorization",
    "bearer",
];

/// `[REDACTED]` when `field_name` looks like it holds a secret
///
/// ```ignore
/// info!(password = %redact_if_sensitive("password", &password), "Loaded settings");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let field = field_name.to_ascii_lowercase();
    if SECRET_MARKERS.iter().any(|marker| field.contains(marker)) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

/// Strip credentials embedded in legacy stream URLs
///
/// Xtream-style URLs carry `/<user>/<pass>/` path segments and
/// `username=`/`password=` query parameters.
pub fn redact_url(url: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };

    let mut segments: Vec<String> = base.split('/').map(str::to_string).collect();
    if let Some(idx) = segments
        .iter()
        .position(|s| matches!(s.as_str(), "series" | "movie" | "live"))
    {
        let len = segments.len();
        for offset in 1..=2 {
            if let Some(seg) = segments.get_mut(idx + offset) {
                if idx + offset + 1 < len {
                    *seg = "***".to_string();
                }
            }
        }
    }
    let mut redacted = segments.join("/");

    if let Some(query) = query {
        let params: Vec<String> = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if matches!(key, "username" | "password") => {
                    format!("{}=***", key)
                }
                _ => pair.to_string(),
            })
            .collect();
        redacted.push('?');
        redacted.push_str(&params.join("&"));
    }

    redacted
}
