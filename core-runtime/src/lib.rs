//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the exporter:
//! - Logging and tracing infrastructure
//! - Immutable run configuration with validation
//! - Vars-file and environment loading
//! - Shared rate limiting for external APIs
//!
//! ## Overview
//!
//! Every other crate receives an [`ExportConfig`](config::ExportConfig) (or a
//! slice of it) at construction time. Only [`ConfigLoader`](loader::ConfigLoader)
//! reads the process environment.

pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod rate_limit;

pub use config::{ExportConfig, ExportConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use rate_limit::RateLimiter;
