//! # Dispatcharr Provider
//!
//! Implements the catalog capability interfaces against a Dispatcharr
//! platform and its upstream Xtream-Codes panels.
//!
//! ## Overview
//!
//! This module provides:
//! - JWT login with a single re-login on token rejection
//! - Paginated movie and series listings per account
//! - Series episodes from the provider-info endpoint
//! - A rate-limited legacy `player_api.php` fallback for episodes

pub mod client;
pub mod error;
pub mod types;
pub mod xtream;

pub use client::DispatcharrClient;
pub use error::{DispatcharrError, Result};
pub use xtream::XtreamClient;
