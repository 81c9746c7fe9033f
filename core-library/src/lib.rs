//! # Catalog Library Module
//!
//! Domain model and pure planning logic of the exporter, plus its durable
//! cache.
//!
//! ## Overview
//!
//! This module manages:
//! - Catalog entities, names, target paths and cache records
//! - Title normalization and path planning
//! - Account selection by name pattern
//! - Catalog and fallback capability interfaces
//! - The SQLite cache store and its migrations

pub mod accounts;
pub mod cache;
pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod planner;

pub use accounts::AccountFilter;
pub use cache::{CacheStore, SqliteCacheStore};
pub use catalog::{CatalogClient, CatalogError, CatalogResult, FallbackClient};
pub use error::{LibraryError, Result};
pub use normalizer::TitleNormalizer;
pub use planner::{DesiredEntity, PathPlanner};
