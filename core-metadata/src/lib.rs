//! # Metadata Module
//!
//! Resolves catalog titles to rich metadata and renders sidecar files.
//!
//! ## Overview
//!
//! This module handles:
//! - The [`MetadataProvider`] capability consumed by the writer
//! - A rate-limited TMDB client implementing it
//! - Kodi/Emby style NFO rendering for movies, series and episodes
//!
//! Sidecars are always renderable from catalog fields alone; provider data
//! only fills in what the catalog does not know.

pub mod error;
pub mod nfo;
pub mod provider;
pub mod providers;

pub use error::{MetadataError, Result};
pub use provider::{LookupQuery, Metadata, MetadataProvider};
pub use providers::TmdbClient;
