//! External Metadata Providers
//!
//! - TMDB - movie and series overview, genres, rating and artwork
//!
//! Each provider enforces its own rate limit and maps misses to
//! [`MetadataError::NotFound`](crate::error::MetadataError::NotFound).

pub mod tmdb;

pub use tmdb::TmdbClient;
