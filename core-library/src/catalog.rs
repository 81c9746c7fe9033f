//! Catalog capability interfaces
//!
//! The sync engine talks to the media platform only through these traits.
//! Implementations live in provider crates; tests use in-memory fakes.

use crate::models::{Account, EpisodeList, Movie, ProviderInfo, Series};
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a catalog call, classified for retry and fallback decisions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Catalog unreachable or login impossible
    #[error("Catalog unreachable: {0}")]
    Connectivity(String),

    /// Transient server-side failure (5xx class, throttling)
    #[error("Recoverable catalog error (status {status}): {message}")]
    Recoverable { status: u16, message: String },

    /// Authentication failure or malformed response; not retried
    #[error("Fatal catalog error: {0}")]
    Fatal(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CatalogError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Primary catalog API
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn list_accounts(&self) -> CatalogResult<Vec<Account>>;

    async fn list_movies(&self, account: &Account) -> CatalogResult<Vec<Movie>>;

    async fn list_series(&self, account: &Account) -> CatalogResult<Vec<Series>>;

    /// Episode listing of one series
    async fn get_series_episodes(
        &self,
        account: &Account,
        series: &Series,
    ) -> CatalogResult<ProviderInfo>;
}

/// Legacy per-account API, consulted only after a recoverable primary failure
#[async_trait]
pub trait FallbackClient: Send + Sync {
    async fn get_series_episodes(
        &self,
        account: &Account,
        series: &Series,
    ) -> CatalogResult<EpisodeList>;
}
