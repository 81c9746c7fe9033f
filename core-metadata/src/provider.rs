//! Metadata provider capability

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use core_library::models::EntityKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What to look up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    /// Movie or series; episodes are described from catalog fields only
    pub kind: EntityKind,
    pub title: String,
    pub year: Option<i32>,
    pub language: String,
}

/// Rich metadata resolved by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Provider-scoped id, e.g. `tmdb:27205`
    pub provider_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub plot: Option<String>,
    pub genres: Vec<String>,
    pub rating: Option<f32>,
    /// Absolute image URLs at the configured sizes
    pub poster_url: Option<String>,
    pub fanart_url: Option<String>,
}

impl Metadata {
    /// Stable hash of the resolved fields, stored with the cache record
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.title.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.year.map(|y| y.to_string()).unwrap_or_default());
        hasher.update(b"\0");
        hasher.update(self.plot.as_deref().unwrap_or_default());
        hasher.update(b"\0");
        hasher.update(self.genres.join("|"));
        hasher.update(b"\0");
        hasher.update(self.poster_url.as_deref().unwrap_or_default());
        hasher.update(b"\0");
        hasher.update(self.fanart_url.as_deref().unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }
}

/// External metadata source (TMDB in production)
///
/// Implementations enforce their own rate limit and map a miss to
/// [`MetadataError::NotFound`](crate::error::MetadataError::NotFound).
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    async fn lookup(&self, query: &LookupQuery) -> Result<Metadata>;

    async fn fetch_image(&self, url: &str) -> Result<Bytes>;
}
