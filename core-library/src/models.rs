//! Domain models for the VOD catalog and the exported pointer tree
//!
//! Catalog entities arrive from the catalog client, are named by the
//! [`TitleNormalizer`](crate::normalizer::TitleNormalizer), placed by the
//! [`PathPlanner`](crate::planner::PathPlanner) and remembered between runs as
//! [`CacheRecord`]s.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// =============================================================================
// Accounts
// =============================================================================

/// A catalog account (one upstream provider inside the media platform)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Platform-side account id
    pub id: i64,
    /// Display name, matched against the configured patterns
    pub name: String,
    /// Legacy API base URL, when the account has one
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// e.g. `XC` or `STD`
    pub account_type: Option<String>,
}

impl Account {
    /// Whether the legacy per-account API can be used as a fallback
    pub fn has_legacy_credentials(&self) -> bool {
        [&self.server_url, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
    }
}

// =============================================================================
// Catalog entities
// =============================================================================

/// Kind of catalog entity tracked by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Movie,
    Series,
    Episode,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Episode => "episode",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "series" => Ok(Self::Series),
            "episode" => Ok(Self::Episode),
            other => Err(format!("Unknown entity kind: {}", other)),
        }
    }
}

/// A movie as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub uuid: String,
    pub raw_title: String,
    /// Year reported separately by the catalog; wins over a year in the title
    pub year: Option<i32>,
    pub category: Option<String>,
    /// Resolved playback URL written into the pointer file
    pub stream_url: String,
    pub plot: Option<String>,
    pub artwork_url: Option<String>,
}

/// A series as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub raw_title: String,
    pub year: Option<i32>,
    pub category: Option<String>,
    /// Series id on the legacy per-account API
    pub external_id: Option<String>,
    pub plot: Option<String>,
    pub artwork_url: Option<String>,
}

/// One episode inside provider info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    /// Source id (platform uuid, or legacy episode id)
    pub id: String,
    /// Season number, 0 when unknown
    pub season: u32,
    /// Episode number, 0 when unknown
    pub episode: u32,
    pub title: String,
    pub stream_url: String,
    pub plot: Option<String>,
    pub air_date: Option<String>,
}

pub type EpisodeList = Vec<EpisodeInfo>;

/// An episode owned by a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub series_id: i64,
    pub info: EpisodeInfo,
}

impl Episode {
    /// Cache identity of the episode within its series
    ///
    /// Numbered episodes are keyed by slot so that switching between the
    /// primary and the fallback source keeps the same record. This is the
    /// identity of an episode whose slot no sibling shares; see
    /// [`PathPlanner::plan_episodes`](crate::PathPlanner::plan_episodes).
    pub fn entity_id(&self) -> String {
        crate::planner::episode_entity_id(&self.series_id.to_string(), &self.info, false)
    }
}

/// Polymorphic catalog entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntity {
    Movie(Movie),
    Series(Series),
    Episode(Episode),
}

impl CatalogEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Movie(_) => EntityKind::Movie,
            Self::Series(_) => EntityKind::Series,
            Self::Episode(_) => EntityKind::Episode,
        }
    }

    pub fn entity_id(&self) -> String {
        match self {
            Self::Movie(m) => m.id.to_string(),
            Self::Series(s) => s.id.to_string(),
            Self::Episode(e) => e.entity_id(),
        }
    }

    pub fn raw_title(&self) -> &str {
        match self {
            Self::Movie(m) => &m.raw_title,
            Self::Series(s) => &s.raw_title,
            Self::Episode(e) => &e.info.title,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Movie(m) => m.category.as_deref(),
            Self::Series(s) => s.category.as_deref(),
            Self::Episode(_) => None,
        }
    }
}

// =============================================================================
// Provider info
// =============================================================================

/// Where the episode list in a [`ProviderInfo`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoSource {
    Primary,
    Fallback,
    Merged,
}

/// Persisted per-series episode listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub series_id: i64,
    pub episodes: EpisodeList,
    pub source: InfoSource,
}

impl ProviderInfo {
    pub fn primary(series_id: i64, episodes: EpisodeList) -> Self {
        Self {
            series_id,
            episodes,
            source: InfoSource::Primary,
        }
    }
}

// =============================================================================
// Naming and placement
// =============================================================================

/// Clean display name derived from a raw provider title
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedName {
    pub title: String,
    pub year: Option<i32>,
}

impl NormalizedName {
    /// `Title (Year)` or just `Title`
    pub fn display(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Canonical on-disk location of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetPath {
    /// Account scope root (movies or series root); cleanup never goes above it
    pub root: PathBuf,
    /// Folder owned by the entity (movie folder, series folder, season folder)
    pub dir: PathBuf,
    /// Pointer file; series have none
    pub pointer: Option<PathBuf>,
    /// Metadata sidecar
    pub nfo: PathBuf,
    pub poster: Option<PathBuf>,
    pub fanart: Option<PathBuf>,
}

impl TargetPath {
    /// Sidecar and artwork files that belong to the entity
    pub fn sidecars(&self) -> Vec<PathBuf> {
        let mut files = vec![self.nfo.clone()];
        files.extend(self.poster.iter().cloned());
        files.extend(self.fanart.iter().cloned());
        files
    }
}

/// Fields known from the catalog, written into sidecars when the metadata
/// provider has nothing better
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFields {
    pub title: String,
    pub year: Option<i32>,
    pub plot: Option<String>,
    pub genre: Option<String>,
    /// Series title for episodes
    pub show_title: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub aired: Option<String>,
    /// Catalog-provided poster URL
    pub poster_url: Option<String>,
    pub unique_id: Option<String>,
}

// =============================================================================
// Cache records
// =============================================================================

/// Last-seen normalized state of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub title: String,
    pub year: Option<i32>,
    pub category: String,
    pub stream_url: Option<String>,
    pub target: TargetPath,
}

impl EntitySnapshot {
    /// SHA-256 over the fields whose change requires rewriting the pointer
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.year.map(|y| y.to_string()).unwrap_or_default());
        hasher.update(b"\0");
        hasher.update(self.category.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.stream_url.as_deref().unwrap_or_default());
        hasher.update(b"\0");
        hasher.update(self.target.dir.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        if let Some(pointer) = &self.target.pointer {
            hasher.update(pointer.to_string_lossy().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Durable memory of one entity between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub account: String,
    pub kind: EntityKind,
    pub entity_id: String,
    /// Owning series for episodes
    pub parent_id: Option<String>,
    pub snapshot: EntitySnapshot,
    pub fingerprint: String,
    /// Fingerprint of the metadata written into sidecars; `None` means retry
    pub metadata_fingerprint: Option<String>,
    /// Consecutive passes in which the entity was missing from the catalog
    pub missed_passes: u32,
    pub updated_at: i64,
}

impl CacheRecord {
    pub fn new(
        account: impl Into<String>,
        kind: EntityKind,
        entity_id: impl Into<String>,
        snapshot: EntitySnapshot,
        updated_at: i64,
    ) -> Self {
        let fingerprint = snapshot.fingerprint();
        Self {
            account: account.into(),
            kind,
            entity_id: entity_id.into(),
            parent_id: None,
            snapshot,
            fingerprint,
            metadata_fingerprint: None,
            missed_passes: 0,
            updated_at,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.account, self.kind, &self.entity_id)
    }
}

/// Identity of a cache record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub account: String,
    pub kind: EntityKind,
    pub entity_id: String,
}

impl CacheKey {
    pub fn new(account: &str, kind: EntityKind, entity_id: &str) -> Self {
        Self {
            account: account.to_string(),
            kind,
            entity_id: entity_id.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.kind, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(category: &str) -> EntitySnapshot {
        let dir = PathBuf::from(format!("/vod/Demo/Movies/{}/Inception (2010)", category));
        EntitySnapshot {
            title: "Inception".to_string(),
            year: Some(2010),
            category: category.to_string(),
            stream_url: Some("http://host/proxy/vod/movie/u1".to_string()),
            target: TargetPath {
                root: PathBuf::from("/vod/Demo/Movies"),
                pointer: Some(dir.join("Inception (2010).strm")),
                nfo: dir.join("movie.nfo"),
                poster: Some(dir.join("poster.jpg")),
                fanart: Some(dir.join("fanart.jpg")),
                dir,
            },
        }
    }

    #[test]
    fn test_display_name() {
        let name = NormalizedName {
            title: "Inception".to_string(),
            year: Some(2010),
        };
        assert_eq!(name.display(), "Inception (2010)");

        let name = NormalizedName {
            title: "Dark".to_string(),
            year: None,
        };
        assert_eq!(name.to_string(), "Dark");
    }

    #[test]
    fn test_fingerprint_changes_with_category() {
        let a = snapshot("Sci-Fi");
        let b = snapshot("Thriller");
        assert_eq!(a.fingerprint(), snapshot("Sci-Fi").fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_episode_identity_prefers_slot() {
        let mut episode = Episode {
            series_id: 7,
            info: EpisodeInfo {
                id: "uuid-1".to_string(),
                season: 1,
                episode: 3,
                title: "Pilot".to_string(),
                stream_url: "http://x".to_string(),
                plot: None,
                air_date: None,
            },
        };
        assert_eq!(episode.entity_id(), "7:S01E03");

        episode.info.episode = 0;
        assert_eq!(episode.entity_id(), "7:uuid-1");
    }

    #[test]
    fn test_legacy_credentials() {
        let mut account = Account {
            id: 1,
            name: "Demo".to_string(),
            server_url: Some("http://xc.example".to_string()),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            account_type: Some("XC".to_string()),
        };
        assert!(account.has_legacy_credentials());

        account.password = Some(" ".to_string());
        assert!(!account.has_legacy_credentials());
    }

    #[test]
    fn test_entity_kind_round_trip_str() {
        for kind in [EntityKind::Movie, EntityKind::Series, EntityKind::Episode] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("album".parse::<EntityKind>().is_err());
    }
}
