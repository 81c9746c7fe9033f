//! # Path Planner
//!
//! Computes the canonical [`TargetPath`] of every live entity in a scope.
//!
//! Layout:
//!
//! ```text
//! <movies-root>/<category>/<Title (Year)>/<Title (Year)>.strm
//! <series-root>/<category>/<Title (Year)>/Season NN/SxxEyy - <episode>.strm
//! ```
//!
//! Planning is done per batch so that collisions can be detected. When two
//! live entities would share a folder (compared case-insensitively), every one
//! of them gets its source id appended as ` [<id>]`.

use crate::error::Result;
use crate::models::{
    Account, CacheKey, EntityKind, EntitySnapshot, EpisodeInfo, KnownFields, Movie,
    NormalizedName, Series, TargetPath,
};
use crate::normalizer::{account_dir_name, shorten_component, TitleNormalizer};
use core_runtime::config::OutputConfig;
use std::collections::HashMap;
use std::path::PathBuf;

const UNKNOWN_MOVIE: &str = "Unknown Movie";
const UNKNOWN_SERIES: &str = "Unknown Series";

/// An entity as it should exist on disk after this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntity {
    pub kind: EntityKind,
    pub entity_id: String,
    /// Owning series for episodes
    pub parent_id: Option<String>,
    pub name: NormalizedName,
    pub category: String,
    /// Pointer content; series have none
    pub stream_url: Option<String>,
    pub target: TargetPath,
    pub known: KnownFields,
}

impl DesiredEntity {
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            title: self.name.title.clone(),
            year: self.name.year,
            category: self.category.clone(),
            stream_url: self.stream_url.clone(),
            target: self.target.clone(),
        }
    }

    pub fn key(&self, account: &str) -> CacheKey {
        CacheKey::new(account, self.kind, &self.entity_id)
    }
}

/// Pure planner for one run
#[derive(Debug, Clone)]
pub struct PathPlanner {
    output: OutputConfig,
    normalizer: TitleNormalizer,
}

impl PathPlanner {
    pub fn new(output: &OutputConfig) -> Result<Self> {
        let normalizer = TitleNormalizer::new(&output.junk_tokens, &output.unsafe_char_substitute)?;
        Ok(Self {
            output: output.clone(),
            normalizer,
        })
    }

    pub fn normalizer(&self) -> &TitleNormalizer {
        &self.normalizer
    }

    pub fn movies_root(&self, account: &Account) -> PathBuf {
        self.output.movies_root(&account_dir_name(&account.name))
    }

    pub fn series_root(&self, account: &Account) -> PathBuf {
        self.output.series_root(&account_dir_name(&account.name))
    }

    /// Sanitized, length-limited category folder; blank maps to the default bucket
    pub fn category(&self, raw: Option<&str>) -> String {
        let cleaned = raw
            .map(|c| self.normalizer.sanitize(c))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.normalizer.sanitize(&self.output.default_category));
        shorten_component(&cleaned, self.output.max_component_len)
    }

    /// Normalized name with the catalog year taking precedence
    pub fn entity_name(&self, raw_title: &str, catalog_year: Option<i32>, unknown: &str) -> NormalizedName {
        let normalized = self.normalizer.normalize(raw_title);
        let title = if normalized.title.is_empty() {
            unknown.to_string()
        } else {
            normalized.title
        };
        let year = catalog_year.filter(|y| valid_year(*y)).or(normalized.year);
        NormalizedName { title, year }
    }

    pub fn movie_name(&self, movie: &Movie) -> NormalizedName {
        self.entity_name(&movie.raw_title, movie.year, UNKNOWN_MOVIE)
    }

    pub fn series_name(&self, series: &Series) -> NormalizedName {
        self.entity_name(&series.raw_title, series.year, UNKNOWN_SERIES)
    }

    /// Plan every movie of an account
    pub fn plan_movies(&self, account: &Account, movies: &[Movie]) -> Vec<DesiredEntity> {
        let root = self.movies_root(account);

        let prepared: Vec<(Slot, &Movie, NormalizedName, String)> = movies
            .iter()
            .map(|movie| {
                let name = self.movie_name(movie);
                let category = self.category(movie.category.as_deref());
                let slot = Slot {
                    group: category.clone(),
                    full: name.display(),
                    id: movie.id.to_string(),
                };
                (slot, movie, name, category)
            })
            .collect();

        let slots: Vec<&Slot> = prepared.iter().map(|(slot, ..)| slot).collect();
        let folders = self.resolve_names(&slots);

        prepared
            .iter()
            .zip(folders)
            .map(|((_, movie, name, category), folder)| {
                let dir = root.join(category).join(&folder);
                DesiredEntity {
                    kind: EntityKind::Movie,
                    entity_id: movie.id.to_string(),
                    parent_id: None,
                    name: name.clone(),
                    category: category.clone(),
                    stream_url: Some(movie.stream_url.clone()),
                    target: TargetPath {
                        root: root.clone(),
                        pointer: Some(dir.join(format!("{}.strm", folder))),
                        nfo: dir.join("movie.nfo"),
                        poster: Some(dir.join("poster.jpg")),
                        fanart: Some(dir.join("fanart.jpg")),
                        dir,
                    },
                    known: KnownFields {
                        title: name.title.clone(),
                        year: name.year,
                        plot: movie.plot.clone(),
                        genre: movie.category.clone(),
                        poster_url: movie.artwork_url.clone(),
                        unique_id: Some(movie.uuid.clone()),
                        ..KnownFields::default()
                    },
                }
            })
            .collect()
    }

    /// Plan every series folder of an account
    pub fn plan_series(&self, account: &Account, series: &[Series]) -> Vec<DesiredEntity> {
        let root = self.series_root(account);

        let prepared: Vec<(Slot, &Series, NormalizedName, String)> = series
            .iter()
            .map(|s| {
                let name = self.series_name(s);
                let category = self.category(s.category.as_deref());
                let slot = Slot {
                    group: category.clone(),
                    full: name.display(),
                    id: s.id.to_string(),
                };
                (slot, s, name, category)
            })
            .collect();

        let slots: Vec<&Slot> = prepared.iter().map(|(slot, ..)| slot).collect();
        let folders = self.resolve_names(&slots);

        prepared
            .iter()
            .zip(folders)
            .map(|((_, s, name, category), folder)| {
                let dir = root.join(category).join(&folder);
                DesiredEntity {
                    kind: EntityKind::Series,
                    entity_id: s.id.to_string(),
                    parent_id: None,
                    name: name.clone(),
                    category: category.clone(),
                    stream_url: None,
                    target: TargetPath {
                        root: root.clone(),
                        pointer: None,
                        nfo: dir.join("tvshow.nfo"),
                        poster: Some(dir.join("poster.jpg")),
                        fanart: Some(dir.join("fanart.jpg")),
                        dir,
                    },
                    known: KnownFields {
                        title: name.title.clone(),
                        year: name.year,
                        plot: s.plot.clone(),
                        genre: s.category.clone(),
                        poster_url: s.artwork_url.clone(),
                        unique_id: s.external_id.clone(),
                        ..KnownFields::default()
                    },
                }
            })
            .collect()
    }

    /// Plan the episodes of one already-planned series
    pub fn plan_episodes(&self, series: &DesiredEntity, episodes: &[EpisodeInfo]) -> Vec<DesiredEntity> {
        let limit = self.output.max_component_len;

        let mut slot_counts: HashMap<(u32, u32), usize> = HashMap::new();
        for ep in episodes.iter().filter(|ep| ep.episode > 0) {
            *slot_counts.entry((ep.season, ep.episode)).or_default() += 1;
        }

        let prepared: Vec<(Slot, &EpisodeInfo, String)> = episodes
            .iter()
            .map(|ep| {
                let cleaned = self.normalizer.normalize(&ep.title).title;
                let title = if cleaned.is_empty() {
                    format!("Episode {}", ep.episode)
                } else {
                    shorten_component(&cleaned, limit)
                };
                let code = if ep.episode > 0 {
                    format!("S{:02}E{:02}", ep.season, ep.episode)
                } else {
                    format!("S{:02}", ep.season)
                };
                let slot = Slot {
                    group: season_dir_name(ep.season),
                    full: format!("{} - {}", code, title),
                    id: ep.id.clone(),
                };
                (slot, ep, title)
            })
            .collect();

        let slots: Vec<&Slot> = prepared.iter().map(|(slot, ..)| slot).collect();
        let stems = self.resolve_names(&slots);

        prepared
            .iter()
            .zip(stems)
            .map(|((slot, ep, title), stem)| {
                let season_dir = series.target.dir.join(&slot.group);
                DesiredEntity {
                    kind: EntityKind::Episode,
                    entity_id: episode_entity_id(
                        &series.entity_id,
                        ep,
                        slot_counts.get(&(ep.season, ep.episode)).copied().unwrap_or(0) > 1,
                    ),
                    parent_id: Some(series.entity_id.clone()),
                    name: NormalizedName {
                        title: title.clone(),
                        year: None,
                    },
                    category: series.category.clone(),
                    stream_url: Some(ep.stream_url.clone()),
                    target: TargetPath {
                        root: series.target.root.clone(),
                        pointer: Some(season_dir.join(format!("{}.strm", stem))),
                        nfo: season_dir.join(format!("{}.nfo", stem)),
                        poster: None,
                        fanart: None,
                        dir: season_dir,
                    },
                    known: KnownFields {
                        title: title.clone(),
                        plot: ep.plot.clone(),
                        show_title: Some(series.name.title.clone()),
                        season: Some(ep.season),
                        episode: Some(ep.episode),
                        aired: ep.air_date.clone(),
                        unique_id: Some(ep.id.clone()),
                        ..KnownFields::default()
                    },
                }
            })
            .collect()
    }

    /// Final component names, with colliding slots disambiguated by id
    fn resolve_names(&self, slots: &[&Slot]) -> Vec<String> {
        let limit = self.output.max_component_len;
        let shortened: Vec<String> = slots
            .iter()
            .map(|slot| shorten_component(&slot.full, limit))
            .collect();

        let mut counts: HashMap<(String, String), usize> = HashMap::new();
        for (slot, name) in slots.iter().zip(&shortened) {
            *counts
                .entry((slot.group.to_lowercase(), name.to_lowercase()))
                .or_default() += 1;
        }

        slots
            .iter()
            .zip(shortened)
            .map(|(slot, name)| {
                let key = (slot.group.to_lowercase(), name.to_lowercase());
                if counts.get(&key).copied().unwrap_or(0) > 1 {
                    let suffix = format!(" [{}]", slot.id);
                    let room = limit.saturating_sub(suffix.chars().count());
                    format!("{}{}", shorten_component(&slot.full, room), suffix)
                } else {
                    name
                }
            })
            .collect()
    }
}

/// Grouping used for collision detection: a parent folder plus a name in it
struct Slot {
    group: String,
    full: String,
    id: String,
}

/// `Season NN`, `Season 00` when the season is unknown
pub fn season_dir_name(season: u32) -> String {
    format!("Season {:02}", season)
}

/// Cache identity of an episode within its series
///
/// Numbered episodes are keyed by slot; when several episodes of one listing
/// share a slot, each also carries its source id.
pub fn episode_entity_id(series_id: &str, info: &EpisodeInfo, shared_slot: bool) -> String {
    match (info.episode > 0, shared_slot) {
        (true, false) => format!("{}:S{:02}E{:02}", series_id, info.season, info.episode),
        (true, true) => format!(
            "{}:S{:02}E{:02}:{}",
            series_id, info.season, info.episode, info.id
        ),
        (false, _) => format!("{}:{}", series_id, info.id),
    }
}

fn valid_year(year: i32) -> bool {
    (1800..=2100).contains(&year)
}
