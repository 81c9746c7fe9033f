//! Merge of fallback episode listings into provider info

use core_library::models::{EpisodeInfo, EpisodeList, InfoSource, ProviderInfo};
use std::collections::HashSet;

/// Where an episode sits in a listing; unnumbered episodes only by id
#[derive(Debug, PartialEq, Eq, Hash)]
enum SlotKey<'a> {
    Numbered(u32, u32),
    Unnumbered(&'a str),
}

fn slot_key(episode: &EpisodeInfo) -> SlotKey<'_> {
    if episode.episode > 0 {
        SlotKey::Numbered(episode.season, episode.episode)
    } else {
        SlotKey::Unnumbered(&episode.id)
    }
}

/// Fold a fallback listing into the last known provider info of a series
///
/// The fallback owns every slot it reports: primary entries in those slots
/// are replaced, while every fallback entry is kept, including several
/// sharing one slot. Primary entries in slots the fallback does not report
/// are kept. A source id reported twice by the fallback keeps its last
/// entry. The result is sorted by season, episode, then id.
pub fn merge(series_id: i64, primary: Option<&ProviderInfo>, fallback: EpisodeList) -> ProviderInfo {
    let base = primary.map(|p| p.episodes.as_slice()).unwrap_or_default();
    let has_primary = !base.is_empty();

    let mut seen_ids = HashSet::new();
    let mut reported: Vec<EpisodeInfo> = fallback
        .into_iter()
        .rev()
        .filter(|ep| seen_ids.insert(ep.id.clone()))
        .collect();
    reported.reverse();

    let mut episodes: EpisodeList = {
        let owned: HashSet<SlotKey<'_>> = reported.iter().map(slot_key).collect();
        base.iter()
            .filter(|ep| !owned.contains(&slot_key(ep)))
            .cloned()
            .collect()
    };
    episodes.extend(reported);
    episodes.sort_by(|a, b| (a.season, a.episode, &a.id).cmp(&(b.season, b.episode, &b.id)));

    ProviderInfo {
        series_id,
        episodes,
        source: if has_primary {
            InfoSource::Merged
        } else {
            InfoSource::Fallback
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(id: &str, season: u32, number: u32, url: &str) -> EpisodeInfo {
        EpisodeInfo {
            id: id.to_string(),
            season,
            episode: number,
            title: format!("Episode {}", number),
            stream_url: url.to_string(),
            plot: None,
            air_date: None,
        }
    }

    #[test]
    fn test_fallback_only() {
        let merged = merge(
            7,
            None,
            vec![episode("b", 1, 2, "x2"), episode("a", 1, 1, "x1")],
        );

        assert_eq!(merged.series_id, 7);
        assert_eq!(merged.source, InfoSource::Fallback);
        let ids: Vec<&str> = merged.episodes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_fallback_wins_same_slot_and_primary_is_kept_elsewhere() {
        let primary = ProviderInfo::primary(
            7,
            vec![episode("p1", 1, 1, "old"), episode("p3", 1, 3, "p3")],
        );
        let merged = merge(
            7,
            Some(&primary),
            vec![episode("f1", 1, 1, "new"), episode("f2", 1, 2, "f2")],
        );

        assert_eq!(merged.source, InfoSource::Merged);
        let urls: Vec<&str> = merged
            .episodes
            .iter()
            .map(|e| e.stream_url.as_str())
            .collect();
        assert_eq!(urls, vec!["new", "f2", "p3"]);
    }

    #[test]
    fn test_unnumbered_episodes_keyed_by_id() {
        let merged = merge(
            7,
            None,
            vec![episode("x", 2, 0, "x"), episode("y", 2, 0, "y")],
        );
        assert_eq!(merged.episodes.len(), 2);
    }

    #[test]
    fn test_empty_primary_counts_as_absent() {
        let primary = ProviderInfo::primary(7, Vec::new());
        let merged = merge(7, Some(&primary), vec![episode("a", 1, 1, "a")]);
        assert_eq!(merged.source, InfoSource::Fallback);
    }

    #[test]
    fn test_contains_every_fallback_episode() {
        let fallback: Vec<EpisodeInfo> = (1..=5)
            .map(|n| episode(&n.to_string(), 1 + n % 2, n, "u"))
            .collect();
        let merged = merge(7, None, fallback.clone());
        for ep in &fallback {
            assert!(merged.episodes.contains(ep));
        }
    }

    #[test]
    fn test_episodes_sharing_a_slot_are_all_kept() {
        let primary = ProviderInfo::primary(7, vec![episode("p1", 1, 1, "old")]);
        let merged = merge(
            7,
            Some(&primary),
            vec![
                episode("e1", 1, 1, "secrets"),
                episode("e9", 1, 1, "secrets-extended"),
                episode("e9", 1, 1, "secrets-extended-v2"),
            ],
        );

        let urls: Vec<&str> = merged
            .episodes
            .iter()
            .map(|e| e.stream_url.as_str())
            .collect();
        assert_eq!(urls, vec!["secrets", "secrets-extended-v2"]);
    }
}
