//! Dispatcharr and Xtream-Codes response types
//!
//! Both APIs are loose about types: ids and years arrive as numbers or
//! strings, episode lists as arrays or season maps. Fields that vary are kept
//! as [`serde_json::Value`] and read through the helpers below.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/accounts/token/` body
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// `POST /api/accounts/token/` response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access: Option<String>,
}

/// A list endpoint answer: a DRF page or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page {
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default = "Vec::new")]
        results: Vec<T>,
    },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    /// Rows of this page and whether the server announced another one
    pub fn into_parts(self) -> (Vec<T>, Option<bool>) {
        match self {
            Listing::Page { next, results, .. } => {
                let has_next = next.map(|n| !n.is_empty()).unwrap_or(false);
                (results, Some(has_next))
            }
            Listing::Bare(rows) => (rows, None),
        }
    }
}

/// `/api/m3u/accounts/` item
#[derive(Debug, Clone, Deserialize)]
pub struct ApiAccount {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiLogo {
    #[serde(default)]
    pub url: Option<String>,
}

/// Fields shared by movie and series rows
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiVodItem {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub category_name: Option<Value>,
    #[serde(default)]
    pub group_name: Option<Value>,
    #[serde(default)]
    pub series_id: Option<Value>,
    #[serde(default)]
    pub external_id: Option<Value>,
    #[serde(default)]
    pub logo: Option<ApiLogo>,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub custom_properties: Option<Value>,
}

impl ApiVodItem {
    pub fn display_name(&self) -> Option<String> {
        [&self.name, &self.title]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn year(&self) -> Option<i32> {
        self.year.as_ref().and_then(loose_i64).and_then(|y| i32::try_from(y).ok())
    }

    pub fn plot(&self) -> Option<String> {
        [&self.description, &self.plot]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .cloned()
    }

    /// `category`, `category_name`, `group_name`, then the same keys under
    /// `custom_properties`
    pub fn category(&self) -> Option<String> {
        [&self.category, &self.category_name, &self.group_name]
            .into_iter()
            .flatten()
            .find_map(loose_string)
            .or_else(|| self.custom_property(&["category", "category_name", "group_name"]))
    }

    /// Series id on the legacy API
    pub fn external_id(&self) -> Option<String> {
        [&self.series_id, &self.external_id]
            .into_iter()
            .flatten()
            .find_map(loose_string)
            .or_else(|| self.custom_property(&["series_id", "external_id"]))
    }

    pub fn artwork_url(&self) -> Option<String> {
        self.logo
            .as_ref()
            .and_then(|l| l.url.clone())
            .or_else(|| self.poster.clone())
            .filter(|u| !u.trim().is_empty())
    }

    fn custom_property(&self, keys: &[&str]) -> Option<String> {
        let properties = self.custom_properties.as_ref()?.as_object()?;
        keys.iter()
            .filter_map(|key| properties.get(*key))
            .find_map(loose_string)
    }
}

/// `/api/vod/series/<id>/provider-info/` response
#[derive(Debug, Default, Deserialize)]
pub struct ProviderInfoResponse {
    #[serde(default)]
    pub episodes: Option<Value>,
}

/// Episode row inside provider info
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEpisode {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub season_number: Option<Value>,
    #[serde(default)]
    pub season: Option<Value>,
    #[serde(default)]
    pub season_num: Option<Value>,
    #[serde(default)]
    pub episode_number: Option<Value>,
    #[serde(default)]
    pub episode_num: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
}

impl ApiEpisode {
    pub fn season(&self) -> u32 {
        first_u32(&[&self.season_number, &self.season, &self.season_num])
    }

    pub fn number(&self) -> u32 {
        first_u32(&[&self.episode_number, &self.episode_num])
    }

    pub fn title(&self) -> String {
        [&self.title, &self.name]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Episode {}", self.number()))
    }

    pub fn plot(&self) -> Option<String> {
        [&self.description, &self.plot]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .cloned()
    }
}

/// `player_api.php?action=get_series_info` response
#[derive(Debug, Default, Deserialize)]
pub struct XcSeriesInfo {
    #[serde(default)]
    pub episodes: Option<Value>,
}

/// Episode row of the legacy API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct XcEpisode {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub episode_num: Option<Value>,
    #[serde(default)]
    pub season: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub info: Option<XcEpisodeInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XcEpisodeInfo {
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub releasedate: Option<String>,
}

/// Flatten an episode collection that is either an array or a map of
/// season key to array; non-object rows are dropped
///
/// Map entries come back with their season key so callers can use it when
/// a row lacks its own season.
pub fn flatten_episodes(value: &Value) -> Vec<(Option<u32>, Value)> {
    match value {
        Value::Array(rows) => rows
            .iter()
            .filter(|row| row.is_object())
            .map(|row| (None, row.clone()))
            .collect(),
        Value::Object(seasons) => seasons
            .iter()
            .flat_map(|(key, rows)| {
                let season = key.trim().parse::<u32>().ok();
                rows.as_array()
                    .into_iter()
                    .flatten()
                    .filter(|row| row.is_object())
                    .map(move |row| (season, row.clone()))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Integer from a number or numeric string
pub fn loose_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty string from a string or number
pub fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_u32(values: &[&Option<Value>]) -> u32 {
    values
        .iter()
        .copied()
        .flatten()
        .filter_map(loose_i64)
        .find(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_shapes() {
        let page: Listing<ApiAccount> = serde_json::from_value(json!({
            "count": 1,
            "next": null,
            "results": [{"id": 3, "name": "Demo"}]
        }))
        .unwrap();
        let (rows, has_next) = page.into_parts();
        assert_eq!(rows.len(), 1);
        assert_eq!(has_next, Some(false));

        let bare: Listing<ApiAccount> = serde_json::from_value(json!([{"id": 3}])).unwrap();
        let (rows, has_next) = bare.into_parts();
        assert_eq!(rows[0].id, 3);
        assert_eq!(has_next, None);
    }

    #[test]
    fn test_category_lookup_order() {
        let item: ApiVodItem = serde_json::from_value(json!({
            "id": 1,
            "category": "",
            "group_name": "Action",
            "custom_properties": {"category": "Ignored"}
        }))
        .unwrap();
        assert_eq!(item.category().as_deref(), Some("Action"));

        let nested: ApiVodItem = serde_json::from_value(json!({
            "id": 2,
            "custom_properties": {"category_name": "Kids"}
        }))
        .unwrap();
        assert_eq!(nested.category().as_deref(), Some("Kids"));
    }

    #[test]
    fn test_loose_fields() {
        let item: ApiVodItem = serde_json::from_value(json!({
            "id": 1,
            "name": "  ",
            "title": "Heat",
            "year": "1995",
            "custom_properties": {"series_id": 4411}
        }))
        .unwrap();
        assert_eq!(item.display_name().as_deref(), Some("Heat"));
        assert_eq!(item.year(), Some(1995));
        assert_eq!(item.external_id().as_deref(), Some("4411"));
    }

    #[test]
    fn test_episode_fields() {
        let episode: ApiEpisode = serde_json::from_value(json!({
            "uuid": "e-1",
            "season": "2",
            "episode_num": 5
        }))
        .unwrap();
        assert_eq!(episode.season(), 2);
        assert_eq!(episode.number(), 5);
        assert_eq!(episode.title(), "Episode 5");
    }

    #[test]
    fn test_flatten_episode_map() {
        let flat = flatten_episodes(&json!({
            "1": [{"id": "a"}, {"id": "b"}],
            "2": [{"id": "c"}, "junk"]
        }));
        assert_eq!(flat.len(), 3);
        assert!(flat.iter().any(|(season, row)| *season == Some(2) && row["id"] == "c"));

        assert!(flatten_episodes(&json!("nope")).is_empty());
    }
}
