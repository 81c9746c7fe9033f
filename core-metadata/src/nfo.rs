//! NFO sidecar rendering
//!
//! Produces the XML documents Kodi, Emby and Jellyfin read next to media
//! files: `<movie>`, `<tvshow>` and `<episodedetails>`. Only fields that are
//! known are emitted.
//!
//! Catalog fields are the baseline. Resolved [`Metadata`] fills plot, genres,
//! rating and artwork where present, but never replaces the title, which must
//! keep matching the folder name.

use crate::error::Result;
use crate::provider::Metadata;
use core_library::models::KnownFields;
use quick_xml::se::Serializer;
use serde::Serialize;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Debug, Serialize)]
struct UniqueId {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@default", skip_serializing_if = "Option::is_none")]
    default: Option<bool>,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Serialize)]
struct Thumb {
    #[serde(rename = "@aspect", skip_serializing_if = "Option::is_none")]
    aspect: Option<&'static str>,
    #[serde(rename = "$text")]
    url: String,
}

#[derive(Debug, Serialize)]
struct Fanart {
    thumb: Thumb,
}

/// Body of `<movie>` and `<tvshow>`
#[derive(Debug, Serialize)]
struct TitleDetails {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    genre: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    uniqueid: Vec<UniqueId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumb: Option<Thumb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fanart: Option<Fanart>,
}

#[derive(Debug, Serialize)]
struct EpisodeDetails {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    showtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    episode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aired: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uniqueid: Option<UniqueId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumb: Option<Thumb>,
}

/// Trimmed text without the control characters XML 1.0 rejects
fn clean(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn clean_opt(value: Option<&str>) -> Option<String> {
    value.map(clean).filter(|v| !v.is_empty())
}

fn catalog_id(known: &KnownFields) -> Option<UniqueId> {
    clean_opt(known.unique_id.as_deref()).map(|value| UniqueId {
        kind: "catalog".to_string(),
        default: None,
        value,
    })
}

fn poster(url: Option<&str>) -> Option<Thumb> {
    clean_opt(url).map(|url| Thumb {
        aspect: Some("poster"),
        url,
    })
}

/// Catalog fields first, then whatever the provider adds
fn title_details(known: &KnownFields, metadata: Option<&Metadata>) -> TitleDetails {
    let plot = metadata
        .and_then(|m| m.plot.as_deref())
        .or(known.plot.as_deref());

    let genre = match metadata {
        Some(m) if !m.genres.is_empty() => m.genres.iter().map(|g| clean(g)).collect(),
        _ => clean_opt(known.genre.as_deref()).into_iter().collect(),
    };

    let mut uniqueid: Vec<UniqueId> = metadata
        .and_then(|m| m.provider_id.split_once(':'))
        .map(|(kind, id)| UniqueId {
            kind: clean(kind),
            default: Some(true),
            value: clean(id),
        })
        .into_iter()
        .collect();
    uniqueid.extend(catalog_id(known));

    TitleDetails {
        title: clean(&known.title),
        year: known.year.or_else(|| metadata.and_then(|m| m.year)),
        plot: clean_opt(plot),
        rating: metadata.and_then(|m| m.rating).map(|r| format!("{:.1}", r)),
        genre,
        uniqueid,
        thumb: poster(
            metadata
                .and_then(|m| m.poster_url.as_deref())
                .or(known.poster_url.as_deref()),
        ),
        fanart: clean_opt(metadata.and_then(|m| m.fanart_url.as_deref())).map(|url| Fanart {
            thumb: Thumb { aspect: None, url },
        }),
    }
}

fn to_document<T: Serialize>(root: &str, body: &T) -> Result<String> {
    let mut xml = String::from(XML_HEADER);
    xml.push('\n');
    let mut serializer = Serializer::with_root(&mut xml, Some(root))?;
    serializer.indent(' ', 2);
    body.serialize(serializer)?;
    xml.push('\n');
    Ok(xml)
}

/// Render `movie.nfo`
pub fn render_movie(known: &KnownFields, metadata: Option<&Metadata>) -> Result<String> {
    to_document("movie", &title_details(known, metadata))
}

/// Render `tvshow.nfo`
pub fn render_tvshow(known: &KnownFields, metadata: Option<&Metadata>) -> Result<String> {
    to_document("tvshow", &title_details(known, metadata))
}

/// Render an episode's `<stem>.nfo`
///
/// Episodes are described from catalog fields only.
pub fn render_episode(known: &KnownFields) -> Result<String> {
    let details = EpisodeDetails {
        title: clean(&known.title),
        showtitle: clean_opt(known.show_title.as_deref()),
        season: known.season,
        episode: known.episode,
        aired: clean_opt(known.aired.as_deref()),
        plot: clean_opt(known.plot.as_deref()),
        uniqueid: catalog_id(known),
        thumb: clean_opt(known.poster_url.as_deref()).map(|url| Thumb { aspect: None, url }),
    };
    to_document("episodedetails", &details)
}
