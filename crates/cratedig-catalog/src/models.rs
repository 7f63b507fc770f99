// SPDX-License-Identifier: GPL-3.0-or-later
//! Catalog-side value types (spec §4.2). Deliberately distinct from
//! `cratedig_domain::Track` — these mirror whatever shape the upstream
//! returns; the enricher (C8) is what copies fields across into the
//! durable domain record.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

/// Accepts a JSON string or number and normalises both to a `String`, since
/// upstream ids are inconsistently typed between endpoints.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdShape {
        Str(String),
        Num(serde_json::Number),
    }

    match IdShape::deserialize(deserializer)? {
        IdShape::Str(s) => Ok(s),
        IdShape::Num(n) => Ok(n.to_string()),
    }
}

pub fn deserialize_id_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdShape {
        Str(String),
        Num(serde_json::Number),
        Null,
    }

    match Option::<IdShape>::deserialize(deserializer)? {
        Some(IdShape::Str(s)) => Ok(Some(s)),
        Some(IdShape::Num(n)) => Ok(Some(n.to_string())),
        Some(IdShape::Null) | None => Ok(None),
    }
}

/// Cover art arrives as a bare URL string, an array of `{url}`-like
/// objects, or a single such object; all three normalise to an ordered
/// list of URL strings. A relative cover id (no scheme) is expanded using
/// the CDN convention: dashes become path separators, a size suffix is
/// appended.
pub fn deserialize_cover_art<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(cover_art_urls_from_value(&value))
}

pub fn cover_art_urls_from_value(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) => vec![expand_cover_id(s)],
        serde_json::Value::Array(items) => items.iter().filter_map(cover_url_from_item).collect(),
        obj @ serde_json::Value::Object(_) => cover_url_from_item(obj).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn cover_url_from_item(item: &serde_json::Value) -> Option<String> {
    match item {
        serde_json::Value::String(s) => Some(expand_cover_id(s)),
        serde_json::Value::Object(map) => {
            let raw = map
                .get("url")
                .or_else(|| map.get("id"))
                .or_else(|| map.get("cover"))
                .and_then(|v| v.as_str())?;
            Some(expand_cover_id(raw))
        }
        _ => None,
    }
}

/// A value that already looks like an absolute URL passes through
/// unchanged; a bare id is expanded via the CDN convention.
fn expand_cover_id(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    let path = raw.replace('-', "/");
    format!("https://resources.tidal.com/images/{path}/1280x1280.jpg")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Artist,
    Album,
    Playlist,
    Track,
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchKind::Artist => "artists",
            SearchKind::Album => "albums",
            SearchKind::Playlist => "playlists",
            SearchKind::Track => "tracks",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogTrack {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub artist_ids: Vec<String>,
    #[serde(default)]
    pub albums: Vec<String>,
    #[serde(default)]
    pub album_artists: Vec<String>,
    #[serde(default)]
    pub album_artist_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_id_opt")]
    pub album_id: Option<String>,
    pub disc_number: Option<i64>,
    pub track_number: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default, deserialize_with = "deserialize_cover_art")]
    pub cover_urls: Vec<String>,
    pub audio_quality: Option<String>,
    #[serde(default)]
    pub audio_modes: Vec<String>,
    pub version: Option<String>,
    pub copyright: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogAlbum {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub artist_ids: Vec<String>,
    pub release_date: Option<String>,
    pub total_tracks: Option<i64>,
    pub total_discs: Option<i64>,
    pub genre: Option<String>,
    pub label: Option<String>,
    pub barcode: Option<String>,
    pub catalog_number: Option<String>,
    pub release_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_cover_art")]
    pub cover_urls: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogArtist {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_cover_art")]
    pub cover_urls: Vec<String>,
    #[serde(default)]
    pub top_tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogPlaylist {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_cover_art")]
    pub cover_urls: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub artists: Vec<CatalogArtist>,
    #[serde(default)]
    pub albums: Vec<CatalogAlbum>,
    #[serde(default)]
    pub playlists: Vec<CatalogPlaylist>,
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Lyrics {
    pub plain: Option<String>,
    pub timed: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_accepts_string_or_number() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_id")]
            id: String,
        }
        let from_str: Wrapper = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        let from_num: Wrapper = serde_json::from_str(r#"{"id": 123}"#).unwrap();
        assert_eq!(from_str.id, "abc");
        assert_eq!(from_num.id, "123");
    }

    #[test]
    fn cover_art_normalises_all_three_shapes() {
        let as_string = cover_art_urls_from_value(&serde_json::json!("abc-def"));
        assert_eq!(as_string, vec!["https://resources.tidal.com/images/abc/def/1280x1280.jpg"]);

        let as_array = cover_art_urls_from_value(&serde_json::json!([{"url": "https://cdn/x.jpg"}]));
        assert_eq!(as_array, vec!["https://cdn/x.jpg"]);

        let as_object = cover_art_urls_from_value(&serde_json::json!({"id": "abc-def"}));
        assert_eq!(as_object, vec!["https://resources.tidal.com/images/abc/def/1280x1280.jpg"]);
    }

    #[test]
    fn cover_art_passes_through_absolute_urls() {
        let urls = cover_art_urls_from_value(&serde_json::json!("https://cdn/already-absolute.jpg"));
        assert_eq!(urls, vec!["https://cdn/already-absolute.jpg"]);
    }
}
