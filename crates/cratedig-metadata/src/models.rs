// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Deserialize;

use cratedig_domain::parse_year;

/// Artist credit entry on a recording or release (flattened on read).
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistCredit {
    pub name: String,
    pub artist: ArtistRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelInfo {
    #[serde(rename = "catalog-number", default)]
    pub catalog_number: Option<String>,
    #[serde(default)]
    pub label: Option<Label>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseGroup {
    pub id: String,
    #[serde(rename = "primary-type", default)]
    pub primary_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(rename = "label-info", default)]
    pub label_info: Vec<LabelInfo>,
    #[serde(rename = "release-group", default)]
    pub release_group: Option<ReleaseGroup>,
}

/// A single recording as returned by the external metadata service,
/// whether fetched by id or matched via an ISRC search.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingResponse {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRecordingResponse {
    #[serde(default)]
    pub recordings: Vec<RecordingResponse>,
}

/// Flattened view of a matched recording, ready to fill the empty fields
/// of a `Track` (spec §4.4 / §4.8).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingMetadata {
    pub artists: Vec<String>,
    pub artist_ids: Vec<String>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub release_date: Option<String>,
    pub year: Option<i64>,
    pub barcode: Option<String>,
    pub catalog_number: Option<String>,
    pub release_type: Option<String>,
    pub label: Option<String>,
}

impl From<RecordingResponse> for RecordingMetadata {
    fn from(recording: RecordingResponse) -> Self {
        let artists = recording
            .artist_credit
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let artist_ids = recording
            .artist_credit
            .iter()
            .map(|c| c.artist.id.clone())
            .collect();

        let release = recording.releases.into_iter().next();
        let mut metadata = RecordingMetadata {
            artists,
            artist_ids,
            ..Default::default()
        };

        if let Some(release) = release {
            metadata.album = Some(release.title);
            metadata.album_id = Some(release.id);
            metadata.barcode = release.barcode;
            metadata.release_type = release.release_group.as_ref().and_then(|g| g.primary_type.clone());
            if let Some(info) = release.label_info.into_iter().next() {
                metadata.catalog_number = info.catalog_number;
                metadata.label = info.label.map(|l| l.name);
            }
            if let Some(date) = release.date {
                metadata.year = Some(parse_year(&date));
                metadata.release_date = Some(date);
            }
        }

        metadata
    }
}
