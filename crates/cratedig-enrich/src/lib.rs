// SPDX-License-Identifier: GPL-3.0-or-later

//! Metadata enricher (C8): merges a track's local state with fresh catalog
//! data, external recording data, and lyrics, filling only empty fields and
//! never overwriting a value the user (or a prior enrichment pass) already
//! set.

use cratedig_catalog::CachedCatalogClient;
use cratedig_domain::Track;
use cratedig_metadata::MetadataClient;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// `EnrichFromCatalog`: fills empty track fields from C2, then backfills
/// album-level fields (total tracks/discs, release date, genre, label,
/// barcode, catalog number, release type) from the album when any of the
/// first five are missing and an album id is known.
pub async fn enrich_from_catalog(
    catalog: &CachedCatalogClient,
    track: &mut Track,
    cancel: &CancellationToken,
) -> cratedig_catalog::Result<()> {
    if !track.needs_catalog_enrichment() {
        return Ok(());
    }

    let catalog_track = catalog.get_track(&track.upstream_id, cancel).await?;

    fill_str(&mut track.title, catalog_track.title);
    fill_vec(&mut track.artists, catalog_track.artists);
    fill_vec(&mut track.artist_ids, catalog_track.artist_ids);
    fill_vec(&mut track.albums, catalog_track.albums);
    fill_vec(&mut track.album_artists, catalog_track.album_artists);
    fill_vec(&mut track.album_artist_ids, catalog_track.album_artist_ids);
    fill_str(&mut track.album_id, catalog_track.album_id.clone());
    fill_num(&mut track.disc_number, catalog_track.disc_number);
    fill_num(&mut track.track_number, catalog_track.track_number);
    fill_f64(&mut track.duration_seconds, catalog_track.duration_seconds);
    fill_str(&mut track.isrc, catalog_track.isrc);
    fill_str(
        &mut track.art_url,
        catalog_track.cover_urls.into_iter().next(),
    );
    fill_str(&mut track.audio_quality, catalog_track.audio_quality);
    fill_vec(&mut track.audio_modes, catalog_track.audio_modes);
    fill_str(&mut track.version, catalog_track.version);
    fill_str(&mut track.copyright, catalog_track.copyright);
    if catalog_track.explicit {
        track.explicit = true;
    }

    let needs_album_backfill = track.total_tracks.is_none()
        || track.total_discs.is_none()
        || track.release_date.is_none()
        || track.genre.is_none()
        || track.label.is_none();

    if needs_album_backfill {
        if let Some(album_id) = track.album_id.clone() {
            let album = catalog.get_album(&album_id, cancel).await?;
            fill_num(&mut track.total_tracks, album.total_tracks);
            fill_num(&mut track.total_discs, album.total_discs);
            fill_str(&mut track.release_date, album.release_date);
            fill_str(&mut track.genre, album.genre);
            fill_str(&mut track.label, album.label);
            fill_str(&mut track.barcode, album.barcode);
            fill_str(&mut track.catalog_number, album.catalog_number);
            fill_str(&mut track.release_type, album.release_type);
            fill_str(&mut track.art_url, album.cover_urls.into_iter().next());
        }
    }

    Ok(())
}

/// `EnrichTrack`: no-op without an ISRC or recording id; otherwise calls
/// C4 and fills empty scalar and multi-valued fields from the response.
pub async fn enrich_track(
    metadata: &MetadataClient,
    track: &mut Track,
    cancel: &CancellationToken,
) -> cratedig_metadata::Result<()> {
    if track.isrc.is_none() && track.external_recording_id.is_none() {
        return Ok(());
    }
    if !track.needs_external_enrichment() {
        return Ok(());
    }

    let recording = metadata
        .get_recording(
            cancel,
            track.external_recording_id.as_deref(),
            track.isrc.as_deref(),
            track.title.as_deref(),
        )
        .await?;

    let Some(recording) = recording else {
        return Ok(());
    };

    fill_vec(&mut track.artists, recording.artists);
    fill_vec(&mut track.artist_ids, recording.artist_ids);
    if track.albums.is_empty() {
        if let Some(album) = recording.album {
            track.albums.push(album);
        }
    }
    fill_str(&mut track.album_id, recording.album_id);
    fill_str(&mut track.release_date, recording.release_date);
    fill_num(&mut track.year, recording.year);
    fill_str(&mut track.barcode, recording.barcode);
    fill_str(&mut track.catalog_number, recording.catalog_number);
    fill_str(&mut track.release_type, recording.release_type);
    fill_str(&mut track.label, recording.label);

    Ok(())
}

/// `FetchLyrics`: no-op if either lyrics or subtitles are already present;
/// otherwise calls `C2.GetLyrics` and fills empty fields, swallowing
/// errors (debug-logged only — lyrics are best-effort).
pub async fn fetch_lyrics(catalog: &CachedCatalogClient, track: &mut Track, cancel: &CancellationToken) {
    if track.lyrics.is_some() || track.subtitles.is_some() {
        return;
    }

    match catalog.get_lyrics(&track.upstream_id, cancel).await {
        Ok(lyrics) => {
            fill_str(&mut track.lyrics, lyrics.plain);
            fill_str(&mut track.subtitles, lyrics.timed);
        }
        Err(err) => {
            debug!(target: "enrich", %err, upstream_id = %track.upstream_id, "lyrics fetch failed, skipping");
        }
    }
}

/// Scripted composition: catalog → external → lyrics. Each stage is
/// non-fatal to the others; catalog and external-metadata errors are
/// logged and swallowed so a single flaky upstream never blocks a job.
pub async fn enrich_complete(
    catalog: &CachedCatalogClient,
    metadata: &MetadataClient,
    track: &mut Track,
    cancel: &CancellationToken,
) {
    if let Err(err) = enrich_from_catalog(catalog, track, cancel).await {
        debug!(target: "enrich", %err, upstream_id = %track.upstream_id, "catalog enrichment failed");
    }
    if let Err(err) = enrich_track(metadata, track, cancel).await {
        debug!(target: "enrich", %err, upstream_id = %track.upstream_id, "external enrichment failed");
    }
    fetch_lyrics(catalog, track, cancel).await;
}

fn fill_str(field: &mut Option<String>, value: Option<String>) {
    if field.is_none() {
        *field = value;
    }
}

fn fill_num(field: &mut Option<i64>, value: Option<i64>) {
    if field.is_none() {
        *field = value;
    }
}

fn fill_f64(field: &mut Option<f64>, value: Option<f64>) {
    if field.is_none() {
        *field = value;
    }
}

fn fill_vec(field: &mut Vec<String>, value: Vec<String>) {
    if field.is_empty() {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_str_never_overwrites_present_value() {
        let mut field = Some("kept".to_string());
        fill_str(&mut field, Some("incoming".to_string()));
        assert_eq!(field.as_deref(), Some("kept"));
    }

    #[test]
    fn fill_str_fills_empty_value() {
        let mut field = None;
        fill_str(&mut field, Some("incoming".to_string()));
        assert_eq!(field.as_deref(), Some("incoming"));
    }

    #[test]
    fn fill_vec_never_overwrites_non_empty() {
        let mut field = vec!["kept".to_string()];
        fill_vec(&mut field, vec!["incoming".to_string()]);
        assert_eq!(field, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn enrich_track_is_noop_without_isrc_or_recording_id() {
        let mut track = Track::new("upstream-1");
        track.title = Some("Already set".to_string());

        // No network-capable client is constructed; the no-op path must
        // return before ever touching `metadata`.
        let metadata = MetadataClient::new("http://127.0.0.1:1", std::time::Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        enrich_track(&metadata, &mut track, &cancel).await.unwrap();

        assert_eq!(track.title.as_deref(), Some("Already set"));
    }
}
