// SPDX-License-Identifier: GPL-3.0-or-later
//! Row <-> domain-type conversions shared by the job and track tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cratedig_domain::{Job, JobStatus, JobType, Track, TrackStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub(crate) fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp: {s}"))?
        .with_timezone(&Utc))
}

pub(crate) fn parse_dt_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_dt(&s)).transpose()
}

pub(crate) fn json_array_or_empty(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(s).unwrap_or_default()
}

pub(crate) fn to_json_array(v: &[String]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn row_to_job(row: &SqliteRow) -> Result<Job> {
    let job_type: String = row.try_get("job_type")?;
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: row.try_get("id")?,
        job_type: job_type.parse::<JobType>()?,
        status: status.parse::<JobStatus>()?,
        progress: row.try_get::<i64, _>("progress")? as u8,
        source_id: row.try_get("source_id")?,
        error: row.try_get("error")?,
        created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_dt(&row.try_get::<String, _>("updated_at")?)?,
    })
}

#[allow(clippy::too_many_lines)]
pub(crate) fn row_to_track(row: &SqliteRow) -> Result<Track> {
    let status: String = row.try_get("status")?;
    Ok(Track {
        id: row.try_get("id")?,
        upstream_id: row.try_get("upstream_id")?,
        title: row.try_get("title")?,
        artists: json_array_or_empty(&row.try_get::<String, _>("artists")?),
        artist_ids: json_array_or_empty(&row.try_get::<String, _>("artist_ids")?),
        albums: json_array_or_empty(&row.try_get::<String, _>("albums")?),
        album_artists: json_array_or_empty(&row.try_get::<String, _>("album_artists")?),
        album_artist_ids: json_array_or_empty(&row.try_get::<String, _>("album_artist_ids")?),
        album_id: row.try_get("album_id")?,
        disc_number: row.try_get("disc_number")?,
        track_number: row.try_get("track_number")?,
        total_discs: row.try_get("total_discs")?,
        total_tracks: row.try_get("total_tracks")?,
        year: row.try_get("year")?,
        genre: row.try_get("genre")?,
        label: row.try_get("label")?,
        isrc: row.try_get("isrc")?,
        copyright: row.try_get("copyright")?,
        composer: row.try_get("composer")?,
        duration_seconds: row.try_get("duration_seconds")?,
        explicit: row.try_get::<i64, _>("explicit")? != 0,
        compilation: row.try_get::<i64, _>("compilation")? != 0,
        art_url: row.try_get("art_url")?,
        lyrics: row.try_get("lyrics")?,
        subtitles: row.try_get("subtitles")?,
        bpm: row.try_get("bpm")?,
        musical_key: row.try_get("musical_key")?,
        musical_scale: row.try_get("musical_scale")?,
        replay_gain: row.try_get("replay_gain")?,
        peak: row.try_get("peak")?,
        version: row.try_get("version")?,
        description: row.try_get("description")?,
        url: row.try_get("url")?,
        audio_quality: row.try_get("audio_quality")?,
        audio_modes: json_array_or_empty(&row.try_get::<String, _>("audio_modes")?),
        release_date: row.try_get("release_date")?,
        barcode: row.try_get("barcode")?,
        catalog_number: row.try_get("catalog_number")?,
        release_type: row.try_get("release_type")?,
        release_id: row.try_get("release_id")?,
        external_recording_id: row.try_get("external_recording_id")?,
        tags: json_array_or_empty(&row.try_get::<String, _>("tags")?),
        status: status.parse::<TrackStatus>()?,
        error: row.try_get("error")?,
        parent_job_id: row.try_get("parent_job_id")?,
        file_path: row.try_get("file_path")?,
        extension: row.try_get("extension")?,
        content_hash: row.try_get("content_hash")?,
        last_verified_at: parse_dt_opt(row.try_get("last_verified_at")?)?,
        created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_dt(&row.try_get::<String, _>("updated_at")?)?,
        completed_at: parse_dt_opt(row.try_get("completed_at")?)?,
    })
}
