// SPDX-License-Identifier: GPL-3.0-or-later
//! Track persistence operations (spec §4.5, C5).

use anyhow::{anyhow, Result};
use chrono::Utc;
use cratedig_domain::{Track, TrackStatus};
use serde_json::Value;
use sqlx::Row;
use tracing::debug;

use crate::model::{row_to_track, to_json_array};
use crate::Db;

/// Aggregate completion state of an album's tracks, returned by
/// `recompute_album_state` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumState {
    Missing,
    Partial,
    Completed,
}

impl std::fmt::Display for AlbumState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlbumState::Missing => "missing",
            AlbumState::Partial => "partial",
            AlbumState::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Columns `UpdateTrackPartial` is allowed to touch. Anything outside this
/// whitelist is rejected rather than silently ignored, so a typo in a
/// caller never writes to — or reads from — a non-existent column.
const PARTIAL_UPDATE_COLUMNS: &[&str] = &[
    "title", "artists", "artist_ids", "albums", "album_artists", "album_artist_ids", "album_id",
    "disc_number", "track_number", "total_discs", "total_tracks", "year", "genre", "label",
    "isrc", "copyright", "composer", "duration_seconds", "explicit", "compilation", "art_url",
    "lyrics", "subtitles", "bpm", "musical_key", "musical_scale", "replay_gain", "peak",
    "version", "description", "url", "audio_quality", "audio_modes", "release_date", "barcode",
    "catalog_number", "release_type", "release_id", "external_recording_id", "tags", "status",
    "error", "parent_job_id", "file_path", "extension", "content_hash",
];

const MULTI_VALUED_COLUMNS: &[&str] = &[
    "artists",
    "artist_ids",
    "albums",
    "album_artists",
    "album_artist_ids",
    "audio_modes",
    "tags",
];

impl Db {
    pub async fn create_track(&self, track: &Track) -> Result<i64> {
        debug!(target: "db", upstream_id = %track.upstream_id, "creating track");
        let result = sqlx::query(
            r#"INSERT INTO tracks (
                upstream_id, title, artists, artist_ids, albums, album_artists, album_artist_ids,
                album_id, disc_number, track_number, total_discs, total_tracks, year, genre,
                label, isrc, copyright, composer, duration_seconds, explicit, compilation,
                art_url, lyrics, subtitles, bpm, musical_key, musical_scale, replay_gain, peak,
                version, description, url, audio_quality, audio_modes, release_date, barcode,
                catalog_number, release_type, release_id, external_recording_id, tags,
                status, error, parent_job_id, file_path, extension, content_hash,
                last_verified_at, created_at, updated_at, completed_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )"#,
        )
        .bind(&track.upstream_id)
        .bind(&track.title)
        .bind(to_json_array(&track.artists))
        .bind(to_json_array(&track.artist_ids))
        .bind(to_json_array(&track.albums))
        .bind(to_json_array(&track.album_artists))
        .bind(to_json_array(&track.album_artist_ids))
        .bind(&track.album_id)
        .bind(track.disc_number)
        .bind(track.track_number)
        .bind(track.total_discs)
        .bind(track.total_tracks)
        .bind(track.year)
        .bind(&track.genre)
        .bind(&track.label)
        .bind(&track.isrc)
        .bind(&track.copyright)
        .bind(&track.composer)
        .bind(track.duration_seconds)
        .bind(track.explicit)
        .bind(track.compilation)
        .bind(&track.art_url)
        .bind(&track.lyrics)
        .bind(&track.subtitles)
        .bind(track.bpm)
        .bind(&track.musical_key)
        .bind(&track.musical_scale)
        .bind(track.replay_gain)
        .bind(track.peak)
        .bind(&track.version)
        .bind(&track.description)
        .bind(&track.url)
        .bind(&track.audio_quality)
        .bind(to_json_array(&track.audio_modes))
        .bind(&track.release_date)
        .bind(&track.barcode)
        .bind(&track.catalog_number)
        .bind(&track.release_type)
        .bind(&track.release_id)
        .bind(&track.external_recording_id)
        .bind(to_json_array(&track.tags))
        .bind(track.status.to_string())
        .bind(&track.error)
        .bind(&track.parent_job_id)
        .bind(&track.file_path)
        .bind(&track.extension)
        .bind(&track.content_hash)
        .bind(track.last_verified_at.map(|t| t.to_rfc3339()))
        .bind(track.created_at.to_rfc3339())
        .bind(track.updated_at.to_rfc3339())
        .bind(track.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_track(&self, id: i64) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_track(&r)).transpose()
    }

    pub async fn get_track_by_upstream_id(&self, upstream_id: &str) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT * FROM tracks WHERE upstream_id = ?")
            .bind(upstream_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_track(&r)).transpose()
    }

    pub async fn is_track_downloaded(&self, upstream_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM tracks WHERE upstream_id = ? AND status = 'completed' LIMIT 1",
        )
        .bind(upstream_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn get_downloaded_track(&self, upstream_id: &str) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT * FROM tracks WHERE upstream_id = ? AND status = 'completed'")
            .bind(upstream_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_track(&r)).transpose()
    }

    /// Whitelisted partial update. Rejects any column not in
    /// `PARTIAL_UPDATE_COLUMNS` instead of silently ignoring it.
    pub async fn update_track_partial(&self, id: i64, columns: &[(&str, Value)]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        for (col, _) in columns {
            if !PARTIAL_UPDATE_COLUMNS.contains(col) {
                return Err(anyhow!("column not updatable: {col}"));
            }
        }

        let mut sql = String::from("UPDATE tracks SET ");
        for (i, (col, _)) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(col);
            sql.push_str(" = ?");
        }
        sql.push_str(", updated_at = ? WHERE id = ?");

        let mut query = sqlx::query(&sql);
        for (col, value) in columns {
            query = bind_value(query, col, value);
        }
        query = query.bind(Utc::now().to_rfc3339()).bind(id);

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("track not found: {id}"));
        }
        Ok(())
    }

    pub async fn mark_track_completed(&self, id: i64, path: &str, hash: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE tracks SET status = 'completed', file_path = ?, content_hash = ?, \
             last_verified_at = ?, completed_at = ?, updated_at = ?, error = NULL WHERE id = ?",
        )
        .bind(path)
        .bind(hash)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_track_failed(&self, id: i64, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tracks SET status = 'failed', error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_track(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("track not found: {id}"));
        }
        Ok(())
    }

    pub async fn list_tracks(&self, page: i64, size: i64) -> Result<Vec<Track>> {
        let rows = sqlx::query("SELECT * FROM tracks ORDER BY created_at DESC LIMIT ? OFFSET ?")
            .bind(size)
            .bind(page.max(0) * size)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_track).collect()
    }

    pub async fn list_tracks_by_status(
        &self,
        status: TrackStatus,
        page: i64,
        size: i64,
    ) -> Result<Vec<Track>> {
        let rows = sqlx::query(
            "SELECT * FROM tracks WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(status.to_string())
        .bind(size)
        .bind(page.max(0) * size)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_track).collect()
    }

    pub async fn list_tracks_by_parent_job(&self, job_id: &str) -> Result<Vec<Track>> {
        let rows = sqlx::query("SELECT * FROM tracks WHERE parent_job_id = ? ORDER BY id ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_track).collect()
    }

    pub async fn list_tracks_with_isrc(&self, page: i64, size: i64) -> Result<Vec<Track>> {
        let rows = sqlx::query(
            "SELECT * FROM tracks WHERE isrc IS NOT NULL AND isrc != '' \
             ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(page.max(0) * size)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_track).collect()
    }

    pub async fn list_tracks_without_genre(&self, page: i64, size: i64) -> Result<Vec<Track>> {
        let rows = sqlx::query(
            "SELECT * FROM tracks WHERE genre IS NULL OR genre = '' \
             ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(page.max(0) * size)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_track).collect()
    }

    pub async fn list_completed_tracks(&self, page: i64, size: i64) -> Result<Vec<Track>> {
        self.list_tracks_by_status(TrackStatus::Completed, page, size)
            .await
    }

    pub async fn search_tracks(&self, query: &str, page: i64, size: i64) -> Result<Vec<Track>> {
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query(
            "SELECT * FROM tracks WHERE status = 'completed' AND ( \
                title LIKE ? ESCAPE '\\' OR artists LIKE ? ESCAPE '\\' OR albums LIKE ? ESCAPE '\\' \
             ) ORDER BY title ASC LIMIT ? OFFSET ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(size)
        .bind(page.max(0) * size)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_track).collect()
    }

    /// `missing` if no track of the album has been seen, `completed` if
    /// every known track is completed, else `partial`.
    pub async fn recompute_album_state(&self, album_id: &str) -> Result<AlbumState> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed \
             FROM tracks WHERE album_id = ?",
        )
        .bind(album_id)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let completed: i64 = row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0);

        Ok(if total == 0 {
            AlbumState::Missing
        } else if completed == total {
            AlbumState::Completed
        } else {
            AlbumState::Partial
        })
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    column: &str,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if MULTI_VALUED_COLUMNS.contains(&column) {
        let arr: Vec<String> = match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::Null => Vec::new(),
            other => vec![other.to_string()],
        };
        return query.bind(to_json_array(&arr));
    }

    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::String(s) => query.bind(s.clone()),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        other => query.bind(other.to_string()),
    }
}
