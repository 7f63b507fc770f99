// SPDX-License-Identifier: GPL-3.0-or-later
//! Shared data model for the acquisition pipeline: jobs, tracks, cache
//! entries, settings, and schema migrations. Every other crate in the
//! workspace borrows these types rather than redefining them.

pub mod fsutil;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    #[error("unknown job status: {0}")]
    UnknownJobStatus(String),
    #[error("unknown track status: {0}")]
    UnknownTrackStatus(String),
}

// ============================================================================
// Job
// ============================================================================

/// What a job resolves: a single track, a container (album/playlist/artist)
/// that fans out into per-track jobs, or a sync variant that only re-enriches
/// and re-tags an already-downloaded track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Track,
    Album,
    Playlist,
    Artist,
    SyncFile,
    SyncExternal,
    SyncCatalog,
}

impl JobType {
    /// Container jobs fan out into child track jobs instead of downloading.
    pub fn is_container(self) -> bool {
        matches!(self, JobType::Album | JobType::Playlist | JobType::Artist)
    }

    pub fn is_sync(self) -> bool {
        matches!(
            self,
            JobType::SyncFile | JobType::SyncExternal | JobType::SyncCatalog
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobType::Track => "track",
            JobType::Album => "album",
            JobType::Playlist => "playlist",
            JobType::Artist => "artist",
            JobType::SyncFile => "sync_file",
            JobType::SyncExternal => "sync_external",
            JobType::SyncCatalog => "sync_catalog",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "track" => JobType::Track,
            "album" => JobType::Album,
            "playlist" => JobType::Playlist,
            "artist" => JobType::Artist,
            "sync_file" => JobType::SyncFile,
            "sync_external" => JobType::SyncExternal,
            "sync_catalog" => JobType::SyncCatalog,
            other => return Err(DomainError::UnknownJobType(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            other => return Err(DomainError::UnknownJobStatus(other.to_string())),
        })
    }
}

/// A unit of scheduling: resolve one upstream id into tracks, then fan out
/// or download. See spec §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub source_id: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh queued job for `(source_id, job_type)`, with a globally unique id.
    pub fn new(source_id: impl Into<String>, job_type: JobType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Queued,
            progress: 0,
            source_id: source_id.into(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Track
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Missing,
    Queued,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackStatus::Missing => "missing",
            TrackStatus::Queued => "queued",
            TrackStatus::Downloading => "downloading",
            TrackStatus::Processing => "processing",
            TrackStatus::Completed => "completed",
            TrackStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "missing" => TrackStatus::Missing,
            "queued" => TrackStatus::Queued,
            "downloading" => TrackStatus::Downloading,
            "processing" => TrackStatus::Processing,
            "completed" => TrackStatus::Completed,
            "failed" => TrackStatus::Failed,
            other => return Err(DomainError::UnknownTrackStatus(other.to_string())),
        })
    }
}

/// Durable record of a single audio item, independent of any job. See spec §3.
///
/// Multi-valued fields (`artists`, `album_artists`, `artist_ids`,
/// `album_artist_ids`, `tags`) serialise to JSON arrays on write and always
/// restore as an (possibly empty, never null) `Vec` on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub upstream_id: String,

    pub title: Option<String>,
    pub artists: Vec<String>,
    pub artist_ids: Vec<String>,
    pub albums: Vec<String>,
    pub album_artists: Vec<String>,
    pub album_artist_ids: Vec<String>,
    pub album_id: Option<String>,

    pub disc_number: Option<i64>,
    pub track_number: Option<i64>,
    pub total_discs: Option<i64>,
    pub total_tracks: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub label: Option<String>,
    pub isrc: Option<String>,
    pub copyright: Option<String>,
    pub composer: Option<String>,
    pub duration_seconds: Option<f64>,
    pub explicit: bool,
    pub compilation: bool,
    pub art_url: Option<String>,
    pub lyrics: Option<String>,
    pub subtitles: Option<String>,
    pub bpm: Option<f64>,
    pub musical_key: Option<String>,
    pub musical_scale: Option<String>,
    pub replay_gain: Option<f64>,
    pub peak: Option<f64>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub audio_quality: Option<String>,
    pub audio_modes: Vec<String>,
    pub release_date: Option<String>,
    pub barcode: Option<String>,
    pub catalog_number: Option<String>,
    pub release_type: Option<String>,
    pub release_id: Option<String>,
    pub external_recording_id: Option<String>,
    pub tags: Vec<String>,

    pub status: TrackStatus,
    pub error: Option<String>,
    pub parent_job_id: Option<String>,
    pub file_path: Option<String>,
    pub extension: Option<String>,
    pub content_hash: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Track {
    pub fn new(upstream_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            upstream_id: upstream_id.into(),
            status: TrackStatus::Missing,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Invariant: a completed track must carry a non-empty file path.
    pub fn is_validly_completed(&self) -> bool {
        self.status != TrackStatus::Completed
            || (self.file_path.as_deref().is_some_and(|p| !p.is_empty())
                && self.completed_at.is_some())
    }

    pub fn needs_catalog_enrichment(&self) -> bool {
        self.title.is_none()
            || self.artists.is_empty()
            || self.albums.is_empty()
            || self.duration_seconds.is_none()
            || self.art_url.is_none()
    }

    pub fn needs_external_enrichment(&self) -> bool {
        (self.isrc.is_some() || self.external_recording_id.is_some())
            && (self.label.is_none()
                || self.release_date.is_none()
                || self.barcode.is_none()
                || self.catalog_number.is_none()
                || self.release_type.is_none())
    }
}

// ============================================================================
// Cache entry / settings / migrations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMigration {
    pub version: i64,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

/// `parseYear("YYYY-MM-DD") == parseYear("YYYY") == YYYY`; malformed or
/// shorter-than-4-chars input returns 0. See spec §8.
pub fn parse_year(input: &str) -> i64 {
    if input.len() < 4 {
        return 0;
    }
    input[..4].parse::<i64>().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips_through_display_and_from_str() {
        for jt in [
            JobType::Track,
            JobType::Album,
            JobType::Playlist,
            JobType::Artist,
            JobType::SyncFile,
            JobType::SyncExternal,
            JobType::SyncCatalog,
        ] {
            let s = jt.to_string();
            assert_eq!(s.parse::<JobType>().unwrap(), jt);
        }
    }

    #[test]
    fn container_and_sync_classification() {
        assert!(JobType::Album.is_container());
        assert!(JobType::Playlist.is_container());
        assert!(JobType::Artist.is_container());
        assert!(!JobType::Track.is_container());
        assert!(JobType::SyncFile.is_sync());
        assert!(!JobType::Track.is_sync());
    }

    #[test]
    fn job_status_active_and_terminal() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn parse_year_handles_full_date_year_only_and_malformed() {
        assert_eq!(parse_year("2017-05-12"), 2017);
        assert_eq!(parse_year("2017"), 2017);
        assert_eq!(parse_year("abc"), 0);
        assert_eq!(parse_year("19"), 0);
        assert_eq!(parse_year(""), 0);
    }

    #[test]
    fn completed_track_requires_path_and_timestamp() {
        let mut t = Track::new("abc123");
        assert!(t.is_validly_completed());
        t.status = TrackStatus::Completed;
        assert!(!t.is_validly_completed());
        t.file_path = Some("/music/a/b.flac".to_string());
        t.completed_at = Some(Utc::now());
        assert!(t.is_validly_completed());
    }

    #[test]
    fn new_track_has_empty_not_null_multivalued_fields() {
        let t = Track::new("x");
        assert!(t.artists.is_empty());
        assert!(t.tags.is_empty());
    }
}
