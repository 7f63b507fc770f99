// SPDX-License-Identifier: GPL-3.0-or-later
//! Downloads service (C7): read/search/filter views over completed tracks,
//! deletion with orphan-folder cleanup, and the sync-job shortcuts that
//! delegate back into the job service (spec §4.7).

use std::path::{Path, PathBuf};

use cratedig_db::Db;
use cratedig_domain::{fsutil, Job, JobType, Track};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::jobs::{JobService, JobsError};

#[derive(Debug, Error)]
pub enum DownloadsError {
    #[error("track not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Jobs(#[from] JobsError),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DownloadsError>;

/// The pre-existing list variants C5 exposes beyond plain pagination (spec
/// §4.5); `FilterDownloads` is the HTTP-facing name for picking among them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFilter {
    All,
    WithoutGenre,
    WithIsrc,
}

#[derive(Clone)]
pub struct DownloadsService {
    db: Db,
    jobs: JobService,
    downloads_root: PathBuf,
}

impl DownloadsService {
    pub fn new(db: Db, jobs: JobService, downloads_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            jobs,
            downloads_root: downloads_root.into(),
        }
    }

    pub async fn list_downloads(&self, page: i64, size: i64) -> Result<Vec<Track>> {
        Ok(self.db.list_completed_tracks(page, size).await?)
    }

    pub async fn search_downloads(&self, query: &str, page: i64, size: i64) -> Result<Vec<Track>> {
        Ok(self.db.search_tracks(query, page, size).await?)
    }

    pub async fn filter_downloads(
        &self,
        filter: DownloadFilter,
        page: i64,
        size: i64,
    ) -> Result<Vec<Track>> {
        Ok(match filter {
            DownloadFilter::All => self.db.list_completed_tracks(page, size).await?,
            DownloadFilter::WithoutGenre => self.db.list_tracks_without_genre(page, size).await?,
            DownloadFilter::WithIsrc => self.db.list_tracks_with_isrc(page, size).await?,
        })
    }

    pub async fn get_track_by_id(&self, id: i64) -> Result<Track> {
        self.db
            .get_track(id)
            .await?
            .ok_or_else(|| DownloadsError::NotFound(id.to_string()))
    }

    pub async fn get_download_by_provider_id(&self, provider_id: &str) -> Result<Track> {
        self.db
            .get_track_by_upstream_id(provider_id)
            .await?
            .ok_or_else(|| DownloadsError::NotFound(provider_id.to_string()))
    }

    pub async fn update_track_partial(&self, id: i64, columns: &[(&str, Value)]) -> Result<()> {
        Ok(self.db.update_track_partial(id, columns).await?)
    }

    /// Removes the audio file, then walks empty ancestor directories upward,
    /// stopping at (never removing) `downloads_root`, then removes the row.
    /// A missing file is tolerated — the row is still removed.
    pub async fn delete_download(&self, provider_id: &str) -> Result<()> {
        let track = self
            .db
            .get_track_by_upstream_id(provider_id)
            .await?
            .ok_or_else(|| DownloadsError::NotFound(provider_id.to_string()))?;

        if let Some(path) = &track.file_path {
            let path = Path::new(path);
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    if let Some(parent) = path.parent() {
                        let root = self.downloads_root.clone();
                        let parent = parent.to_path_buf();
                        let _ = tokio::task::spawn_blocking(move || {
                            fsutil::delete_folder_if_empty(&parent, &root)
                        })
                        .await;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.db.delete_track(track.id).await?;
        info!(target: "downloads", provider_id, track_id = track.id, "deleted download");
        Ok(())
    }

    pub async fn enqueue_sync_file_job(&self, provider_id: &str) -> Result<Job> {
        Ok(self.jobs.enqueue_job(provider_id, JobType::SyncFile).await?)
    }

    pub async fn enqueue_sync_metadata_job(&self, provider_id: &str) -> Result<Job> {
        Ok(self
            .jobs
            .enqueue_job(provider_id, JobType::SyncExternal)
            .await?)
    }

    pub async fn enqueue_sync_hifi_job(&self, provider_id: &str) -> Result<Job> {
        Ok(self
            .jobs
            .enqueue_job(provider_id, JobType::SyncCatalog)
            .await?)
    }

    /// Enqueues a `sync_catalog` job for every completed track lacking an
    /// active one already. Returns the count actually enqueued, not the
    /// count of completed tracks — a track with one in flight is skipped.
    pub async fn enqueue_sync_jobs(&self) -> Result<u64> {
        let mut enqueued = 0u64;
        let mut page = 0i64;
        const PAGE_SIZE: i64 = 200;

        loop {
            let tracks = self.db.list_completed_tracks(page, PAGE_SIZE).await?;
            if tracks.is_empty() {
                break;
            }
            for track in &tracks {
                let active = self
                    .db
                    .get_active_job_by_source_id(&track.upstream_id, JobType::SyncCatalog)
                    .await?;
                if active.is_none() {
                    self.jobs
                        .enqueue_job(&track.upstream_id, JobType::SyncCatalog)
                        .await?;
                    enqueued += 1;
                }
            }
            if (tracks.len() as i64) < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        info!(target: "downloads", enqueued, "enqueued sync_catalog jobs");
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_domain::TrackStatus;

    async fn services() -> (DownloadsService, Db) {
        let db = Db::open("sqlite::memory:").await.unwrap();
        let jobs = JobService::new(db.clone());
        (
            DownloadsService::new(db.clone(), jobs, "/downloads"),
            db,
        )
    }

    #[tokio::test]
    async fn delete_download_removes_row_even_without_a_file() {
        let (svc, db) = services().await;
        let mut track = Track::new("up-1".to_string());
        track.status = TrackStatus::Completed;
        let id = db.create_track(&track).await.unwrap();

        svc.delete_download("up-1").await.unwrap();
        assert!(db.get_track(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_download_ascends_empty_directories_but_stops_at_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let nested = root.join("Artist").join("Album");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        let file_path = nested.join("01 Track.flac");
        tokio::fs::write(&file_path, b"x").await.unwrap();

        let db = Db::open("sqlite::memory:").await.unwrap();
        let jobs = JobService::new(db.clone());
        let svc = DownloadsService::new(db.clone(), jobs, root.clone());

        let mut track = Track::new("up-2".to_string());
        track.status = TrackStatus::Completed;
        track.file_path = Some(file_path.to_string_lossy().to_string());
        db.create_track(&track).await.unwrap();

        svc.delete_download("up-2").await.unwrap();

        assert!(!file_path.exists());
        assert!(!root.join("Artist").exists());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn delete_download_missing_provider_id_errors() {
        let (svc, _db) = services().await;
        let err = svc.delete_download("nope").await.unwrap_err();
        assert!(matches!(err, DownloadsError::NotFound(_)));
    }

    #[tokio::test]
    async fn enqueue_sync_jobs_skips_tracks_with_an_active_sync_already() {
        let (svc, db) = services().await;
        let mut t1 = Track::new("up-a".to_string());
        t1.status = TrackStatus::Completed;
        db.create_track(&t1).await.unwrap();
        let mut t2 = Track::new("up-b".to_string());
        t2.status = TrackStatus::Completed;
        db.create_track(&t2).await.unwrap();

        svc.enqueue_sync_hifi_job("up-b").await.unwrap();

        let count = svc.enqueue_sync_jobs().await.unwrap();
        assert_eq!(count, 1);
    }
}
