// SPDX-License-Identifier: GPL-3.0-or-later
//! The per-job state machine (spec §4.10 `runJob`): resolve, fan out or
//! download, tag, commit. `Worker` (in `lib.rs`) owns the dispatcher loop
//! that hands jobs here; everything in this module assumes it already
//! holds a semaphore slot for the duration of the call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cratedig_catalog::CatalogTrack;
use cratedig_domain::{Job, JobStatus, JobType, Track, TrackStatus};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collaborators::save_cover_if_missing;
use crate::error::{fatal, WorkerError};
use crate::template::{render_subdir, track_from_catalog};
use crate::Worker;

struct Resolved {
    tracks: Vec<CatalogTrack>,
    cover_url: Option<String>,
}

impl Worker {
    pub(crate) async fn run_job(&self, job: Job) {
        let cancel = self.cancel.child_token();
        let job_id = job.id.clone();

        let outcome =
            futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(self.run_job_inner(job, cancel)))
                .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(WorkerError::Cancelled)) => {
                debug!(target: "worker", %job_id, "job observed cancellation");
            }
            Ok(Err(WorkerError::AlreadyRecorded)) => {}
            Ok(Err(WorkerError::Fatal(message))) => {
                warn!(target: "worker", %job_id, %message, "job failed");
                let _ = self.db.update_job_error(&job_id, &message).await;
            }
            Err(panic) => {
                let message = panic_message(&panic);
                warn!(target: "worker", %job_id, %message, "job panicked");
                let _ = self
                    .db
                    .update_job_error(&job_id, &format!("Panic: {message}"))
                    .await;
            }
        }
    }

    async fn run_job_inner(&self, job: Job, cancel: CancellationToken) -> Result<(), WorkerError> {
        if self.observe_cancelled(&job.id).await? {
            return Err(WorkerError::Cancelled);
        }

        self.db
            .update_job_status(&job.id, JobStatus::Running, 0)
            .await
            .map_err(fatal)?;

        if job.job_type.is_sync() {
            return self.run_sync_job(&job, &cancel).await;
        }

        let resolved = self.resolve(&job, &cancel).await?;

        if self.observe_cancelled(&job.id).await? {
            return Err(WorkerError::Cancelled);
        }

        if job.job_type.is_container() {
            self.fan_out(&job, &resolved.tracks).await?;
            self.db
                .update_job_status(&job.id, JobStatus::Completed, 100)
                .await
                .map_err(fatal)?;
            return Ok(());
        }

        let track = resolved
            .tracks
            .first()
            .expect("resolve rejects empty track lists before returning");
        self.download_single_track(&job, track, resolved.cover_url.as_deref(), &cancel)
            .await
    }

    /// Re-reads the job from C5; `Ok(true)` means the caller must abort
    /// (spec §4.10: "before every externally-observable phase transition,
    /// re-read the job... abort if its status is cancelled").
    async fn observe_cancelled(&self, job_id: &str) -> Result<bool, WorkerError> {
        let job = self.db.get_job(job_id).await.map_err(fatal)?;
        Ok(matches!(job, Some(j) if j.status == JobStatus::Cancelled))
    }

    async fn resolve(&self, job: &Job, cancel: &CancellationToken) -> Result<Resolved, WorkerError> {
        let outcome: cratedig_catalog::Result<Resolved> = match job.job_type {
            JobType::Track => self
                .catalog
                .get_track(&job.source_id, cancel)
                .await
                .map(|t| Resolved {
                    cover_url: t.cover_urls.first().cloned(),
                    tracks: vec![t],
                }),
            JobType::Album => match self.catalog.get_album(&job.source_id, cancel).await {
                Ok(album) => {
                    let cover_url = album.cover_urls.first().cloned();
                    if let Some(url) = &cover_url {
                        let artist = album
                            .artists
                            .first()
                            .cloned()
                            .unwrap_or_else(|| "Unknown Artist".to_string());
                        let title = album.title.clone().unwrap_or_else(|| "Unknown Album".to_string());
                        let dir = self
                            .downloads_root
                            .join(cratedig_domain::fsutil::sanitize(&artist))
                            .join(cratedig_domain::fsutil::sanitize(&title));
                        if let Err(err) =
                            save_cover_if_missing(self.image_fetcher.as_ref(), url, &dir.join("cover.jpg")).await
                        {
                            warn!(target: "worker", %err, job_id = %job.id, "album cover download failed");
                        }
                    }
                    Ok(Resolved {
                        tracks: album.tracks,
                        cover_url,
                    })
                }
                Err(err) => Err(err),
            },
            JobType::Playlist => match self.catalog.get_playlist(&job.source_id, cancel).await {
                Ok(playlist) => {
                    let cover_url = playlist.cover_urls.first().cloned();
                    let title = playlist
                        .title
                        .clone()
                        .unwrap_or_else(|| job.source_id.clone());
                    if let Some(url) = &cover_url {
                        let dest = self
                            .downloads_root
                            .join("playlists")
                            .join(format!("{}.jpg", cratedig_domain::fsutil::sanitize(&title)));
                        if let Err(err) =
                            save_cover_if_missing(self.image_fetcher.as_ref(), url, &dest).await
                        {
                            warn!(target: "worker", %err, job_id = %job.id, "playlist cover download failed");
                        }
                    }
                    if let Err(err) = self.write_playlist(&title, &playlist.tracks).await {
                        warn!(target: "worker", %err, job_id = %job.id, "m3u generation failed");
                    }
                    Ok(Resolved {
                        tracks: playlist.tracks,
                        cover_url,
                    })
                }
                Err(err) => Err(err),
            },
            JobType::Artist => self
                .catalog
                .get_artist(&job.source_id, cancel)
                .await
                .map(|a| Resolved {
                    cover_url: a.cover_urls.first().cloned(),
                    tracks: a.top_tracks,
                }),
            JobType::SyncFile | JobType::SyncExternal | JobType::SyncCatalog => {
                unreachable!("sync job types never reach resolve")
            }
        };

        match outcome {
            Ok(resolved) if resolved.tracks.is_empty() => {
                let _ = self.db.update_job_error(&job.id, "No tracks found").await;
                Err(WorkerError::AlreadyRecorded)
            }
            Ok(resolved) => Ok(resolved),
            Err(err) => {
                let _ = self
                    .db
                    .update_job_error(&job.id, &format!("Resolution failed: {err}"))
                    .await;
                Err(WorkerError::AlreadyRecorded)
            }
        }
    }

    /// For each resolved track: skip if already completed or already
    /// actively queued/running as a `track` job, otherwise enqueue one
    /// (spec §4.10 "fan-out").
    async fn fan_out(&self, job: &Job, tracks: &[CatalogTrack]) -> Result<(), WorkerError> {
        for ct in tracks {
            match self.db.is_track_downloaded(&ct.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => return Err(fatal(err)),
            }

            let active = self
                .db
                .get_active_job_by_source_id(&ct.id, JobType::Track)
                .await
                .map_err(fatal)?;
            if active.is_some() {
                continue;
            }

            if let Err(err) = self.jobs.enqueue_job(&ct.id, JobType::Track).await {
                warn!(target: "worker", %err, upstream_id = %ct.id, job_id = %job.id, "fan-out enqueue failed");
            }
        }
        Ok(())
    }

    async fn write_playlist(&self, title: &str, tracks: &[CatalogTrack]) -> anyhow::Result<()> {
        let mut entries = Vec::with_capacity(tracks.len());
        for ct in tracks {
            let domain_track = track_from_catalog(ct);
            let rel = render_subdir(&self.subdir_template, &domain_track)?;

            let ext = match self.db.get_track_by_upstream_id(&ct.id).await {
                Ok(Some(existing)) if existing.extension.is_some() => existing.extension.unwrap(),
                _ => "flac".to_string(),
            };
            let abs_path = self.downloads_root.join(&rel).with_extension(&ext);
            let display_title = format!(
                "{} - {}",
                ct.artists.first().cloned().unwrap_or_default(),
                ct.title.clone().unwrap_or_default(),
            );
            entries.push((display_title, abs_path.to_string_lossy().into_owned()));
        }

        let m3u_path = self
            .downloads_root
            .join("playlists")
            .join(format!("{}.m3u", cratedig_domain::fsutil::sanitize(title)));
        self.playlist_writer.generate(&m3u_path, &entries).await
    }

    /// Spec §4.10 "single-track acquisition".
    async fn download_single_track(
        &self,
        job: &Job,
        ct: &CatalogTrack,
        cover_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), WorkerError> {
        if self.db.is_track_downloaded(&ct.id).await.map_err(fatal)? {
            self.db
                .update_job_status(&job.id, JobStatus::Completed, 100)
                .await
                .map_err(fatal)?;
            return Ok(());
        }

        let mut track = match self.db.get_track_by_upstream_id(&ct.id).await.map_err(fatal)? {
            Some(existing) => existing,
            None => track_from_catalog(ct),
        };
        if cover_url.is_some() && track.art_url.is_none() {
            track.art_url = cover_url.map(str::to_string);
        }
        track.status = TrackStatus::Downloading;
        track.parent_job_id = Some(job.id.clone());

        let rel = render_subdir(&self.subdir_template, &track)
            .map_err(|e| WorkerError::Fatal(format!("template render failed: {e}")))?;
        let dest_without_ext = self.downloads_root.join(&rel);
        let dest_dir = dest_without_ext
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.downloads_root.clone());
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| WorkerError::Fatal(format!("mkdir failed: {e}")))?;

        let track_id = if track.id == 0 {
            self.db.create_track(&track).await.map_err(fatal)?
        } else {
            self.db
                .update_track_partial(
                    track.id,
                    &[
                        ("status", json!("downloading")),
                        ("parent_job_id", json!(job.id)),
                    ],
                )
                .await
                .map_err(fatal)?;
            track.id
        };
        track.id = track_id;

        if self.observe_cancelled(&job.id).await? {
            return Err(WorkerError::Cancelled);
        }

        let staged = match self
            .download_with_progress(job, &track.upstream_id, &dest_without_ext, cancel)
            .await
        {
            Ok(path) => path,
            Err(_) if cancel.is_cancelled() => {
                return Err(WorkerError::Cancelled);
            }
            Err(err) => {
                let _ = self.db.mark_track_failed(track_id, &err.to_string()).await;
                let _ = self.db.update_job_error(&job.id, &err.to_string()).await;
                return Err(WorkerError::AlreadyRecorded);
            }
        };

        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(WorkerError::Cancelled);
        }

        let ext = staged
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("flac")
            .to_string();
        let final_path = dest_without_ext.with_extension(&ext);

        if let Err(err) = finalize_move(&staged, &final_path).await {
            let _ = self.db.mark_track_failed(track_id, &err.to_string()).await;
            return Err(WorkerError::Fatal(format!("finalise move failed: {err}")));
        }

        let hash = compute_hash(&final_path)
            .await
            .map_err(|e| WorkerError::Fatal(format!("hashing failed: {e}")))?;

        track.extension = Some(ext);
        track.file_path = Some(final_path.to_string_lossy().into_owned());

        cratedig_enrich::fetch_lyrics(&self.catalog, &mut track, cancel).await;
        if let Some(url) = track.art_url.clone() {
            if let Err(err) =
                save_cover_if_missing(self.image_fetcher.as_ref(), &url, &dest_dir.join("cover.jpg")).await
            {
                debug!(target: "worker", %err, job_id = %job.id, "cover art download failed");
            }
        }

        self.persist_track_metadata(&track).await.map_err(fatal)?;

        let cover_bytes = tokio::fs::read(dest_dir.join("cover.jpg")).await.ok();
        if let Err(err) = self.tagger.tag_file(&final_path, &track, cover_bytes.as_deref()) {
            warn!(target: "worker", %err, job_id = %job.id, "tagging failed (non-fatal)");
        }

        self.db
            .mark_track_completed(track_id, &track.file_path.clone().unwrap(), &hash)
            .await
            .map_err(fatal)?;
        self.db
            .update_job_status(&job.id, JobStatus::Completed, 100)
            .await
            .map_err(fatal)?;
        Ok(())
    }

    /// `sync_file`/`sync_external`/`sync_catalog` (spec §4.10 "Sync jobs").
    async fn run_sync_job(&self, job: &Job, cancel: &CancellationToken) -> Result<(), WorkerError> {
        let mut track = match self
            .db
            .get_track_by_upstream_id(&job.source_id)
            .await
            .map_err(fatal)?
        {
            Some(t) if t.status == TrackStatus::Completed => t,
            _ => {
                let _ = self
                    .db
                    .update_job_error(&job.id, "track not found or not completed")
                    .await;
                return Err(WorkerError::AlreadyRecorded);
            }
        };

        if job.job_type == JobType::SyncExternal {
            if let Err(err) = cratedig_enrich::enrich_track(&self.metadata, &mut track, cancel).await {
                let _ = self.db.update_job_error(&job.id, &err.to_string()).await;
                return Err(WorkerError::AlreadyRecorded);
            }
        } else if job.job_type == JobType::SyncCatalog {
            cratedig_enrich::enrich_complete(&self.catalog, &self.metadata, &mut track, cancel).await;
        }

        if job.job_type != JobType::SyncFile {
            self.persist_track_metadata(&track).await.map_err(fatal)?;
        }

        let Some(path) = track.file_path.clone() else {
            let _ = self
                .db
                .update_job_error(&job.id, "completed track missing file_path")
                .await;
            return Err(WorkerError::AlreadyRecorded);
        };

        let cover_bytes = Path::new(&path)
            .parent()
            .map(|dir| dir.join("cover.jpg"))
            .and_then(|p| std::fs::read(p).ok());
        if let Err(err) = self
            .tagger
            .tag_file(Path::new(&path), &track, cover_bytes.as_deref())
        {
            warn!(target: "worker", %err, job_id = %job.id, "re-tag failed (non-fatal)");
        }

        self.db
            .update_job_status(&job.id, JobStatus::Completed, 100)
            .await
            .map_err(fatal)?;
        Ok(())
    }

    /// Writes every enrichable/editable column back (everything
    /// `UpdateTrackPartial` allows except the job-owned operational
    /// columns: `status`, `error`, `parent_job_id`, `file_path`,
    /// `extension`, `content_hash`, which the download/commit path already
    /// manages directly).
    async fn persist_track_metadata(&self, track: &Track) -> anyhow::Result<()> {
        let columns: Vec<(&str, serde_json::Value)> = vec![
            ("title", json!(track.title)),
            ("artists", json!(track.artists)),
            ("artist_ids", json!(track.artist_ids)),
            ("albums", json!(track.albums)),
            ("album_artists", json!(track.album_artists)),
            ("album_artist_ids", json!(track.album_artist_ids)),
            ("album_id", json!(track.album_id)),
            ("disc_number", json!(track.disc_number)),
            ("track_number", json!(track.track_number)),
            ("total_discs", json!(track.total_discs)),
            ("total_tracks", json!(track.total_tracks)),
            ("year", json!(track.year)),
            ("genre", json!(track.genre)),
            ("label", json!(track.label)),
            ("isrc", json!(track.isrc)),
            ("copyright", json!(track.copyright)),
            ("composer", json!(track.composer)),
            ("duration_seconds", json!(track.duration_seconds)),
            ("art_url", json!(track.art_url)),
            ("lyrics", json!(track.lyrics)),
            ("subtitles", json!(track.subtitles)),
            ("audio_quality", json!(track.audio_quality)),
            ("audio_modes", json!(track.audio_modes)),
            ("release_date", json!(track.release_date)),
            ("barcode", json!(track.barcode)),
            ("catalog_number", json!(track.catalog_number)),
            ("release_type", json!(track.release_type)),
        ];
        self.db.update_track_partial(track.id, &columns).await
    }

    /// Wraps `C9.Download` with the progress writer (spec §4.10 step 4 and
    /// "Progress reporting"): a background task polls the job's
    /// cancellation state at least every 2 s, touching `updated_at` while
    /// the job is still alive and cancelling the download's token the
    /// moment the job row flips to `cancelled`.
    async fn download_with_progress(
        &self,
        job: &Job,
        upstream_id: &str,
        dest_without_ext: &Path,
        cancel: &CancellationToken,
    ) -> cratedig_downloader::Result<PathBuf> {
        let db = self.db.clone();
        let job_id = job.id.clone();
        let watch_cancel = cancel.clone();

        let watcher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(2));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match db.get_job(&job_id).await {
                    Ok(Some(j)) if j.status == JobStatus::Cancelled => {
                        watch_cancel.cancel();
                        break;
                    }
                    Ok(Some(_)) => {
                        let _ = db.touch_job(&job_id).await;
                    }
                    _ => break,
                }
            }
        });

        let result = self
            .downloader
            .download(cancel, upstream_id, dest_without_ext)
            .await;
        watcher.abort();
        result
    }
}

/// Moves the staged file into place, falling back to copy+delete when a
/// plain rename fails (e.g. staging and the library live on different
/// filesystems) (spec §4.10 step 5).
async fn finalize_move(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(src, dst).await?;
    tokio::fs::remove_file(src).await?;
    Ok(())
}

async fn compute_hash(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
