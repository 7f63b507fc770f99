// SPDX-License-Identifier: GPL-3.0-or-later
//! C10, the scheduler (spec §4.10) — the hardest part of the pipeline.
//! `Worker` owns a single dispatcher task that polls C5 on a ticker and
//! spawns one task per accepted job, bounded by a semaphore of capacity
//! `maxConcurrent`. Each job task runs the full resolve/fan-out-or-download
//! /tag/commit state machine in `job_runner`.

mod collaborators;
mod error;
mod job_runner;
mod template;

pub use collaborators::{HttpImageFetcher, ImageFetcher, M3uPlaylistWriter, NullTagger, PlaylistWriter, Tagger};
pub use error::WorkerError;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cratedig_catalog::CachedCatalogClient;
use cratedig_config::AppConfig;
use cratedig_db::Db;
use cratedig_domain::Job;
use cratedig_downloader::Downloader;
use cratedig_jobs::JobService;
use cratedig_metadata::MetadataClient;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The scheduler's dependencies and runtime state (spec §4.10, §5). Cloning
/// a `Worker` is cheap — every field is an `Arc`/handle shared with the
/// dispatcher and job tasks.
#[derive(Clone)]
pub struct Worker {
    db: Db,
    catalog: CachedCatalogClient,
    metadata: MetadataClient,
    jobs: JobService,
    downloader: Downloader,
    tagger: Arc<dyn Tagger>,
    image_fetcher: Arc<dyn ImageFetcher>,
    playlist_writer: Arc<dyn PlaylistWriter>,
    downloads_root: PathBuf,
    subdir_template: String,
    max_concurrent: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    inner: Arc<Inner>,
}

struct Inner {
    semaphore: Semaphore,
    tracker: tokio_util::task::TaskTracker,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AppConfig,
        db: Db,
        catalog: CachedCatalogClient,
        metadata: MetadataClient,
        jobs: JobService,
        downloader: Downloader,
    ) -> Self {
        Self::with_collaborators(
            config,
            db,
            catalog,
            metadata,
            jobs,
            downloader,
            Arc::new(NullTagger),
            Arc::new(HttpImageFetcher::new()),
            Arc::new(M3uPlaylistWriter),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_collaborators(
        config: &AppConfig,
        db: Db,
        catalog: CachedCatalogClient,
        metadata: MetadataClient,
        jobs: JobService,
        downloader: Downloader,
        tagger: Arc<dyn Tagger>,
        image_fetcher: Arc<dyn ImageFetcher>,
        playlist_writer: Arc<dyn PlaylistWriter>,
    ) -> Self {
        let max_concurrent = config.worker.max_concurrent.max(1);
        Self {
            db,
            catalog,
            metadata,
            jobs,
            downloader,
            tagger,
            image_fetcher,
            playlist_writer,
            downloads_root: PathBuf::from(&config.storage.downloads_dir),
            subdir_template: config.storage.subdir_template.clone(),
            max_concurrent,
            poll_interval: Duration::from_secs(config.worker.poll_interval_secs.max(1)),
            cancel: CancellationToken::new(),
            inner: Arc::new(Inner {
                semaphore: Semaphore::new(max_concurrent),
                tracker: tokio_util::task::TaskTracker::new(),
            }),
        }
    }

    /// Repatriates any `running` job left behind by a prior process death
    /// back to `queued`, then spawns the dispatcher. Must run before the
    /// HTTP listener starts accepting requests (spec §5).
    pub async fn start(&self) -> anyhow::Result<JoinHandle<()>> {
        let reset = self.db.reset_stuck_jobs().await?;
        if reset > 0 {
            info!(target: "worker", count = reset, "repatriated stuck running jobs");
        }

        let worker = self.clone();
        let cancel = self.cancel.clone();
        info!(target: "worker", max_concurrent = self.max_concurrent, poll_interval = ?self.poll_interval, "starting dispatcher");
        Ok(tokio::spawn(async move {
            worker.dispatch_loop(cancel).await;
        }))
    }

    /// Cancels the dispatcher and waits for every in-flight job task to
    /// finish (spec §4.10 "Stop"; §5 "worker shutdown MUST precede
    /// database close").
    pub async fn stop(&self) {
        info!(target: "worker", "stopping dispatcher");
        self.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    async fn dispatch_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(target: "worker", "dispatcher cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.tick().await {
                tracing::warn!(target: "worker", %err, "dispatcher tick failed");
            }
        }
    }

    /// One dispatcher tick (spec §4.10 "Dispatcher loop"): list active
    /// jobs, compute the available budget, and hand up to `budget` queued
    /// jobs a semaphore slot and a spawned task each.
    async fn tick(&self) -> anyhow::Result<()> {
        let active_jobs = self.db.list_all_active_jobs().await?;

        let running = active_jobs
            .iter()
            .filter(|j| j.status == cratedig_domain::JobStatus::Running)
            .count();
        let mut queued: Vec<Job> = active_jobs
            .into_iter()
            .filter(|j| j.status == cratedig_domain::JobStatus::Queued)
            .collect();
        queued.sort_by_key(|j| j.created_at);

        let budget = self.max_concurrent.saturating_sub(running);
        if budget == 0 || queued.is_empty() {
            return Ok(());
        }

        for job in queued.into_iter().take(budget) {
            // Re-read to catch cancellation set since the snapshot above.
            let current = self.db.get_job(&job.id).await?;
            let Some(current) = current else { continue };
            if current.status != cratedig_domain::JobStatus::Queued {
                continue;
            }

            let permit = match self.inner.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let worker = self.clone();
            self.inner.tracker.spawn(async move {
                let _permit = permit;
                worker.run_job(current).await;
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_catalog::{CachedCatalogClient, CatalogClient};
    use cratedig_domain::JobType;
    use std::time::Duration as StdDuration;

    async fn test_worker() -> (Worker, Db, tempfile::TempDir) {
        let db = Db::open("sqlite::memory:").await.unwrap();
        let tmp = tempfile::tempdir().unwrap();

        let catalog_client = CatalogClient::new("http://127.0.0.1:1", StdDuration::from_millis(1)).unwrap();
        let catalog = CachedCatalogClient::new(catalog_client, db.clone(), StdDuration::from_secs(60));
        let metadata = MetadataClient::new("http://127.0.0.1:1", StdDuration::from_millis(1)).unwrap();
        let jobs = JobService::new(db.clone());
        let downloader = Downloader::new(catalog.clone(), tmp.path().join(".incoming"), "LOSSLESS");

        let mut config = AppConfig::default();
        config.storage.downloads_dir = tmp.path().join("downloads").to_string_lossy().into_owned();
        config.worker.max_concurrent = 2;
        config.worker.poll_interval_secs = 1;

        let worker = Worker::new(&config, db.clone(), catalog, metadata, jobs, downloader);
        (worker, db, tmp)
    }

    #[tokio::test]
    async fn start_resets_stuck_running_jobs_to_queued() {
        let (worker, db, _tmp) = test_worker().await;
        let job = cratedig_domain::Job::new("stuck-1", JobType::Track);
        db.create_job(&job).await.unwrap();
        db.update_job_status(&job.id, cratedig_domain::JobStatus::Running, 10)
            .await
            .unwrap();

        let handle = worker.start().await.unwrap();
        let reloaded = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, cratedig_domain::JobStatus::Queued);

        worker.stop().await;
        handle.abort();
    }

    #[tokio::test]
    async fn an_unresolvable_job_is_recorded_as_failed_without_crashing_the_dispatcher() {
        let (worker, db, _tmp) = test_worker().await;
        let job = cratedig_domain::Job::new("missing-track", JobType::Track);
        db.create_job(&job).await.unwrap();

        worker.tick().await.unwrap();
        // give the spawned job task a moment to run against the
        // unreachable catalog host and record its failure
        for _ in 0..50 {
            if let Some(reloaded) = db.get_job(&job.id).await.unwrap() {
                if reloaded.status != cratedig_domain::JobStatus::Running
                    && reloaded.status != cratedig_domain::JobStatus::Queued
                {
                    assert_eq!(reloaded.status, cratedig_domain::JobStatus::Failed);
                    assert!(reloaded.error.is_some());
                    worker.stop().await;
                    return;
                }
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        panic!("job never reached a terminal state");
    }
}
