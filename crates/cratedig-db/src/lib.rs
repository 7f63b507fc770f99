// SPDX-License-Identifier: GPL-3.0-or-later
pub mod cache;
pub mod jobs;
mod migrations;
mod model;
pub mod settings;
pub mod tracks;

pub use tracks::AlbumState;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Persistence handle for the whole application (spec §4.5, C5). A single
/// pool is shared by every caller; SQLite's own locking plus WAL mode makes
/// that safe under the worker's bounded concurrency.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Opens (creating if absent) the SQLite database at `url`, enables WAL
    /// journaling and a busy timeout generous enough to ride out a writer
    /// holding the database during a large batch insert, and brings the
    /// schema up to date before returning.
    pub async fn open(url: &str) -> Result<Self> {
        let normalized = normalize_sqlite_url(url)?;
        info!(target: "db", db_url = %normalized, "opening database");

        let options: SqliteConnectOptions = normalized
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        info!(target: "db", "running migrations");
        migrations::run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) async fn open_in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Resolves relative sqlite file URLs against the current directory and
/// creates the parent directory if it doesn't exist yet, so a fresh
/// deployment doesn't need to pre-create its data directory by hand.
fn normalize_sqlite_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || url.starts_with("sqlite://:memory:") || url == "sqlite::memory:" {
        return Ok(url.to_string());
    }

    let db_path = url.trim_start_matches("sqlite://");
    let path = Path::new(db_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let path_str = absolute.to_string_lossy().replace('\\', "/");

    Ok(format!("sqlite://{path_str}?mode=rwc"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_domain::{Job, JobType, Track};

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let db = Db::open_in_memory().await.unwrap();
        assert_eq!(db.job_stats().await.unwrap().completed, 0);
    }

    #[tokio::test]
    async fn job_lifecycle_round_trips() {
        let db = Db::open_in_memory().await.unwrap();
        let job = Job::new("source-1", JobType::Track);
        db.create_job(&job).await.unwrap();

        let fetched = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.source_id, "source-1");

        db.update_job_status(&job.id, cratedig_domain::JobStatus::Running, 50)
            .await
            .unwrap();
        let running = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(running.progress, 50);
    }

    #[tokio::test]
    async fn active_job_unique_index_rejects_duplicate() {
        let db = Db::open_in_memory().await.unwrap();
        let job1 = Job::new("dup-source", JobType::Track);
        let job2 = Job::new("dup-source", JobType::Track);
        db.create_job(&job1).await.unwrap();
        let result = db.create_job(&job2).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cache_entries_expire_lazily() {
        let db = Db::open_in_memory().await.unwrap();
        db.set_cache("k", b"v", Some(chrono::Duration::seconds(-1)))
            .await
            .unwrap();
        assert_eq!(db.get_cache("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn track_partial_update_rejects_unknown_column() {
        let db = Db::open_in_memory().await.unwrap();
        let track = Track::new("upstream-1".to_string());
        let id = db.create_track(&track).await.unwrap();
        let result = db
            .update_track_partial(id, &[("not_a_real_column", serde_json::json!("x"))])
            .await;
        assert!(result.is_err());
    }
}
