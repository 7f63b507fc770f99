// SPDX-License-Identifier: GPL-3.0-or-later
//! Job service (C6): enqueue-with-dedup and the list/cancel/retry/stats
//! surface the worker and the HTTP layer both call into. No side effects
//! beyond persistence and structured logging (spec §4.6).

use cratedig_db::jobs::JobStats;
use cratedig_db::Db;
use cratedig_domain::{Job, JobStatus, JobType};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, JobsError>;

#[derive(Clone)]
pub struct JobService {
    db: Db,
}

impl JobService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Idempotent: returns the existing active job for `(source_id, job_type)`
    /// if one exists, otherwise creates and persists a fresh queued one. A
    /// concurrent insert racing the lookup is resolved by re-querying after a
    /// unique-constraint failure rather than surfacing a spurious error.
    pub async fn enqueue_job(&self, source_id: &str, job_type: JobType) -> Result<Job> {
        if let Some(existing) = self
            .db
            .get_active_job_by_source_id(source_id, job_type)
            .await?
        {
            return Ok(existing);
        }

        let job = Job::new(source_id, job_type);
        match self.db.create_job(&job).await {
            Ok(()) => {
                info!(target: "jobs", job_id = %job.id, %job_type, source_id, "enqueued job");
                Ok(job)
            }
            Err(err) => match self
                .db
                .get_active_job_by_source_id(source_id, job_type)
                .await?
            {
                Some(existing) => Ok(existing),
                None => Err(JobsError::Db(err)),
            },
        }
    }

    pub async fn list_jobs(&self, page: i64, size: i64) -> Result<Vec<Job>> {
        Ok(self.db.list_jobs(page, size).await?)
    }

    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.db
            .get_job(id)
            .await?
            .ok_or_else(|| JobsError::NotFound(id.to_string()))
    }

    pub async fn list_active_jobs(&self, page: i64, size: i64) -> Result<Vec<Job>> {
        Ok(self.db.list_active_jobs(page, size).await?)
    }

    pub async fn list_finished_jobs(&self, page: i64, size: i64) -> Result<Vec<Job>> {
        Ok(self.db.list_finished_jobs(page, size).await?)
    }

    pub async fn cancel_job(&self, id: &str) -> Result<()> {
        self.db.update_job_status(id, JobStatus::Cancelled, 0).await?;
        info!(target: "jobs", job_id = id, "cancelled job");
        Ok(())
    }

    pub async fn retry_job(&self, id: &str) -> Result<Job> {
        self.get_job(id).await?;
        self.db.clear_job_error(id).await?;
        info!(target: "jobs", job_id = id, "retrying job");
        self.get_job(id).await
    }

    pub async fn job_stats(&self) -> Result<JobStats> {
        Ok(self.db.job_stats().await?)
    }

    pub async fn clear_finished_jobs(&self) -> Result<u64> {
        let count = self.db.clear_finished_jobs().await?;
        info!(target: "jobs", count, "cleared finished jobs");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> JobService {
        JobService::new(Db::open("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn enqueue_job_is_idempotent_per_source_and_type() {
        let svc = service().await;
        let a = svc.enqueue_job("T1", JobType::Track).await.unwrap();
        let b = svc.enqueue_job("T1", JobType::Track).await.unwrap();
        assert_eq!(a.id, b.id);

        let c = svc.enqueue_job("T1", JobType::Album).await.unwrap();
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn cancel_and_retry_round_trip() {
        let svc = service().await;
        let job = svc.enqueue_job("T2", JobType::Track).await.unwrap();

        svc.cancel_job(&job.id).await.unwrap();
        let cancelled = svc.get_job(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.progress, 0);

        svc.db.update_job_error(&job.id, "boom").await.unwrap();
        let retried = svc.retry_job(&job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert!(retried.error.is_none());
    }

    #[tokio::test]
    async fn retry_unknown_job_is_not_found() {
        let svc = service().await;
        let err = svc.retry_job("missing").await.unwrap_err();
        assert!(matches!(err, JobsError::NotFound(_)));
    }

    #[tokio::test]
    async fn clear_finished_jobs_only_removes_terminal_rows() {
        let svc = service().await;
        let active = svc.enqueue_job("T3", JobType::Track).await.unwrap();
        let finished = svc.enqueue_job("T4", JobType::Track).await.unwrap();
        svc.cancel_job(&finished.id).await.unwrap();

        let removed = svc.clear_finished_jobs().await.unwrap();
        assert_eq!(removed, 1);
        assert!(svc.get_job(&active.id).await.is_ok());
        assert!(svc.get_job(&finished.id).await.is_err());
    }
}
