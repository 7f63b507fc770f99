// SPDX-License-Identifier: GPL-3.0-or-later
//! Job persistence operations (spec §4.5, C5).

use anyhow::{anyhow, Result};
use chrono::Utc;
use cratedig_domain::{Job, JobStatus, JobType};
use sqlx::Row;
use tracing::debug;

use crate::model::row_to_job;
use crate::Db;

/// Per-terminal-status counts over finished jobs (spec §4.6 `GetJobStats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl Db {
    pub async fn create_job(&self, job: &Job) -> Result<()> {
        debug!(target: "db", job_id = %job.id, job_type = %job.job_type, source_id = %job.source_id, "creating job");
        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, progress, source_id, error, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(job.job_type.to_string())
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(&job.source_id)
        .bind(&job.error)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    /// The queued-or-running job for `(source_id, job_type)`, if any. Backs
    /// the at-most-one-active-job invariant at the application layer; the
    /// partial unique index enforces it at the storage layer regardless.
    pub async fn get_active_job_by_source_id(
        &self,
        source_id: &str,
        job_type: JobType,
    ) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT * FROM jobs WHERE source_id = ? AND job_type = ? AND status IN ('queued', 'running') LIMIT 1",
        )
        .bind(source_id)
        .bind(job_type.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn update_job_status(&self, id: &str, status: JobStatus, progress: u8) -> Result<()> {
        debug!(target: "db", job_id = id, %status, progress, "updating job status");
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, progress = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(progress as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("job not found: {id}"));
        }
        Ok(())
    }

    /// Touch `updated_at` without changing status; used by the progress
    /// writer during long byte copies (spec §4.10).
    pub async fn touch_job(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_job_error(&self, id: &str, message: &str) -> Result<()> {
        debug!(target: "db", job_id = id, error = message, "recording job failure");
        sqlx::query(
            "UPDATE jobs SET status = 'failed', error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resets a job back to `queued`, zeroing progress and clearing the
    /// error — the effect of spec §4.6 `RetryJob`.
    pub async fn clear_job_error(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'queued', progress = 0, error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_active_jobs(&self, page: i64, size: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status IN ('queued', 'running') \
             ORDER BY created_at ASC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(page.max(0) * size)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// All active jobs, unpaginated — used by the worker dispatcher, which
    /// needs the full queued/running snapshot every tick (spec §4.10).
    pub async fn list_all_active_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status IN ('queued', 'running') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn list_finished_jobs(&self, page: i64, size: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status IN ('completed', 'failed', 'cancelled') \
             ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(page.max(0) * size)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn list_jobs(&self, page: i64, size: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?")
            .bind(size)
            .bind(page.max(0) * size)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn job_stats(&self) -> Result<JobStats> {
        let row = sqlx::query(
            "SELECT \
                SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed, \
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed, \
                SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END) AS cancelled \
             FROM jobs WHERE status IN ('completed', 'failed', 'cancelled')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(JobStats {
            completed: row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0),
            failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0),
            cancelled: row.try_get::<Option<i64>, _>("cancelled")?.unwrap_or(0),
        })
    }

    pub async fn clear_finished_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed', 'cancelled')",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Repatriates jobs left `running` by a prior process death back to
    /// `queued`. Called once on worker start (spec §4.10), before the HTTP
    /// listener accepts requests, so no new jobs race the reset.
    pub async fn reset_stuck_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', updated_at = ? WHERE status = 'running'",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            tracing::info!(target: "db", count = result.rows_affected(), "reset stuck running jobs to queued");
        }
        Ok(result.rows_affected())
    }
}
