// SPDX-License-Identifier: GPL-3.0-or-later
//! Error kinds a running job can end in (spec §4.10, §7). `Worker` is the
//! only component that ever turns one of these into a job status
//! transition; every lower layer just returns its own typed error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job observed its own cancellation; the caller should leave the
    /// job row as `cancelled` and not touch `error`.
    #[error("job cancelled")]
    Cancelled,

    /// The failure has already been written to the job (and, where
    /// relevant, track) row via `UpdateJobError`/`MarkTrackFailed`; the
    /// caller only needs to stop, not record anything further.
    #[error("already recorded")]
    AlreadyRecorded,

    /// Filesystem, database, or panic-recovery failures: fatal, and not
    /// yet recorded anywhere, so the caller must still call
    /// `UpdateJobError`.
    #[error("{0}")]
    Fatal(String),
}

pub(crate) fn fatal(err: impl std::fmt::Display) -> WorkerError {
    WorkerError::Fatal(err.to_string())
}
