// SPDX-License-Identifier: GPL-3.0-or-later
//! Job service (C6) and downloads service (C7): the two persistence-facing
//! services the worker and the HTTP layer call into. Neither touches the
//! catalog, the downloader, or the enricher directly — those are the
//! worker's job.

pub mod downloads;
pub mod jobs;

pub use downloads::{DownloadFilter, DownloadsError, DownloadsService};
pub use jobs::{JobService, JobsError};
