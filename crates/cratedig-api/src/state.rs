// SPDX-License-Identifier: GPL-3.0-or-later
//! Shared request state: the two persistence-facing services plus the
//! cached catalog client (for `ClearCache`) and the configured auth
//! credential the auth middleware checks requests against.

use cratedig_catalog::CachedCatalogClient;
use cratedig_config::AuthConfig;
use cratedig_jobs::{DownloadsService, JobService};

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub downloads: DownloadsService,
    pub catalog: CachedCatalogClient,
    pub auth: AuthConfig,
}
