// SPDX-License-Identifier: GPL-3.0-or-later
//! HTTP surface consuming the public operations spec §6 names: job
//! enqueue/list/cancel/retry/stats, download list/search/filter/update/
//! delete, the sync-job shortcuts, and cache invalidation. No business
//! logic lives here — every handler is a thin adapter over `JobService`,
//! `DownloadsService`, or `CachedCatalogClient`.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{middleware as axum_middleware, routing::get, routing::post, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use handlers::downloads::{
    clear_cache, delete_download, filter_downloads, get_download, get_download_by_provider_id,
    list_downloads, search_downloads, sync_all, sync_file, sync_hifi, sync_metadata,
    update_download, TrackResponse,
};
use handlers::jobs::{
    cancel_job, clear_finished_jobs, enqueue_job, get_job, job_stats, list_active_jobs,
    list_finished_jobs, list_jobs, retry_job, EnqueueJobRequest, JobResponse, JobStatsResponse,
};
use serde::Serialize;
use state::AppState;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
#[allow(dead_code)]
async fn health() -> Json<HealthResponse> {
    health_handler().await
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        handlers::jobs::enqueue_job,
        handlers::jobs::list_jobs,
        handlers::jobs::list_active_jobs,
        handlers::jobs::list_finished_jobs,
        handlers::jobs::job_stats,
        handlers::jobs::clear_finished_jobs,
        handlers::jobs::get_job,
        handlers::jobs::cancel_job,
        handlers::jobs::retry_job,
        handlers::downloads::list_downloads,
        handlers::downloads::search_downloads,
        handlers::downloads::filter_downloads,
        handlers::downloads::get_download,
        handlers::downloads::get_download_by_provider_id,
        handlers::downloads::update_download,
        handlers::downloads::delete_download,
        handlers::downloads::sync_file,
        handlers::downloads::sync_metadata,
        handlers::downloads::sync_hifi,
        handlers::downloads::sync_all,
        handlers::downloads::clear_cache,
    ),
    components(
        schemas(
            HealthResponse,
            JobResponse,
            JobStatsResponse,
            EnqueueJobRequest,
            TrackResponse,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "jobs", description = "Job queue management endpoints"),
        (name = "downloads", description = "Completed download and sync endpoints"),
    ),
    info(
        title = "cratedig API",
        version = "0.1.0",
        description = "Self-hosted music acquisition service",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let api_v1 = Router::new()
        .route("/jobs", get(list_jobs).post(enqueue_job))
        .route("/jobs/active", get(list_active_jobs))
        .route(
            "/jobs/finished",
            get(list_finished_jobs).delete(clear_finished_jobs),
        )
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/retry", post(retry_job))
        .route("/downloads", get(list_downloads))
        .route("/downloads/search", get(search_downloads))
        .route("/downloads/filter", get(filter_downloads))
        .route("/downloads/sync/all", post(sync_all))
        .route(
            "/downloads/provider/:provider_id",
            get(get_download_by_provider_id).delete(delete_download),
        )
        .route(
            "/downloads/provider/:provider_id/sync/file",
            post(sync_file),
        )
        .route(
            "/downloads/provider/:provider_id/sync/metadata",
            post(sync_metadata),
        )
        .route(
            "/downloads/provider/:provider_id/sync/hifi",
            post(sync_hifi),
        )
        .route("/downloads/:id", get(get_download).patch(update_download))
        .route("/cache/clear", post(clear_cache))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
