// SPDX-License-Identifier: GPL-3.0-or-later
//! Download endpoints: the HTTP face of C7 (spec §4.7, §6's public
//! operations list — `ListDownloads/Search/Filter`, `GetTrackByID/ProviderID`,
//! `UpdateTrackPartial`, `DeleteDownload`, the `EnqueueSync*` shortcuts, and
//! `ClearCache`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use cratedig_jobs::DownloadFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ErrorResponse;
use crate::handlers::jobs::JobResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackResponse {
    pub id: i64,
    pub upstream_id: String,
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub albums: Vec<String>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub isrc: Option<String>,
    pub duration_seconds: Option<f64>,
    pub status: String,
    pub error: Option<String>,
    pub file_path: Option<String>,
    pub extension: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<cratedig_domain::Track> for TrackResponse {
    fn from(t: cratedig_domain::Track) -> Self {
        Self {
            id: t.id,
            upstream_id: t.upstream_id,
            title: t.title,
            artists: t.artists,
            albums: t.albums,
            track_number: t.track_number,
            disc_number: t.disc_number,
            year: t.year,
            genre: t.genre,
            isrc: t.isrc,
            duration_seconds: t.duration_seconds,
            status: t.status.to_string(),
            error: t.error,
            file_path: t.file_path,
            extension: t.extension,
            content_hash: t.content_hash,
            created_at: t.created_at,
            updated_at: t.updated_at,
            completed_at: t.completed_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageQuery {
    fn paged(&self) -> (i64, i64) {
        (self.page.unwrap_or(0).max(0), self.size.unwrap_or(50).clamp(1, 500))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FilterQuery {
    /// One of `all`, `without_genre`, `with_isrc`.
    pub filter: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTrackRequest {
    /// Column name to new-value map; only columns the enricher itself can
    /// write are accepted (see `update_track_partial`'s column allowlist).
    #[serde(flatten)]
    pub columns: std::collections::BTreeMap<String, Value>,
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads",
    params(("page" = Option<i64>, Query), ("size" = Option<i64>, Query)),
    responses((status = 200, description = "Completed tracks, newest first", body = [TrackResponse])),
    tag = "downloads"
)]
pub async fn list_downloads(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let (page, size) = page.paged();
    match state.downloads.list_downloads(page, size).await {
        Ok(tracks) => Json(tracks.into_iter().map(TrackResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/search",
    params(("q" = String, Query), ("page" = Option<i64>, Query), ("size" = Option<i64>, Query)),
    responses((status = 200, description = "Tracks matching a free-text query", body = [TrackResponse])),
    tag = "downloads"
)]
pub async fn search_downloads(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let page = query.page.unwrap_or(0).max(0);
    let size = query.size.unwrap_or(50).clamp(1, 500);
    match state.downloads.search_downloads(&query.q, page, size).await {
        Ok(tracks) => Json(tracks.into_iter().map(TrackResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/filter",
    params(("filter" = Option<String>, Query), ("page" = Option<i64>, Query), ("size" = Option<i64>, Query)),
    responses(
        (status = 200, description = "Completed tracks matching the named filter", body = [TrackResponse]),
        (status = 400, description = "Unknown filter name", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn filter_downloads(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> impl IntoResponse {
    let filter = match query.filter.as_deref().unwrap_or("all") {
        "all" => DownloadFilter::All,
        "without_genre" => DownloadFilter::WithoutGenre,
        "with_isrc" => DownloadFilter::WithIsrc,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("unknown filter: {other}"),
                }),
            )
                .into_response()
        }
    };
    let page = query.page.unwrap_or(0).max(0);
    let size = query.size.unwrap_or(50).clamp(1, 500);
    match state.downloads.filter_downloads(filter, page, size).await {
        Ok(tracks) => Json(tracks.into_iter().map(TrackResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/{id}",
    params(("id" = i64, Path)),
    responses(
        (status = 200, description = "The track", body = TrackResponse),
        (status = 404, description = "No such track", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn get_download(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.downloads.get_track_by_id(id).await {
        Ok(track) => Json(TrackResponse::from(track)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/provider/{provider_id}",
    params(("provider_id" = String, Path)),
    responses(
        (status = 200, description = "The track", body = TrackResponse),
        (status = 404, description = "No such track", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn get_download_by_provider_id(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> impl IntoResponse {
    match state.downloads.get_download_by_provider_id(&provider_id).await {
        Ok(track) => Json(TrackResponse::from(track)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/downloads/{id}",
    params(("id" = i64, Path)),
    request_body = UpdateTrackRequest,
    responses(
        (status = 200, description = "Columns updated"),
        (status = 500, description = "Persistence failure", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn update_download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTrackRequest>,
) -> impl IntoResponse {
    let columns: Vec<(&str, Value)> = request
        .columns
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    match state.downloads.update_track_partial(id, &columns).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/downloads/provider/{provider_id}",
    params(("provider_id" = String, Path)),
    responses(
        (status = 200, description = "Track and file removed"),
        (status = 404, description = "No such track", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn delete_download(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> impl IntoResponse {
    match state.downloads.delete_download(&provider_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/downloads/provider/{provider_id}/sync/file",
    params(("provider_id" = String, Path)),
    responses((status = 200, description = "sync_file job enqueued", body = JobResponse)),
    tag = "downloads"
)]
pub async fn sync_file(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> impl IntoResponse {
    match state.downloads.enqueue_sync_file_job(&provider_id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/downloads/provider/{provider_id}/sync/metadata",
    params(("provider_id" = String, Path)),
    responses((status = 200, description = "sync_external job enqueued", body = JobResponse)),
    tag = "downloads"
)]
pub async fn sync_metadata(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> impl IntoResponse {
    match state.downloads.enqueue_sync_metadata_job(&provider_id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/downloads/provider/{provider_id}/sync/hifi",
    params(("provider_id" = String, Path)),
    responses((status = 200, description = "sync_catalog job enqueued", body = JobResponse)),
    tag = "downloads"
)]
pub async fn sync_hifi(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> impl IntoResponse {
    match state.downloads.enqueue_sync_hifi_job(&provider_id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/downloads/sync/all",
    responses((status = 200, description = "Number of sync_catalog jobs enqueued", body = u64)),
    tag = "downloads"
)]
pub async fn sync_all(State(state): State<AppState>) -> impl IntoResponse {
    match state.downloads.enqueue_sync_jobs().await {
        Ok(count) => Json(count).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/cache/clear",
    responses(
        (status = 200, description = "Catalog cache cleared"),
        (status = 500, description = "Persistence failure", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.clear_cache().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}
