// SPDX-License-Identifier: GPL-3.0-or-later
//! Maps service-layer errors onto HTTP responses (spec §6's public
//! operations list, consumed here as the core's only contract with the
//! HTTP layer).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cratedig_jobs::{DownloadsError, JobsError};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    fn response(status: StatusCode, error: impl Into<String>) -> Response {
        (status, Json(ErrorResponse { error: error.into() })).into_response()
    }
}

impl IntoResponse for JobsError {
    fn into_response(self) -> Response {
        match self {
            JobsError::NotFound(id) => {
                ErrorResponse::response(StatusCode::NOT_FOUND, format!("job not found: {id}"))
            }
            JobsError::Db(err) => {
                ErrorResponse::response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl IntoResponse for DownloadsError {
    fn into_response(self) -> Response {
        match self {
            DownloadsError::NotFound(id) => ErrorResponse::response(
                StatusCode::NOT_FOUND,
                format!("download not found: {id}"),
            ),
            DownloadsError::Jobs(err) => err.into_response(),
            DownloadsError::Db(err) => {
                ErrorResponse::response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            DownloadsError::Io(err) => {
                ErrorResponse::response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}
