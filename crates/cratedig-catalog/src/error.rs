// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("rate limit retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("invalid response from catalog: {0}")]
    InvalidResponse(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("catalog error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("unsupported manifest mime type: {0}")]
    UnsupportedMime(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("cache error: {0}")]
    CacheError(#[from] anyhow::Error),
}
