// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid response from external metadata service: {0}")]
    InvalidResponse(String),

    #[error("metadata error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("rate limit retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl From<cratedig_catalog::rate_limiter::Cancelled> for MetadataError {
    fn from(_: cratedig_catalog::rate_limiter::Cancelled) -> Self {
        MetadataError::Cancelled
    }
}
