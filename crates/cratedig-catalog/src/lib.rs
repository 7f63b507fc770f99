// SPDX-License-Identifier: GPL-3.0-or-later

//! Client for the upstream hi-fi streaming catalog (C1/C2/C3): a
//! rate-limited HTTP layer, typed search/lookup/stream operations, and a
//! read-through cache wrapper backed by the shared persistence layer.

pub mod cache;
pub mod client;
pub mod error;
pub mod manifest;
pub mod models;
pub mod rate_limiter;

pub use cache::CachedCatalogClient;
pub use client::CatalogClient;
pub use error::{CatalogError, Result};
pub use models::{
    CatalogAlbum, CatalogArtist, CatalogPlaylist, CatalogTrack, Lyrics, SearchKind, SearchResults,
};
pub use rate_limiter::RateLimiter;

#[cfg(test)]
mod client_tests;
