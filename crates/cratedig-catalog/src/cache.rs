// SPDX-License-Identifier: GPL-3.0-or-later
//! Read-through cache wrapper over [`CatalogClient`] (spec §4.3), backed by
//! the shared cache table in `cratedig-db`.

use chrono::Duration as ChronoDuration;
use cratedig_db::Db;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::CatalogClient;
use crate::error::Result;
use crate::models::{CatalogAlbum, CatalogArtist, CatalogPlaylist, CatalogTrack, SearchKind, SearchResults};

/// Wraps a [`CatalogClient`], caching every operation except
/// `get_stream`/`get_similar_albums`/`get_lyrics`, which pass through
/// uncached per spec §4.3.
#[derive(Clone)]
pub struct CachedCatalogClient {
    inner: CatalogClient,
    db: Db,
    ttl: ChronoDuration,
}

impl CachedCatalogClient {
    pub fn new(inner: CatalogClient, db: Db, ttl: std::time::Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::seconds(3600));
        Self { inner, db, ttl }
    }

    pub async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        cancel: &CancellationToken,
    ) -> Result<SearchResults> {
        let key = format!("search:{kind}:{query}");
        self.cached(&key, || self.inner.search(query, kind, cancel))
            .await
    }

    pub async fn get_artist(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogArtist> {
        let key = format!("artist:{id}");
        self.cached(&key, || self.inner.get_artist(id, cancel)).await
    }

    pub async fn get_album(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogAlbum> {
        let key = format!("album:{id}");
        self.cached(&key, || self.inner.get_album(id, cancel)).await
    }

    pub async fn get_playlist(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogPlaylist> {
        let key = format!("playlist:{id}");
        self.cached(&key, || self.inner.get_playlist(id, cancel)).await
    }

    pub async fn get_track(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogTrack> {
        let key = format!("track:{id}");
        self.cached(&key, || self.inner.get_track(id, cancel)).await
    }

    /// Passes through uncached: a live stream can't be replayed from a
    /// cached byte blob without defeating the point of streaming it.
    pub async fn get_stream(
        &self,
        id: &str,
        quality: &str,
        cancel: &CancellationToken,
    ) -> Result<(impl futures::Stream<Item = Result<bytes::Bytes>>, String)> {
        self.inner.get_stream(id, quality, cancel).await
    }

    pub async fn get_similar_albums(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CatalogAlbum>> {
        self.inner.get_similar_albums(id, cancel).await
    }

    pub async fn get_lyrics(&self, id: &str, cancel: &CancellationToken) -> Result<crate::models::Lyrics> {
        self.inner.get_lyrics(id, cancel).await
    }

    pub async fn clear_cache(&self) -> anyhow::Result<()> {
        // The shared cache table also stores C4 data; only catalog keys are
        // namespaced with these prefixes, so only they are touched here.
        for prefix in ["search:", "artist:", "album:", "playlist:", "track:"] {
            self.db.clear_cache_prefix(prefix).await?;
        }
        Ok(())
    }

    /// On hit within TTL, decodes and returns the cached payload; a decode
    /// failure is treated as a miss rather than surfaced, per spec §4.3. On
    /// miss, calls through and stores the fresh result for `ttl`.
    async fn cached<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.db.get_cache(key).await {
            Ok(Some(bytes)) => {
                if let Ok(value) = serde_json::from_slice::<T>(&bytes) {
                    debug!(target: "catalog", key, "cache hit");
                    return Ok(value);
                }
                debug!(target: "catalog", key, "cache decode failure, treating as miss");
            }
            Ok(None) => {}
            Err(err) => return Err(err.into()),
        }

        let value = fetch().await?;
        if let Ok(bytes) = serde_json::to_vec(&value) {
            let _ = self.db.set_cache(key, &bytes, Some(self.ttl)).await;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    /// Spec §4.3: "Cache errors surface" — a genuine `get_cache` failure
    /// must propagate, not be silently treated as a miss that falls
    /// through to `fetch`.
    #[tokio::test]
    async fn cache_lookup_error_propagates_instead_of_falling_through_to_fetch() {
        let db = cratedig_db::Db::open("sqlite::memory:").await.unwrap();
        let inner = CatalogClient::new("http://127.0.0.1:1", std::time::Duration::from_secs(5)).unwrap();
        let cached = CachedCatalogClient::new(inner, db.clone(), std::time::Duration::from_secs(60));
        db.close().await;

        let cancel = CancellationToken::new();
        let result = cached.get_track("t1", &cancel).await;

        assert!(matches!(result, Err(CatalogError::CacheError(_))));
    }
}
