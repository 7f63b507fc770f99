// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use futures::stream::{self, Stream};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{CatalogError, Result};
use crate::manifest::{self, StreamPlan};
use crate::models::{
    CatalogAlbum, CatalogArtist, CatalogPlaylist, CatalogTrack, Lyrics, SearchKind, SearchResults,
};
use crate::rate_limiter::RateLimiter;

const USER_AGENT: &str = concat!("cratedig/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, serde::Deserialize)]
struct StreamManifestResponse {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "manifest")]
    manifest_base64: String,
}

/// Typed client over the upstream hi-fi streaming catalog (spec §4.2),
/// built on the C1 rate limiter and retry policy.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, min_interval: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            rate_limiter: RateLimiter::new(min_interval),
        })
    }

    pub async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        cancel: &CancellationToken,
    ) -> Result<SearchResults> {
        let url = self.url(&format!("search/{kind}"))?;
        let url = with_query(url, &[("query", query)]);
        self.get(url, cancel).await
    }

    pub async fn get_artist(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogArtist> {
        let url = self.url(&format!("artists/{id}"))?;
        self.get(url, cancel).await
    }

    pub async fn get_album(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogAlbum> {
        let url = self.url(&format!("albums/{id}"))?;
        self.get(url, cancel).await
    }

    pub async fn get_playlist(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogPlaylist> {
        let url = self.url(&format!("playlists/{id}"))?;
        self.get(url, cancel).await
    }

    pub async fn get_track(&self, id: &str, cancel: &CancellationToken) -> Result<CatalogTrack> {
        let url = self.url(&format!("tracks/{id}"))?;
        self.get(url, cancel).await
    }

    pub async fn get_similar_albums(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CatalogAlbum>> {
        let url = self.url(&format!("albums/{id}/similar"))?;
        self.get(url, cancel).await
    }

    pub async fn get_lyrics(&self, id: &str, cancel: &CancellationToken) -> Result<Lyrics> {
        let url = self.url(&format!("tracks/{id}/lyrics"))?;
        self.get(url, cancel).await
    }

    /// Resolves the playback manifest for `id` at `quality` and returns a
    /// lazily-fetched byte stream together with its MIME type (spec §4.2).
    pub async fn get_stream(
        &self,
        id: &str,
        quality: &str,
        cancel: &CancellationToken,
    ) -> Result<(impl Stream<Item = Result<bytes::Bytes>>, String)> {
        let url = self.url(&format!("tracks/{id}/stream"))?;
        let url = with_query(url, &[("quality", quality)]);
        let response: StreamManifestResponse = self.get(url, cancel).await?;

        let plan = manifest::decode(&response.mime_type, &response.manifest_base64)?;
        let (urls, mime) = match plan {
            StreamPlan::Direct { url, mime } => (vec![url], mime),
            StreamPlan::Segmented { urls, mime } => (urls, mime),
        };

        let http = self.http.clone();
        let cancel = cancel.clone();
        let body = stream::unfold(urls.into_iter(), move |mut remaining| {
            let http = http.clone();
            let cancel = cancel.clone();
            async move {
                let next_url = remaining.next()?;
                if cancel.is_cancelled() {
                    return Some((Err(CatalogError::Cancelled), remaining));
                }
                let fetch = async {
                    let response = http.get(&next_url).send().await?;
                    let bytes = response.error_for_status()?.bytes().await?;
                    Ok::<_, reqwest::Error>(bytes)
                };
                let outcome = tokio::select! {
                    result = fetch => result.map_err(CatalogError::from),
                    _ = cancel.cancelled() => Err(CatalogError::Cancelled),
                };
                Some((outcome, remaining))
            }
        });

        Ok((body, mime.to_string()))
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base_url.trim_end_matches('/'), path))
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))
    }

    /// Implements the C1 retry contract: claim a rate-limit slot, perform
    /// the request, and on transport error or 429/503 retry up to
    /// `MAX_ATTEMPTS` times honoring any `Retry-After` header. Other
    /// non-2xx statuses are returned immediately without retry.
    async fn get<T: DeserializeOwned>(&self, url: Url, cancel: &CancellationToken) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            self.rate_limiter
                .acquire(cancel)
                .await
                .map_err(|_| CatalogError::Cancelled)?;

            trace!(target: "catalog", %url, attempt, "GET");
            let result = self
                .http
                .get(url.clone())
                .header("User-Agent", USER_AGENT)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text().await?;
                        return serde_json::from_str(&body).map_err(|e| {
                            CatalogError::InvalidResponse(format!("parse failure: {e}"))
                        });
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Err(CatalogError::NotFound(url.to_string()));
                    }

                    if is_retryable(status) {
                        let retry_after = retry_after_duration(&response);
                        attempt += 1;
                        if attempt >= MAX_ATTEMPTS {
                            return Err(CatalogError::RetriesExhausted { attempts: attempt });
                        }
                        let wait = retry_after.unwrap_or(RETRY_BASE * attempt).max(RETRY_BASE * attempt);
                        warn!(target: "catalog", %status, ?wait, attempt, "retrying after rate-limited response");
                        self.rate_limiter.push_back(wait).await;
                        continue;
                    }

                    let message = response.text().await.unwrap_or_default();
                    return Err(CatalogError::ApiError {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CatalogError::RequestFailed(err));
                    }
                    let wait = RETRY_BASE * attempt;
                    debug!(target: "catalog", %err, attempt, "retrying after transport error");
                    self.rate_limiter.push_back(wait).await;
                }
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

fn retry_after_duration(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn with_query(mut url: Url, pairs: &[(&str, &str)]) -> Url {
    {
        let mut qp = url.query_pairs_mut();
        for (k, v) in pairs {
            qp.append_pair(k, v);
        }
    }
    url
}
