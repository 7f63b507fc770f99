// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use cratedig_catalog::rate_limiter::RateLimiter;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{MetadataError, Result};
use crate::models::{RecordingMetadata, RecordingResponse, SearchRecordingResponse};

const USER_AGENT: &str = concat!(
    "cratedig/",
    env!("CARGO_PKG_VERSION"),
    " ( https://github.com/cratedig/cratedig )"
);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Client for the external recording-metadata service (spec §4.4): fills
/// gaps a catalog lookup can't, keyed by recording id or ISRC, behind its
/// own rate limiter and a polite `User-Agent`.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl MetadataClient {
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

    /// Prefers a direct recording-id lookup; falls back to an ISRC search
    /// and returns the first hit. `fallback_title` is carried through for
    /// diagnostics only — the upstream has no title-search endpoint.
    /// Returns `Ok(None)` (not an error) when nothing matches.
    pub async fn get_recording(
        &self,
        cancel: &CancellationToken,
        recording_id: Option<&str>,
        isrc: Option<&str>,
        fallback_title: Option<&str>,
    ) -> Result<Option<RecordingMetadata>> {
        trace!(
            target: "metadata",
            ?recording_id,
            ?isrc,
            ?fallback_title,
            "resolving recording"
        );

        if let Some(id) = recording_id {
            let url = self.url(&format!("recording/{id}"))?;
            let url = with_query(
                url,
                &[("fmt", "json"), ("inc", "artists+releases+release-groups+labels")],
            );
            match self.get::<RecordingResponse>(url, cancel).await {
                Ok(recording) => return Ok(Some(recording.into())),
                Err(MetadataError::ApiError { status, .. }) if status == 404 => {}
                Err(err) => return Err(err),
            }
        }

        let Some(isrc) = isrc else {
            return Ok(None);
        };

        let url = self.url("recording")?;
        let url = with_query(
            url,
            &[
                ("query", &format!("isrc:{isrc}")),
                ("fmt", "json"),
                ("inc", "artists+releases+release-groups+labels"),
            ],
        );
        let response: SearchRecordingResponse = self.get(url, cancel).await?;
        Ok(response.recordings.into_iter().next().map(Into::into))
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base_url.trim_end_matches('/'), path))
            .map_err(|e| MetadataError::InvalidResponse(e.to_string()))
    }

    /// Implements the same C1 retry contract C2's client uses (spec §7:
    /// transient transport is retried inside the client): claim a
    /// rate-limit slot, perform the request, and on transport error or
    /// 429/503 retry up to `MAX_ATTEMPTS` times honoring any `Retry-After`
    /// header. Other non-2xx statuses are returned immediately.
    async fn get<T: DeserializeOwned>(&self, url: Url, cancel: &CancellationToken) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            self.rate_limiter.acquire(cancel).await?;

            trace!(target: "metadata", %url, attempt, "GET");
            let result = self
                .http
                .get(url.clone())
                .header("User-Agent", USER_AGENT)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    debug!(target: "metadata", %status, "response");

                    if status.is_success() {
                        let body = response.text().await?;
                        return serde_json::from_str(&body).map_err(|e| {
                            MetadataError::InvalidResponse(format!("parse failure: {e}"))
                        });
                    }

                    if is_retryable(status) {
                        let retry_after = retry_after_duration(&response);
                        attempt += 1;
                        if attempt >= MAX_ATTEMPTS {
                            return Err(MetadataError::RetriesExhausted { attempts: attempt });
                        }
                        let wait = retry_after.unwrap_or(RETRY_BASE * attempt).max(RETRY_BASE * attempt);
                        warn!(target: "metadata", %status, ?wait, attempt, "retrying after rate-limited response");
                        self.rate_limiter.push_back(wait).await;
                        continue;
                    }

                    let message = response.text().await.unwrap_or_default();
                    return Err(MetadataError::ApiError {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(MetadataError::RequestFailed(err));
                    }
                    let wait = RETRY_BASE * attempt;
                    debug!(target: "metadata", %err, attempt, "retrying after transport error");
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
