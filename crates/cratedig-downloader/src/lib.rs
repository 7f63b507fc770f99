// SPDX-License-Identifier: GPL-3.0-or-later
//! C9: pulls one stream from the catalog client, selects a file extension
//! from the declared MIME type, retries on failure, and writes the bytes to
//! a staging directory (spec §4.9). The staged path is handed back to the
//! worker, which is responsible for the final rename into the library
//! layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cratedig_catalog::CachedCatalogClient;
use futures::StreamExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("download cancelled")]
    Cancelled,
    #[error("catalog error: {0}")]
    Catalog(#[from] cratedig_catalog::CatalogError),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<DownloaderError>,
    },
}

pub type Result<T> = std::result::Result<T, DownloaderError>;

#[derive(Debug, Clone)]
pub struct Downloader {
    catalog: CachedCatalogClient,
    staging_dir: PathBuf,
    quality: String,
}

impl Downloader {
    pub fn new(catalog: CachedCatalogClient, staging_dir: impl Into<PathBuf>, quality: impl Into<String>) -> Self {
        Self {
            catalog,
            staging_dir: staging_dir.into(),
            quality: quality.into(),
        }
    }

    /// Downloads `upstream_id` to a staged file named after
    /// `dst_path_without_extension`'s file stem, returning the staged path.
    /// Retries the whole fetch-and-write cycle up to `MAX_ATTEMPTS` times,
    /// removing any partial file between attempts.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        upstream_id: &str,
        dst_path_without_extension: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tokio::fs::set_permissions(
                &self.staging_dir,
                std::fs::Permissions::from_mode(0o750),
            )
            .await;
        }

        let base = dst_path_without_extension
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| upstream_id.to_string());

        let mut attempt: u32 = 0;
        let mut last_err: Option<DownloaderError> = None;

        while attempt < MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(DownloaderError::Cancelled);
            }

            match self.try_once(cancel, upstream_id, &base).await {
                Ok(path) => return Ok(path),
                Err(DownloaderError::Cancelled) => return Err(DownloaderError::Cancelled),
                Err(err) => {
                    attempt += 1;
                    warn!(target: "downloader", %upstream_id, attempt, %err, "download attempt failed");
                    last_err = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        tokio::select! {
                            _ = tokio::time::sleep(RETRY_BASE * attempt) => {}
                            _ = cancel.cancelled() => return Err(DownloaderError::Cancelled),
                        }
                    }
                }
            }
        }

        Err(DownloaderError::Exhausted {
            attempts: attempt,
            source: Box::new(last_err.unwrap_or(DownloaderError::Cancelled)),
        })
    }

    async fn try_once(
        &self,
        cancel: &CancellationToken,
        upstream_id: &str,
        base: &str,
    ) -> Result<PathBuf> {
        let (stream, mime) = self
            .catalog
            .get_stream(upstream_id, &self.quality, cancel)
            .await?;
        futures::pin_mut!(stream);

        let ext = extension_for_mime(&mime);
        let staged_path = self.staging_dir.join(format!("{base}{ext}"));

        let mut file = File::create(&staged_path).await?;
        let write_result = async {
            while let Some(chunk) = stream.next().await {
                if cancel.is_cancelled() {
                    return Err(DownloaderError::Cancelled);
                }
                let bytes = chunk?;
                file.write_all(&bytes).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            drop(file);
            let _ = tokio::fs::remove_file(&staged_path).await;
            return Err(err);
        }

        debug!(target: "downloader", %upstream_id, path = %staged_path.display(), "staged download");
        Ok(staged_path)
    }
}

/// `audio/mp4` -> `.mp4`, `audio/mpeg` -> `.mp3`, anything else -> `.flac`
/// (spec §4.9; the catalog already rejects unsupported manifest MIME types
/// before a stream reaches the downloader).
fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "audio/mp4" => ".mp4",
        "audio/mpeg" => ".mp3",
        _ => ".flac",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_selection_covers_known_and_fallback_mimes() {
        assert_eq!(extension_for_mime("audio/mp4"), ".mp4");
        assert_eq!(extension_for_mime("audio/mpeg"), ".mp3");
        assert_eq!(extension_for_mime("audio/flac"), ".flac");
        assert_eq!(extension_for_mime("application/octet-stream"), ".flac");
    }
}
