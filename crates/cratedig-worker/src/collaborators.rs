// SPDX-License-Identifier: GPL-3.0-or-later
//! The collaborator contracts spec §6b names but leaves unspecified —
//! tagging, image fetch/save, and M3U generation are all explicitly
//! out-of-scope subsystems (spec §1). These are small adapters sufficient
//! to satisfy the contracts the worker calls into, not full
//! implementations of those subsystems.

use std::path::Path;

use async_trait::async_trait;
use cratedig_domain::Track;
use tracing::debug;

/// `TagFile(path, track, coverBytes) -> err` (spec §6b).
pub trait Tagger: Send + Sync {
    fn tag_file(&self, path: &Path, track: &Track, cover: Option<&[u8]>) -> anyhow::Result<()>;
}

/// No real audio-tag writer lives in this workspace (tagging is out of
/// scope per spec §1); this satisfies the contract by logging the call
/// that a real tagger would make.
#[derive(Debug, Default)]
pub struct NullTagger;

impl Tagger for NullTagger {
    fn tag_file(&self, path: &Path, track: &Track, cover: Option<&[u8]>) -> anyhow::Result<()> {
        debug!(
            target: "worker",
            path = %path.display(),
            upstream_id = %track.upstream_id,
            has_cover = cover.is_some(),
            "tag_file (stub adapter, no-op)"
        );
        Ok(())
    }
}

/// `DownloadImage(url) -> bytes` (spec §6b).
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn download(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

/// `SaveImageToFile(bytes, path) -> err`, specialised to the "skip if
/// already present" usage every call site needs (spec §4.10 step 6 for
/// tracks, album/playlist cover persistence during resolve).
pub async fn save_cover_if_missing(
    fetcher: &dyn ImageFetcher,
    url: &str,
    dest_path: &Path,
) -> anyhow::Result<()> {
    if tokio::fs::try_exists(dest_path).await.unwrap_or(false) {
        return Ok(());
    }
    let bytes = fetcher.download(url).await?;
    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest_path, &bytes).await?;
    Ok(())
}

/// `Generate(playlist, extensionLookup)` (spec §6b): emits an M3U file
/// from a flat list of (display title, absolute file path) entries.
#[async_trait]
pub trait PlaylistWriter: Send + Sync {
    async fn generate(&self, path: &Path, entries: &[(String, String)]) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct M3uPlaylistWriter;

#[async_trait]
impl PlaylistWriter for M3uPlaylistWriter {
    async fn generate(&self, path: &Path, entries: &[(String, String)]) -> anyhow::Result<()> {
        let mut body = String::from("#EXTM3U\n");
        for (title, file_path) in entries {
            body.push_str("#EXTINF:-1,");
            body.push_str(title);
            body.push('\n');
            body.push_str(file_path);
            body.push('\n');
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn m3u_writer_emits_extm3u_header_and_one_pair_per_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("playlists").join("mix.m3u");
        let writer = M3uPlaylistWriter;
        writer
            .generate(
                &path,
                &[
                    ("A - One".to_string(), "/music/A/B/01 One.flac".to_string()),
                    ("A - Two".to_string(), "/music/A/B/02 Two.flac".to_string()),
                ],
            )
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.starts_with("#EXTM3U\n"));
        assert_eq!(contents.matches("#EXTINF:-1,").count(), 2);
        assert!(contents.contains("/music/A/B/01 One.flac"));
    }

    #[tokio::test]
    async fn save_cover_if_missing_skips_when_file_already_exists() {
        struct Panicking;
        #[async_trait]
        impl ImageFetcher for Panicking {
            async fn download(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
                panic!("should not be called");
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("cover.jpg");
        tokio::fs::write(&dest, b"existing").await.unwrap();

        save_cover_if_missing(&Panicking, "http://example.invalid/x.jpg", &dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"existing");
    }
}
