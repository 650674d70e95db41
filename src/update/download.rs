//! Installer download with chunked progress reporting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::{Result, UpdateError};
use crate::version::VersionDescriptor;

/// File name used when none is configured and the URL has no usable last
/// path segment.
pub const DEFAULT_FILE_NAME: &str = "gaello-setup.exe";

/// Progress of an installer download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes written so far.
    pub downloaded: u64,
    /// Size announced by the server.
    pub total: u64,
    /// `downloaded / total * 100`, exactly `100.0` once complete.
    pub percent: f64,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: u64) -> Self {
        let percent = if total == 0 || downloaded >= total {
            100.0
        } else {
            downloaded as f64 / total as f64 * 100.0
        };
        Self {
            downloaded,
            total,
            percent,
        }
    }

    /// A finished transfer of `total` bytes.
    pub fn complete(total: u64) -> Self {
        Self::new(total, total)
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded >= self.total
    }
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Streams release installers to disk.
pub struct DownloadManager {
    config: DownloadConfig,
    client: reqwest::Client,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Where the installer for `release` is stored.
    pub fn destination_for(&self, release: &VersionDescriptor) -> PathBuf {
        let name = self
            .config
            .file_name
            .clone()
            .unwrap_or_else(|| file_name_from_url(release.url()));
        self.config.directory.join(name)
    }

    /// Download the installer of `release` into `dest`.
    ///
    /// `progress` is called after every block of `chunk_size` bytes (and once
    /// for the final partial block) with non-decreasing percentages.
    ///
    /// # Errors
    ///
    /// Fails on a request error, a status other than 200, a missing or zero
    /// `Content-Length`, a body whose length differs from the announced size,
    /// or a write error. The partial file is removed.
    pub async fn download(
        &self,
        release: &VersionDescriptor,
        dest: &Path,
        progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> Result<DownloadReport> {
        tracing::info!(url = release.url(), dest = %dest.display(), "downloading installer");

        match self.fetch(release.url(), dest, progress).await {
            Ok(bytes) => {
                tracing::info!(bytes, dest = %dest.display(), "download complete");
                Ok(DownloadReport {
                    path: dest.to_path_buf(),
                    bytes,
                })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(dest).await
                    && rm.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(path = %dest.display(), error = %rm, "cannot remove partial download");
                }
                tracing::error!(url = release.url(), error = %e, "download failed");
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> Result<u64> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::Http(format!("download request failed: {e}")))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(UpdateError::Download(format!(
                "unexpected status {} from {url}",
                resp.status()
            )));
        }

        let total = match resp.content_length() {
            Some(len) if len > 0 => len,
            _ => {
                return Err(UpdateError::Download(
                    "response has no Content-Length".into(),
                ));
            }
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            UpdateError::Download(format!("cannot create {}: {e}", dest.display()))
        })?;

        let chunk_size = self.config.chunk_size.max(1);
        let mut pending: Vec<u8> = Vec::with_capacity(chunk_size);
        let mut downloaded = 0u64;

        while let Some(bytes) = resp
            .chunk()
            .await
            .map_err(|e| UpdateError::Http(format!("download interrupted: {e}")))?
        {
            pending.extend_from_slice(&bytes);
            while pending.len() >= chunk_size {
                let rest = pending.split_off(chunk_size);
                write_block(&mut file, &pending, &mut downloaded, total, progress).await?;
                pending = rest;
            }
        }
        if !pending.is_empty() {
            write_block(&mut file, &pending, &mut downloaded, total, progress).await?;
        }
        file.flush().await?;

        if downloaded != total {
            return Err(UpdateError::Download(format!(
                "body ended after {downloaded} of {total} bytes"
            )));
        }
        Ok(downloaded)
    }
}

async fn write_block(
    file: &mut tokio::fs::File,
    block: &[u8],
    downloaded: &mut u64,
    total: u64,
    progress: &(dyn Fn(DownloadProgress) + Send + Sync),
) -> Result<()> {
    let next = *downloaded + block.len() as u64;
    if next > total {
        return Err(UpdateError::Download(format!(
            "body exceeds announced size of {total} bytes"
        )));
    }
    file.write_all(block).await?;
    *downloaded = next;
    progress(DownloadProgress::new(next, total));
    Ok(())
}

/// Last path segment of `url`, or [`DEFAULT_FILE_NAME`].
pub fn file_name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_owned())
}
