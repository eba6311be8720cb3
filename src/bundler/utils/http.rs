//! HTTP utilities for downloading signing material.
//!
//! The release API has its own client ([`crate::github::GitHubClient`]);
//! this module only fetches plain files, following redirects by hand so the
//! hop count is bounded and a truncated body is reported instead of silently
//! producing a short file.

use crate::bundler::error::{Error, ErrorExt, HttpError, Result};
use crate::bundler::utils::fs;
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use std::{path::Path, time::Duration};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum number of redirects followed by [`HttpDownloader`].
pub const MAX_REDIRECTS: usize = 10;

/// Socket timeout for file downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// User agent sent with downloads. Some hosts reject requests without one.
pub const USER_AGENT: &str = concat!("kodegen_bundler_desktop/", env!("CARGO_PKG_VERSION"));

/// Fetches a file to a local path.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Downloads `source` into `destination`, replacing any existing file.
    async fn download(&self, source: &str, destination: &Path) -> Result<()>;
}

/// Maps a transport failure to the error taxonomy.
pub(crate) fn transport_error(error: reqwest::Error, url: &str) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        Error::Request(error)
    }
}

/// [`Downloader`] for `http(s)` URLs, `data:` URLs, `file://` URLs and local
/// paths.
#[derive(Clone, Debug)]
pub struct HttpDownloader {
    client: reqwest::Client,
    cancel: CancellationToken,
    timeout: Duration,
}

impl HttpDownloader {
    /// Creates a downloader that does not follow redirects on its own.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .connect_timeout(DOWNLOAD_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            cancel: CancellationToken::new(),
            timeout: DOWNLOAD_TIMEOUT,
        })
    }

    /// Ties downloads to a cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Overrides the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let mut current = Url::parse(url)?;
        let mut redirects = 0;

        loop {
            log::debug!("Downloading {}", current);

            let request = self.client.get(current.clone()).timeout(self.timeout).send();
            let response = tokio::select! {
                response = request => response.map_err(|e| transport_error(e, current.as_str()))?,
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            };

            let status = response.status();
            if status.as_u16() >= 400 {
                return Err(HttpError::new(status, None).into());
            }

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(String::from);

            if let Some(location) = location.filter(|_| status.is_redirection()) {
                if redirects >= MAX_REDIRECTS {
                    return Err(Error::TooManyRedirects {
                        url: current.to_string(),
                        max: MAX_REDIRECTS,
                    });
                }
                redirects += 1;
                current = current.join(&location)?;
                continue;
            }

            let written = tokio::select! {
                written = write_body(response, current.as_str(), destination) => written,
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
            };

            if written.is_err() {
                if let Err(e) = fs::remove_file(destination).await {
                    log::debug!(
                        "Partial download {} was not removed: {}",
                        destination.display(),
                        e
                    );
                }
            }
            return written.map(|bytes| {
                log::debug!("Downloaded {} bytes to {}", bytes, destination.display());
            });
        }
    }
}

async fn write_body(response: reqwest::Response, url: &str, destination: &Path) -> Result<u64> {
    let expected = response.content_length();
    let mut file = tokio::fs::File::create(destination)
        .await
        .fs_context("creating download destination", destination)?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    url: url.to_string(),
                }
            } else {
                Error::Aborted {
                    url: url.to_string(),
                }
            }
        })?;
        file.write_all(&chunk)
            .await
            .fs_context("writing download", destination)?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .fs_context("flushing download", destination)?;

    match expected {
        Some(expected) if written < expected => Err(Error::Aborted {
            url: url.to_string(),
        }),
        _ => Ok(written),
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, source: &str, destination: &Path) -> Result<()> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch(source, destination).await;
        }

        if let Some(payload) = source.strip_prefix("data:") {
            let encoded = payload
                .split_once(";base64,")
                .map(|(_, data)| data)
                .ok_or_else(|| {
                    Error::GenericError("Only base64 data URLs are supported".to_string())
                })?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| Error::GenericError(format!("Invalid base64 data URL: {e}")))?;
            return tokio::fs::write(destination, bytes)
                .await
                .fs_context("writing decoded data URL", destination);
        }

        let local = match source.strip_prefix("file://") {
            Some(path) => Path::new(path),
            None => Path::new(source),
        };
        fs::copy_file(local, destination).await
    }
}
