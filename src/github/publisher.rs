//! Draft release publishing.
//!
//! A [`ReleasePublisher`] is bound to one tag (`v<version>`). The first
//! caller of [`ReleasePublisher::release`] looks the release up and creates
//! it as a draft when it does not exist; concurrent callers wait for that
//! single lookup and observe the same outcome, success or failure. Assets
//! are only ever added to drafts.

use super::client::{GitHubClient, RequestBody};
use crate::bundler::{Error, Result, error::ErrorExt};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use url::Url;

/// Minimum timeout of an asset upload.
pub const UPLOAD_TIMEOUT_FLOOR: Duration = Duration::from_secs(60);

/// Assumed worst-case upload throughput used to scale the timeout.
const UPLOAD_MIN_BYTES_PER_SEC: u64 = 64 * 1024;

const UNAUTHORIZED: &str =
    "Unauthorized, please ensure that GitHub Personal Access Token is correct.";

/// A release as returned by the API.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub id: u64,
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(rename = "draft")]
    pub is_draft: bool,
    /// RFC 6570 template, e.g. `https://uploads.github.com/.../assets{?name,label}`
    #[serde(rename = "upload_url")]
    pub upload_url_template: String,
}

/// An uploaded release asset.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub browser_download_url: Option<String>,
}

#[derive(Serialize)]
struct CreateRelease<'a> {
    tag_name: &'a str,
    draft: bool,
}

/// Lifecycle of a publisher's release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublisherState {
    /// No lookup has completed yet
    Uninitialized,
    /// A draft release is ready for uploads
    Ready(ReleaseRecord),
    /// Lookup or creation failed; every upload fails with this message
    Failed(String),
}

/// Receives upload progress.
pub trait ProgressSink: Send + Sync {
    /// `transferred` of `total` bytes of `asset` have been sent.
    fn on_progress(&self, asset: &str, transferred: u64, total: u64);
}

/// Logs upload progress at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, asset: &str, transferred: u64, total: u64) {
        log::debug!("Uploading {}: {}/{} bytes", asset, transferred, total);
    }
}

/// Publishes artifacts to the draft release of one tag.
pub struct ReleasePublisher {
    client: GitHubClient,
    owner: String,
    repo: String,
    tag: String,
    release: OnceCell<std::result::Result<ReleaseRecord, Arc<Error>>>,
    progress: Arc<dyn ProgressSink>,
}

impl ReleasePublisher {
    /// Publisher for tag `v<version>` of `owner/repo`.
    ///
    /// Fails right away when the client has no token.
    pub fn new(
        client: GitHubClient,
        owner: impl Into<String>,
        repo: impl Into<String>,
        version: &str,
    ) -> Result<Self> {
        if !client.has_token() {
            return Err(Error::publish(
                "GitHub Personal Access Token is not specified",
                None,
            ));
        }

        Ok(Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
            tag: format!("v{version}"),
            release: OnceCell::new(),
            progress: Arc::new(LogProgress),
        })
    }

    /// Reports upload progress to `progress` instead of the log.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> PublisherState {
        match self.release.get() {
            None => PublisherState::Uninitialized,
            Some(Ok(release)) => PublisherState::Ready(release.clone()),
            Some(Err(error)) => PublisherState::Failed(error.to_string()),
        }
    }

    /// The draft release, looked up or created on first use.
    pub async fn release(&self) -> Result<ReleaseRecord> {
        self.release
            .get_or_init(|| async { self.find_or_create().await.map_err(Arc::new) })
            .await
            .clone()
            .map_err(Error::Shared)
    }

    async fn find_or_create(&self) -> Result<ReleaseRecord> {
        let path = format!(
            "/repos/{}/{}/releases/tags/{}",
            self.owner, self.repo, self.tag
        );
        match self.client.get::<ReleaseRecord>(&path).await {
            Ok(release) if release.is_draft => {
                log::info!("Using existing draft release {}", self.tag);
                Ok(release)
            }
            Ok(_) => Err(Error::publish(
                format!(
                    "Release {} is already published; assets are only added to draft releases",
                    self.tag
                ),
                None,
            )),
            Err(e) if e.is_not_found() => {
                log::info!("Release {} doesn't exist, creating one", self.tag);
                self.create_release().await
            }
            Err(e) => Err(api_error(e, format!("Cannot look up release {}", self.tag))),
        }
    }

    async fn create_release(&self) -> Result<ReleaseRecord> {
        let path = format!("/repos/{}/{}/releases", self.owner, self.repo);
        let body = CreateRelease {
            tag_name: &self.tag,
            draft: true,
        };
        self.client
            .post(&path, &body)
            .await
            .map_err(|e| api_error(e, format!("Cannot create release {}", self.tag)))
    }

    /// Uploads the file at `path` as an asset named after its file name.
    pub async fn upload(&self, path: &Path) -> Result<ReleaseAsset> {
        let release = self.release().await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::GenericError(format!("{} has no file name", path.display()))
            })?;
        let url = upload_url(&release.upload_url_template, &name)?;

        let size = tokio::fs::metadata(path)
            .await
            .fs_context("reading artifact metadata", path)?
            .len();
        let file = tokio::fs::File::open(path)
            .await
            .fs_context("opening artifact", path)?;

        let progress = Arc::clone(&self.progress);
        let asset = name.clone();
        let mut transferred = 0u64;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                transferred += bytes.len() as u64;
                progress.on_progress(&asset, transferred, size);
            }
            chunk
        });

        log::info!("Uploading {} ({} bytes) to {}", name, size, self.tag);
        let body = RequestBody::Stream {
            body: reqwest::Body::wrap_stream(stream),
            content_type: content_type(&name).to_string(),
            content_length: size,
        };
        let asset: ReleaseAsset = self
            .client
            .upload(url, body, upload_timeout(size))
            .await
            .map_err(|e| api_error(e, format!("Cannot upload {name}")))?;

        log::info!("Uploaded {} to {}", asset.name, self.tag);
        Ok(asset)
    }

    /// Assets currently attached to the release.
    pub async fn list_assets(&self) -> Result<Vec<ReleaseAsset>> {
        let release = self.release().await?;
        let path = format!(
            "/repos/{}/{}/releases/{}/assets",
            self.owner, self.repo, release.id
        );
        self.client
            .get(&path)
            .await
            .map_err(|e| api_error(e, format!("Cannot list assets of {}", self.tag)))
    }

    /// Deletes the release, if this publisher resolved one.
    pub async fn delete_release(&self) -> Result<()> {
        let Some(Ok(release)) = self.release.get() else {
            log::debug!("No release {} to delete", self.tag);
            return Ok(());
        };

        log::info!("Deleting release {}", self.tag);
        let path = format!(
            "/repos/{}/{}/releases/{}",
            self.owner, self.repo, release.id
        );
        self.client
            .delete(&path)
            .await
            .map_err(|e| api_error(e, format!("Cannot delete release {}", self.tag)))
    }
}

impl std::fmt::Debug for ReleasePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasePublisher")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("tag", &self.tag)
            .field("state", &self.state())
            .finish()
    }
}

/// 401/403 become [`Error::Auth`]; other HTTP failures become
/// [`Error::Publish`] carrying the response.
fn api_error(error: Error, action: String) -> Error {
    match error {
        Error::Http(http) if matches!(http.status_code, 401 | 403) => Error::Auth {
            message: UNAUTHORIZED.to_string(),
            source: http,
        },
        Error::Http(http) => Error::publish(action, Some(http)),
        other => other,
    }
}

/// Expands the upload URL template for an asset called `name`.
pub fn upload_url(template: &str, name: &str) -> Result<Url> {
    let base = template.split('{').next().unwrap_or(template);
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().clear().append_pair("name", name);
    Ok(url)
}

/// Upload timeout: at least [`UPLOAD_TIMEOUT_FLOOR`], longer for large files.
pub fn upload_timeout(size: u64) -> Duration {
    UPLOAD_TIMEOUT_FLOOR.max(Duration::from_secs(size / UPLOAD_MIN_BYTES_PER_SEC))
}

/// Content type of an asset, by file extension.
pub fn content_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("dmg") => "application/x-apple-diskimage",
        Some("zip") => "application/zip",
        Some("exe") => "application/x-msdownload",
        Some("deb") => "application/vnd.debian.binary-package",
        Some("json") => "application/json",
        Some("yml") | Some("yaml") => "text/yaml",
        _ => "application/octet-stream",
    }
}
