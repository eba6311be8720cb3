//! GitHub releases: REST client and draft release publisher.

mod client;
mod publisher;

pub use client::{API_TIMEOUT, GITHUB_MEDIA_TYPE, GitHubClient, RequestBody};
pub use publisher::{
    LogProgress, ProgressSink, PublisherState, ReleaseAsset, ReleasePublisher, ReleaseRecord,
    UPLOAD_TIMEOUT_FLOOR, content_type, upload_timeout, upload_url,
};

/// Extracts `(owner, repo)` from the usual ways a repository is written:
///
/// - `owner/repo` and `github:owner/repo`
/// - `https://github.com/owner/repo(.git)` and `git+https://...`
/// - `git@github.com:owner/repo.git`
///
/// ```
/// use kodegen_bundler_desktop::github::parse_repository;
///
/// assert_eq!(
///     parse_repository("git+https://github.com/acme/app.git"),
///     Some(("acme".to_string(), "app".to_string()))
/// );
/// ```
pub fn parse_repository(reference: &str) -> Option<(String, String)> {
    let reference = reference.trim();
    let path = if let Some(rest) = reference.strip_prefix("github:") {
        rest
    } else if let Some(rest) = reference.strip_prefix("git@github.com:") {
        rest
    } else if let Some(index) = reference.find("github.com/") {
        &reference[index + "github.com/".len()..]
    } else if reference.contains("://") {
        return None;
    } else {
        reference
    };

    let mut parts = path
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() && !reference.contains("github.com") {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
