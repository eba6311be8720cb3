//! Draft release publishing against a mock GitHub API.

mod common;

use common::stalled_server;
use kodegen_bundler_desktop::bundler::Error;
use kodegen_bundler_desktop::github::{
    GitHubClient, ProgressSink, PublisherState, ReleasePublisher,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;

const TAG_PATH: &str = "/repos/acme/desktop/releases/tags/v1.2.0";
const RELEASES_PATH: &str = "/repos/acme/desktop/releases";
const ASSETS_PATH: &str = "/uploads/repos/acme/desktop/releases/42/assets";

fn release_json(server: &ServerGuard, draft: bool) -> String {
    json!({
        "id": 42,
        "tag_name": "v1.2.0",
        "draft": draft,
        "upload_url": format!("{}{}{{?name,label}}", server.url(), ASSETS_PATH),
    })
    .to_string()
}

fn publisher(server: &ServerGuard) -> ReleasePublisher {
    let client = GitHubClient::new(&server.url(), Some("gh-token".into()))
        .unwrap()
        .with_timeout(Duration::from_secs(10));
    ReleasePublisher::new(client, "acme", "desktop", "1.2.0").unwrap()
}

fn artifact(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<(String, u64, u64)>>,
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, asset: &str, transferred: u64, total: u64) {
        self.events
            .lock()
            .unwrap()
            .push((asset.to_string(), transferred, total));
    }
}

#[test]
fn missing_token_fails_before_any_request() {
    let client = GitHubClient::new("https://api.github.com", None).unwrap();
    let error = ReleasePublisher::new(client, "acme", "desktop", "1.2.0").unwrap_err();
    assert_eq!(
        error.to_string(),
        "GitHub Personal Access Token is not specified"
    );
}

#[tokio::test]
async fn uploads_into_existing_draft() {
    let mut server = Server::new_async().await;
    let lookup = server
        .mock("GET", TAG_PATH)
        .match_header("authorization", "token gh-token")
        .match_header("accept", "application/vnd.github.v3+json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(release_json(&server, true))
        .expect(1)
        .create_async()
        .await;
    let upload = server
        .mock("POST", ASSETS_PATH)
        .match_query(Matcher::UrlEncoded("name".into(), "Acme-1.2.0.dmg".into()))
        .match_header("content-type", "application/x-apple-diskimage")
        .match_header("content-length", "9")
        .match_body("dmg bytes")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 7, "name": "Acme-1.2.0.dmg", "size": 9}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let progress = Arc::new(RecordingProgress::default());
    let publisher = publisher(&server).with_progress(progress.clone());
    assert_eq!(publisher.state(), PublisherState::Uninitialized);

    let asset = publisher
        .upload(&artifact(&dir, "Acme-1.2.0.dmg", b"dmg bytes"))
        .await
        .unwrap();

    assert_eq!(asset.id, 7);
    assert_eq!(asset.name, "Acme-1.2.0.dmg");
    assert!(matches!(publisher.state(), PublisherState::Ready(ref r) if r.id == 42));
    let events = progress.events.lock().unwrap();
    assert_eq!(events.last(), Some(&("Acme-1.2.0.dmg".to_string(), 9, 9)));
    lookup.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn missing_release_is_created_once_as_draft() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", TAG_PATH)
        .with_status(404)
        .create_async()
        .await;
    let create = server
        .mock("POST", RELEASES_PATH)
        .match_body(Matcher::Json(json!({"tag_name": "v1.2.0", "draft": true})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(release_json(&server, true))
        .expect(1)
        .create_async()
        .await;
    let upload = server
        .mock("POST", ASSETS_PATH)
        .match_query(Matcher::Any)
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 8, "name": "asset", "size": 3}"#)
        .expect(2)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let publisher = publisher(&server);
    let first = artifact(&dir, "AcmeSetup-1.2.0.exe", b"exe");
    let second = artifact(&dir, "AcmeSetup-1.2.0-x64.exe", b"x64");

    let (a, b) = tokio::join!(publisher.upload(&first), publisher.upload(&second));
    a.unwrap();
    b.unwrap();

    create.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn published_release_is_not_modified() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", TAG_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(release_json(&server, false))
        .create_async()
        .await;
    let upload = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let error = publisher(&server)
        .upload(&artifact(&dir, "Acme-1.2.0.dmg", b"dmg"))
        .await
        .unwrap_err();

    assert!(error.to_string().contains("already published"), "{error}");
    upload.assert_async().await;
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", TAG_PATH)
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "Bad credentials"}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let error = publisher(&server)
        .upload(&artifact(&dir, "Acme-1.2.0.dmg", b"dmg"))
        .await
        .unwrap_err();

    assert!(matches!(error.root(), Error::Auth { .. }), "{error:?}");
    assert_eq!(error.status_code(), Some(401));
    let message = error.to_string();
    assert!(message.starts_with(
        "Unauthorized, please ensure that GitHub Personal Access Token is correct."
    ));
    assert!(message.contains("Bad credentials"));
}

#[tokio::test]
async fn failed_lookup_is_shared_by_all_uploads() {
    let mut server = Server::new_async().await;
    let lookup = server
        .mock("GET", TAG_PATH)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "boom"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let publisher = publisher(&server);
    let first = artifact(&dir, "a.deb", b"a");
    let second = artifact(&dir, "b.deb", b"b");

    let (a, b) = tokio::join!(publisher.upload(&first), publisher.upload(&second));
    let (a, b) = (a.unwrap_err(), b.unwrap_err());

    assert_eq!(a.status_code(), Some(500));
    assert_eq!(a.to_string(), b.to_string());
    assert!(a.to_string().contains("boom"));
    assert!(matches!(publisher.state(), PublisherState::Failed(_)));
    lookup.assert_async().await;
}

#[tokio::test]
async fn rejected_upload_carries_the_response() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", TAG_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(release_json(&server, true))
        .create_async()
        .await;
    let _upload = server
        .mock("POST", ASSETS_PATH)
        .match_query(Matcher::Any)
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "Validation Failed"}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let error = publisher(&server)
        .upload(&artifact(&dir, "Acme-1.2.0-amd64.deb", b"deb"))
        .await
        .unwrap_err();

    assert_eq!(error.status_code(), Some(422));
    let message = error.to_string();
    assert!(message.starts_with("Cannot upload Acme-1.2.0-amd64.deb: 422"), "{message}");
    assert!(message.contains("Validation Failed"));
}

#[tokio::test]
async fn lists_and_deletes_the_release() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", TAG_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(release_json(&server, true))
        .create_async()
        .await;
    let _assets = server
        .mock("GET", "/repos/acme/desktop/releases/42/assets")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 1, "name": "Acme-1.2.0.dmg", "size": 10}]"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/repos/acme/desktop/releases/42")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let publisher = publisher(&server);
    // Nothing resolved yet, so nothing to delete.
    publisher.delete_release().await.unwrap();

    let assets = publisher.list_assets().await.unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].name, "Acme-1.2.0.dmg");

    publisher.delete_release().await.unwrap();
    delete.assert_async().await;
}

#[tokio::test]
async fn silent_api_host_times_out() {
    let url = stalled_server().await;
    let client = GitHubClient::new(&url, Some("gh-token".into()))
        .unwrap()
        .with_timeout(Duration::from_millis(200));

    let error = client
        .get::<serde_json::Value>("/repos/acme/desktop/releases/tags/v1.2.0")
        .await
        .unwrap_err();

    assert!(error.is_timeout(), "{error:?}");
    assert!(!error.is_not_found());
    assert_eq!(error.status_code(), None);
}
