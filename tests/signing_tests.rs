//! Ephemeral keychain provisioning, signing and disposal.

mod common;

use common::{FakeDownloader, RecordingRunner, TEST_COMMON_NAME};
use kodegen_bundler_desktop::bundler::{
    CodeSigningManager, DisposeMode, ProcessOutput, SigningIdentity,
    platform::macos::ROOT_CERTIFICATE_URL,
};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;

const LINK: &str = "https://certs.test/developer.p12";
const PASSWORD: &str = "s3cret-pass";

fn manager(
    runner: &Arc<RecordingRunner>,
    downloader: &Arc<FakeDownloader>,
    temp: &Path,
) -> CodeSigningManager {
    CodeSigningManager::new(runner.clone(), downloader.clone()).with_temp_dir(temp)
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn provisions_keychain_and_reads_common_name() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::succeeding());
    let downloader = Arc::new(FakeDownloader::default());

    let identity = manager(&runner, &downloader, temp.path())
        .create_identity(LINK, PASSWORD)
        .await
        .unwrap();

    assert_eq!(identity.common_name(), TEST_COMMON_NAME);
    let handle = identity.store_handle().unwrap();
    assert!(handle.starts_with("csc-") && handle.ends_with(".keychain"));

    let sources: Vec<String> = downloader.downloads().into_iter().map(|(s, _)| s).collect();
    assert!(sources.contains(&ROOT_CERTIFICATE_URL.to_string()));
    assert!(sources.contains(&LINK.to_string()));

    let security = runner.matching("security");
    assert_eq!(security.len(), 5);
    assert!(security[0].starts_with("security create-keychain -p"));
    assert!(security[0].ends_with(handle));
    assert!(security[1].starts_with("security unlock-keychain"));
    assert!(security[2].contains("set-keychain-settings -t 3600 -u"));
    assert!(security[3].contains(".cer -k"));
    assert!(security[4].contains(".p12 -k"));
    assert!(security[4].ends_with("-P ******"));

    for command in runner.rendered() {
        assert!(!command.contains(PASSWORD), "password leaked in {command}");
    }
    assert_eq!(runner.matching("openssl pkcs12").len(), 1);

    assert!(is_empty_dir(temp.path()), "downloaded certificates were kept");
}

#[tokio::test]
async fn failed_download_creates_no_keychain() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::succeeding());
    let downloader = Arc::new(FakeDownloader::failing_for(&[ROOT_CERTIFICATE_URL, LINK]));

    let error = manager(&runner, &downloader, temp.path())
        .create_identity(LINK, PASSWORD)
        .await
        .unwrap_err();

    let message = error.to_string();
    assert!(message.starts_with("Cannot download certificates: "), "{message}");
    assert!(message.contains(LINK));
    assert!(runner.rendered().is_empty());
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn failed_import_deletes_the_keychain() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::failing_on(
        "-P ******",
        1,
        "security: SecKeychainItemImport: MAC verification failed",
    ));
    let downloader = Arc::new(FakeDownloader::default());

    let error = manager(&runner, &downloader, temp.path())
        .create_identity(LINK, PASSWORD)
        .await
        .unwrap_err();

    assert!(error.to_string().contains("MAC verification failed"));
    assert!(!error.to_string().contains(PASSWORD));

    let created = runner.matching("security create-keychain");
    let deleted = runner.matching("security delete-keychain");
    assert_eq!(deleted.len(), 1);
    let handle = created[0].rsplit(' ').next().unwrap();
    assert!(deleted[0].ends_with(handle));
    assert!(runner.matching("openssl").is_empty());
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn disposal_failure_is_reported_with_the_primary_error() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::with_responder(|command| {
        let rendered = command.to_string();
        if rendered.contains("unlock-keychain") {
            ProcessOutput {
                code: Some(51),
                stdout: String::new(),
                stderr: "unlock refused".into(),
            }
        } else if rendered.contains("delete-keychain") {
            ProcessOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "keychain busy".into(),
            }
        } else {
            ProcessOutput::with_code(0)
        }
    }));
    let downloader = Arc::new(FakeDownloader::default());

    let message = manager(&runner, &downloader, temp.path())
        .create_identity(LINK, PASSWORD)
        .await
        .unwrap_err()
        .to_string();

    assert!(message.starts_with("Compound error: "), "{message}");
    assert!(message.contains("unlock refused"));
    assert!(message.contains("keychain busy"));
}

#[tokio::test]
async fn missing_subject_common_name_is_a_signing_error() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::with_responder(|command| {
        if command.program() == "openssl" {
            ProcessOutput {
                code: Some(0),
                stdout: "subject=/O=Acme/C=US\n".into(),
                stderr: String::new(),
            }
        } else {
            ProcessOutput::with_code(0)
        }
    }));
    let downloader = Arc::new(FakeDownloader::default());

    let message = manager(&runner, &downloader, temp.path())
        .create_identity(LINK, PASSWORD)
        .await
        .unwrap_err()
        .to_string();

    assert!(message.contains("common name"), "{message}");
    assert_eq!(runner.matching("security delete-keychain").len(), 1);
}

#[tokio::test]
async fn signs_with_the_ephemeral_keychain() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::succeeding());
    let downloader = Arc::new(FakeDownloader::default());
    let manager = manager(&runner, &downloader, temp.path());

    let identity = manager.create_identity(LINK, PASSWORD).await.unwrap();
    manager
        .sign(Path::new("/out/Acme.app"), &identity)
        .await
        .unwrap();

    let signed = runner.matching("codesign");
    assert_eq!(signed.len(), 1);
    assert_eq!(
        signed[0],
        format!(
            "codesign --deep --force --sign {} /out/Acme.app --keychain {}",
            TEST_COMMON_NAME,
            identity.store_handle().unwrap()
        )
    );
}

#[tokio::test]
async fn signing_failure_names_the_bundle() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::failing_on(
        "codesign",
        1,
        "no identity found",
    ));
    let downloader = Arc::new(FakeDownloader::default());

    let message = manager(&runner, &downloader, temp.path())
        .sign(Path::new("/out/Acme.app"), &SigningIdentity::explicit("Acme"))
        .await
        .unwrap_err()
        .to_string();

    assert!(message.contains("/out/Acme.app could not be signed"));
    assert!(message.contains("no identity found"));
}

#[tokio::test]
async fn lenient_disposal_tolerates_a_missing_keychain() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::failing_on(
        "delete-keychain",
        50,
        "The specified keychain could not be found.",
    ));
    let downloader = Arc::new(FakeDownloader::default());
    let manager = manager(&runner, &downloader, temp.path());

    manager
        .dispose_identity("csc-gone.keychain", DisposeMode::Lenient)
        .await
        .unwrap();
    assert!(
        manager
            .dispose_identity("csc-gone.keychain", DisposeMode::Strict)
            .await
            .is_err()
    );
}
