//! Shared fakes for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use kodegen_bundler_desktop::bundler::{
    AppPackager, Arch, BundleArchiver, DependencyInstaller, DistributableBuilder,
    DistributableRequest, Downloader, Error, PackRequest, Platform, ProcessCommand, ProcessOutput,
    ProcessRunner, Result, Toolchain,
};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// Subject line `openssl pkcs12` prints for the test certificate.
pub const TEST_SUBJECT: &str =
    "subject=/UID=TEAM123/CN=Developer ID Application: Acme (TEAM123)/OU=TEAM123/O=Acme/C=US\n";

/// Common name inside [`TEST_SUBJECT`].
pub const TEST_COMMON_NAME: &str = "Developer ID Application: Acme (TEAM123)";

type Responder = dyn Fn(&ProcessCommand) -> ProcessOutput + Send + Sync;

/// Records every command and answers with a configurable output.
pub struct RecordingRunner {
    commands: Mutex<Vec<ProcessCommand>>,
    responder: Box<Responder>,
}

impl RecordingRunner {
    /// Succeeds for everything; `openssl` prints [`TEST_SUBJECT`].
    pub fn succeeding() -> Self {
        Self::with_responder(|_| ProcessOutput::with_code(0))
    }

    /// `responder` decides the output; `openssl` still prints the subject on
    /// success.
    pub fn with_responder(
        responder: impl Fn(&ProcessCommand) -> ProcessOutput + Send + Sync + 'static,
    ) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Fails every command whose rendered form contains `needle`.
    pub fn failing_on(needle: &'static str, code: i32, stderr: &'static str) -> Self {
        Self::with_responder(move |command| {
            if command.to_string().contains(needle) {
                ProcessOutput {
                    code: Some(code),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                }
            } else {
                ProcessOutput::with_code(0)
            }
        })
    }

    pub fn commands(&self) -> Vec<ProcessCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Rendered commands (`program arg ...`, sensitive values masked).
    pub fn rendered(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }

    /// Rendered commands starting with `prefix`.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.rendered()
            .into_iter()
            .filter(|command| command.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        self.commands.lock().unwrap().push(command.clone());
        let mut output = (self.responder)(command);
        if command.program() == "openssl" && output.success() && output.stdout.is_empty() {
            output.stdout = TEST_SUBJECT.to_string();
        }
        Ok(output)
    }
}

/// Writes a small file for every download, failing for selected sources.
#[derive(Default)]
pub struct FakeDownloader {
    failing: HashSet<String>,
    downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeDownloader {
    pub fn failing_for(sources: &[&str]) -> Self {
        Self {
            failing: sources.iter().map(|s| s.to_string()).collect(),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, source: &str, destination: &Path) -> Result<()> {
        self.downloads
            .lock()
            .unwrap()
            .push((source.to_string(), destination.to_path_buf()));
        if self.failing.contains(source) {
            return Err(Error::GenericError(format!("cannot fetch {source}")));
        }
        tokio::fs::write(destination, b"certificate").await?;
        Ok(())
    }
}

/// Records dependency installations.
#[derive(Default)]
pub struct FakeInstaller {
    pub calls: Mutex<Vec<(PathBuf, Arch, String)>>,
}

#[async_trait]
impl DependencyInstaller for FakeInstaller {
    async fn install_app_dependencies(
        &self,
        app_dir: &Path,
        arch: Arch,
        runtime_version: &str,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((app_dir.to_path_buf(), arch, runtime_version.to_string()));
        Ok(())
    }
}

/// Writes a bundle where `electron-packager` would, optionally failing for
/// one architecture.
#[derive(Default)]
pub struct FakePackager {
    pub fail_for: Option<Arch>,
    pub packed: Mutex<Vec<(Arch, String)>>,
}

#[async_trait]
impl AppPackager for FakePackager {
    async fn pack(&self, request: &PackRequest<'_>) -> Result<()> {
        if self.fail_for == Some(request.arch) {
            return Err(Error::GenericError(format!(
                "cannot pack {}",
                request.arch
            )));
        }

        let name = &request.metadata.name;
        let dir = request
            .out_dir
            .join(format!("{}-{}-{}", name, request.platform, request.arch));
        let bundle = match request.platform {
            Platform::Darwin => dir.join(format!("{name}.app")).join("Contents"),
            _ => dir.join("resources"),
        };
        tokio::fs::create_dir_all(&bundle).await?;
        tokio::fs::write(bundle.join("app.asar"), request.build_version.as_bytes()).await?;

        self.packed
            .lock()
            .unwrap()
            .push((request.arch, request.build_version.to_string()));
        Ok(())
    }
}

/// Writes `installer-<arch>.bin` into the run directory.
#[derive(Default)]
pub struct FakeDistributable;

#[async_trait]
impl DistributableBuilder for FakeDistributable {
    async fn package_in_distributable_format(
        &self,
        request: &DistributableRequest<'_>,
    ) -> Result<PathBuf> {
        let path = request
            .out_dir
            .join(format!("installer-{}.bin", request.arch));
        tokio::fs::write(&path, format!("installer {}", request.version)).await?;
        Ok(path)
    }
}

/// Writes a placeholder archive.
#[derive(Default)]
pub struct FakeArchiver;

#[async_trait]
impl BundleArchiver for FakeArchiver {
    async fn archive(&self, _bundle_path: &Path, destination: &Path) -> Result<()> {
        tokio::fs::write(destination, b"zip").await?;
        Ok(())
    }
}

/// Fake collaborators, kept around so tests can inspect them.
pub struct FakeToolchain {
    pub installer: Arc<FakeInstaller>,
    pub packager: Arc<FakePackager>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::with_packager(FakePackager::default())
    }

    pub fn with_packager(packager: FakePackager) -> Self {
        Self {
            installer: Arc::new(FakeInstaller::default()),
            packager: Arc::new(packager),
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            installer: self.installer.clone(),
            packager: self.packager.clone(),
            distributable: Arc::new(FakeDistributable),
            archiver: Arc::new(FakeArchiver),
        }
    }
}

/// Application `package.json` with every required field.
pub fn app_package() -> Value {
    json!({
        "name": "Acme",
        "version": "1.2.0",
        "description": "Acme desktop client",
        "author": { "name": "Acme Inc", "email": "dev@acme.test" },
        "repository": "acme/desktop",
        "build": {
            "app-bundle-id": "test.acme.desktop",
            "app-category-type": "public.app-category.productivity"
        }
    })
}

/// Development `package.json` pinning the runtime.
pub fn dev_package() -> Value {
    json!({
        "private": true,
        "devDependencies": { "electron-prebuilt": "^0.37.2" }
    })
}

/// Writes a two-package project (`package.json` plus `app/package.json`).
pub fn write_two_package_project(root: &Path, app: &Value) {
    std::fs::create_dir_all(root.join("app")).unwrap();
    std::fs::write(root.join("package.json"), dev_package().to_string()).unwrap();
    std::fs::write(root.join("app/package.json"), app.to_string()).unwrap();
}

/// Writes a single-package project.
pub fn write_single_package_project(root: &Path, app: &Value) {
    let mut package = app.clone();
    package["devDependencies"] = dev_package()["devDependencies"].clone();
    std::fs::write(root.join("package.json"), package.to_string()).unwrap();
}

/// Server that accepts connections and never answers. Returns its base URL.
pub async fn stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    url
}

/// Server that announces `announced` body bytes, sends `body`, then closes the
/// connection. Returns its base URL.
pub async fn truncating_server(announced: usize, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buffer = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = socket.read(&mut buffer).await.unwrap();
            if read == 0 {
                return;
            }
            request.extend_from_slice(&buffer[..read]);
        }
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {announced}\r\n\r\n");
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    url
}
