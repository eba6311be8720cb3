//! Main build orchestration.
//!
//! One [`Bundler::build`] call is one run:
//!
//! 1. metadata is validated once; failures here are fatal
//! 2. the run's output directory is removed
//! 3. per architecture, in order: install app dependencies, pack (on darwin
//!    concurrently with provisioning the signing identity), sign, build the
//!    installer (on darwin concurrently with the zip side archive), rename to
//!    the final artifact name, queue uploads
//! 4. cleanup tasks run, then queued uploads are awaited
//!
//! The first failing architecture stops the loop. Cleanup still runs and
//! uploads already queued are still awaited; their failures are reported
//! together with the primary one.

use super::{
    checksum,
    cleanup::CleanupRegistry,
    naming::{OutputLayout, artifact_version},
    signing::IdentitySlot,
    tool_detection,
};
use crate::bundler::{
    Arch, BuildOptions, Error, Result,
    error::{execute_finally, join_failures},
    platform::{
        DistributableRequest, PackRequest, Toolchain,
        macos::{CodeSigningManager, SigningIdentity},
    },
    utils::{
        fs,
        http::HttpDownloader,
        process::{ProcessRunner, TokioProcessRunner},
    },
};
use crate::github::{GitHubClient, ProgressSink, ReleaseAsset, ReleasePublisher, parse_repository};
use crate::metadata::{AppMetadata, AppProject};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::{sync::OnceCell, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// What an artifact is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Packed application (no installer requested)
    Bundle,
    /// Platform installer (DMG, NSIS, deb)
    Installer,
    /// Zip of the macOS `.app` bundle
    Archive,
}

/// A file or directory produced by a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Final location
    pub path: PathBuf,
    /// File name, also used as release asset name
    pub name: String,
    pub arch: Arch,
    pub kind: ArtifactKind,
    /// Size in bytes (sum of all files for directories)
    pub size: u64,
    /// Hex SHA-256
    pub checksum: String,
}

/// State that lives for exactly one run.
#[derive(Default)]
struct Run {
    cleanup: CleanupRegistry,
    identity: IdentitySlot,
    publisher: OnceCell<Arc<ReleasePublisher>>,
    uploads: Mutex<Vec<JoinHandle<Result<ReleaseAsset>>>>,
}

impl Run {
    fn queue_upload(&self, upload: JoinHandle<Result<ReleaseAsset>>) {
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(upload);
    }

    async fn finish_uploads(&self) -> Result<()> {
        let uploads = std::mem::take(&mut *self.uploads.lock().unwrap_or_else(|e| e.into_inner()));
        if uploads.is_empty() {
            return Ok(());
        }

        log::info!("Waiting for {} upload(s)", uploads.len());
        let mut errors = Vec::new();
        for result in futures::future::join_all(uploads).await {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(Error::GenericError(format!("Upload task failed: {e}"))),
            }
        }
        join_failures(errors, "Cannot upload artifacts: ")
    }
}

/// Values fixed for the whole run.
struct RunContext<'a> {
    metadata: &'a AppMetadata,
    runtime_version: &'a str,
    layout: &'a OutputLayout,
    version: &'a str,
}

/// Main build orchestrator.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_desktop::bundler::{BuildOptionsBuilder, Bundler, Platform};
/// use kodegen_bundler_desktop::metadata::AppProject;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> kodegen_bundler_desktop::bundler::Result<()> {
/// let project = AppProject::load(Path::new("."), None)?;
/// let options = BuildOptionsBuilder::new()
///     .platform(Platform::Darwin)
///     .produce_distributable(true)
///     .build();
///
/// let bundler = Bundler::with_defaults(options, project, CancellationToken::new())?;
/// for artifact in bundler.build().await? {
///     println!("{} ({} bytes) sha256 {}", artifact.name, artifact.size, artifact.checksum);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Bundler {
    options: BuildOptions,
    project: AppProject,
    toolchain: Toolchain,
    signing: Arc<CodeSigningManager>,
    progress: Option<Arc<dyn ProgressSink>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("options", &self.options)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl Bundler {
    /// Creates a bundler driving the given collaborators.
    pub fn new(
        options: BuildOptions,
        project: AppProject,
        toolchain: Toolchain,
        signing: CodeSigningManager,
    ) -> Self {
        Self {
            options,
            project,
            toolchain,
            signing: Arc::new(signing),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bundler backed by real processes and HTTP, all tied to `cancel`.
    pub fn with_defaults(
        options: BuildOptions,
        project: AppProject,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let runner: Arc<dyn ProcessRunner> =
            Arc::new(TokioProcessRunner::with_cancellation(cancel.clone()));
        let downloader = Arc::new(HttpDownloader::new()?.with_cancellation(cancel.clone()));
        let toolchain = Toolchain::for_platform(options.platform(), Arc::clone(&runner));
        let signing = CodeSigningManager::new(runner, downloader);

        Ok(Self::new(options, project, toolchain, signing).with_cancellation(cancel))
    }

    /// Receives upload progress instead of the log.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Ties release API calls to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Runs the whole pipeline and returns the final artifacts.
    pub async fn build(&self) -> Result<Vec<BuildArtifact>> {
        let metadata = self.project.validate()?;
        let runtime_version = self.project.runtime_version()?;
        let platform = self.options.platform();
        let version = artifact_version(&metadata.version, self.options.build_number());
        let layout = OutputLayout::new(self.project.dist_dir(), platform, &metadata.name);

        if self.options.produce_distributable() {
            tool_detection::ensure_available(&self.toolchain.required_tools(platform))?;
        }

        let run = Run::default();
        let context = RunContext {
            metadata: &metadata,
            runtime_version: &runtime_version,
            layout: &layout,
            version: &version,
        };

        let built = self.run_architectures(&run, &context).await;
        let cleaned = run.cleanup.run_all().await;
        let uploaded = run.finish_uploads().await;

        let artifacts = execute_finally(execute_finally(built, cleaned), uploaded)?;
        log::info!("Built {} artifact(s)", artifacts.len());
        Ok(artifacts)
    }

    async fn run_architectures(
        &self,
        run: &Run,
        context: &RunContext<'_>,
    ) -> Result<Vec<BuildArtifact>> {
        let out_dir = context.layout.out_dir();
        log::info!("Removing {}", out_dir.display());
        fs::remove_dir_all(&out_dir).await?;

        let mut artifacts = Vec::new();
        for arch in self.options.resolved_archs() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let produced = self.build_arch(run, context, arch).await?;
            if self.options.publish() {
                for artifact in &produced {
                    self.queue_upload(run, context.metadata, artifact).await?;
                }
            }
            artifacts.extend(produced);
        }
        Ok(artifacts)
    }

    async fn build_arch(
        &self,
        run: &Run,
        context: &RunContext<'_>,
        arch: Arch,
    ) -> Result<Vec<BuildArtifact>> {
        let platform = self.options.platform();
        let metadata = context.metadata;
        log::info!(
            "Building {} {} for {}-{}",
            metadata.name,
            context.version,
            platform,
            arch
        );

        if self.project.is_two_package_layout() {
            self.toolchain
                .installer
                .install_app_dependencies(self.project.app_dir(), arch, context.runtime_version)
                .await?;
        } else {
            log::info!(
                "Skipping app dependencies installation because dev and app dependencies are not separated"
            );
        }

        let packager_out_dir = context.layout.packager_out_dir();
        let resources_dir = self.project.resources_dir();
        let request = PackRequest {
            app_dir: self.project.app_dir(),
            out_dir: &packager_out_dir,
            resources_dir: &resources_dir,
            platform,
            arch,
            metadata,
            runtime_version: context.runtime_version,
            build_version: context.version,
        };
        let pack = self.toolchain.packager.pack(&request);

        match self.signing_material() {
            Some((link, password)) if !run.identity.is_provisioned() => {
                let (packed, provisioned) = tokio::join!(
                    pack,
                    run.identity
                        .provision(&self.signing, &run.cleanup, link, password),
                );
                execute_finally(packed, provisioned.map(|_| ()))?;
            }
            _ => pack.await?,
        }

        let bundle_path = context.layout.bundle_path(arch);
        self.sign_bundle(run, &bundle_path).await?;

        if !self.options.produce_distributable() {
            return Ok(vec![
                artifact(bundle_path, arch, ArtifactKind::Bundle).await?,
            ]);
        }

        let out_dir = context.layout.out_dir();
        let request = DistributableRequest {
            arch,
            bundle_path: &bundle_path,
            out_dir: &out_dir,
            resources_dir: &resources_dir,
            metadata,
            version: context.version,
        };
        let installer = self
            .toolchain
            .distributable
            .package_in_distributable_format(&request);
        let installer_path = context.layout.installer_path(arch, context.version);

        if platform.is_mac() {
            let archive_path = context.layout.mac_archive_path(context.version);
            let (installer, archived) = tokio::join!(
                installer,
                self.toolchain.archiver.archive(&bundle_path, &archive_path),
            );
            let produced = execute_finally(installer, archived)?;
            Ok(vec![
                finalize(&produced, installer_path, arch).await?,
                artifact(archive_path, arch, ArtifactKind::Archive).await?,
            ])
        } else {
            let produced = installer.await?;
            Ok(vec![finalize(&produced, installer_path, arch).await?])
        }
    }

    /// Signing material, only on darwin.
    fn signing_material(&self) -> Option<(&str, &str)> {
        if self.options.platform().is_mac() {
            self.options.signing_material()
        } else {
            None
        }
    }

    async fn sign_bundle(&self, run: &Run, bundle_path: &Path) -> Result<()> {
        if !self.options.platform().is_mac() {
            if self.options.signing_material().is_some()
                || self.options.explicit_signing_identity().is_some()
            {
                log::info!(
                    "Code signing is only supported for darwin; {} is not signed",
                    bundle_path.display()
                );
            }
            return Ok(());
        }

        let identity = run.identity.get().or_else(|| {
            self.options
                .explicit_signing_identity()
                .map(|name| Arc::new(SigningIdentity::explicit(name)))
        });
        match identity {
            Some(identity) => self.signing.sign(bundle_path, &identity).await,
            None => {
                log::warn!(
                    "No signing identity configured (CSC_LINK or CSC_NAME); {} is not signed",
                    bundle_path.display()
                );
                Ok(())
            }
        }
    }

    async fn queue_upload(
        &self,
        run: &Run,
        metadata: &AppMetadata,
        artifact: &BuildArtifact,
    ) -> Result<()> {
        let publisher = run
            .publisher
            .get_or_try_init(|| async { self.create_publisher(metadata).map(Arc::new) })
            .await?;

        let publisher = Arc::clone(publisher);
        let path = artifact.path.clone();
        log::debug!("Queued upload of {}", artifact.name);
        run.queue_upload(tokio::spawn(async move { publisher.upload(&path).await }));
        Ok(())
    }

    fn create_publisher(&self, metadata: &AppMetadata) -> Result<ReleasePublisher> {
        let settings = self.options.publish_settings();
        let reference = settings
            .repository
            .as_deref()
            .or(metadata.repository.as_deref())
            .ok_or_else(|| Error::missing_field("repository", self.project.app_package_file()))?;
        let (owner, repo) = parse_repository(reference).ok_or_else(|| {
            Error::publish(format!("'{reference}' is not a GitHub repository"), None)
        })?;

        let client = GitHubClient::new(&settings.api_url, settings.token.clone())?
            .with_cancellation(self.cancel.clone());
        let publisher = ReleasePublisher::new(client, owner, repo, &metadata.version)?;
        Ok(match &self.progress {
            Some(progress) => publisher.with_progress(Arc::clone(progress)),
            None => publisher,
        })
    }
}

/// Moves a builder's output to its final name and measures it.
async fn finalize(produced: &Path, final_path: PathBuf, arch: Arch) -> Result<BuildArtifact> {
    if produced != final_path {
        log::debug!(
            "Renaming {} to {}",
            produced.display(),
            final_path.display()
        );
        fs::rename(produced, &final_path).await?;
    }
    artifact(final_path, arch, ArtifactKind::Installer).await
}

async fn artifact(path: PathBuf, arch: Arch, kind: ArtifactKind) -> Result<BuildArtifact> {
    let (size, checksum) = checksum::measure(&path).await?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::info!("{} ({} bytes, sha256 {})", path.display(), size, checksum);

    Ok(BuildArtifact {
        path,
        name,
        arch,
        kind,
        size,
        checksum,
    })
}
