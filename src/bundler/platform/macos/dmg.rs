//! Drag-to-install disk images and the zip side archive.
//!
//! The image contains the (already signed) `.app` bundle next to an
//! `Applications` symlink and is written as `<out>/<name>.dmg`; the
//! orchestrator gives it its versioned name afterwards.

use crate::bundler::{
    Result,
    error::{Context, Error, ErrorExt},
    platform::{BundleArchiver, DistributableBuilder, DistributableRequest},
    utils::{
        fs,
        process::{ProcessCommand, ProcessRunner, run_checked},
    },
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Builds a compressed (UDZO) disk image with `hdiutil`.
#[derive(Clone)]
pub struct DmgBuilder {
    runner: Arc<dyn ProcessRunner>,
}

impl DmgBuilder {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DistributableBuilder for DmgBuilder {
    async fn package_in_distributable_format(
        &self,
        request: &DistributableRequest<'_>,
    ) -> Result<PathBuf> {
        let name = &request.metadata.name;
        let dmg_path = request.out_dir.join(format!("{name}.dmg"));
        fs::remove_file(&dmg_path).await?;

        let staging = tempfile::Builder::new()
            .prefix(".dmg-staging")
            .tempdir_in(request.out_dir)
            .fs_context("creating DMG staging directory", request.out_dir)?;

        let app_name = request
            .bundle_path
            .file_name()
            .with_context(|| format!("Invalid app bundle path {}", request.bundle_path.display()))?;
        let staged_app = staging.path().join(app_name);

        log::debug!("Copying .app to staging: {}", staged_app.display());
        fs::copy_dir(request.bundle_path, &staged_app)
            .await
            .context("copying .app bundle to staging directory")?;

        #[cfg(unix)]
        {
            let applications_link = staging.path().join("Applications");
            std::os::unix::fs::symlink("/Applications", &applications_link)
                .fs_context("creating Applications symlink", &applications_link)?;
        }

        let volume_icon = request.resources_dir.join("icon.icns");
        if volume_icon.is_file() {
            fs::copy_file(&volume_icon, &staging.path().join(".VolumeIcon.icns")).await?;
        }

        log::info!("Creating DMG {}", dmg_path.display());
        let command = ProcessCommand::new("hdiutil")
            .args(["create", "-volname", name.as_str(), "-srcfolder"])
            .arg(staging.path().to_string_lossy())
            .args(["-ov", "-format", "UDZO"])
            .arg(dmg_path.to_string_lossy());
        run_checked(self.runner.as_ref(), &command).await?;

        // Staging is removed when `staging` drops.
        Ok(dmg_path)
    }

    fn required_tools(&self) -> &[&'static str] {
        &["hdiutil"]
    }
}

/// Writes a zip of the `.app` bundle, preserving symlinks and leaving out
/// extended attributes.
#[derive(Clone)]
pub struct ZipArchiver {
    runner: Arc<dyn ProcessRunner>,
}

impl ZipArchiver {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// `zip` invocation run from the directory containing the bundle.
    pub fn command(bundle_path: &Path, destination: &Path) -> Result<ProcessCommand> {
        let parent = bundle_path
            .parent()
            .with_context(|| format!("{} has no parent directory", bundle_path.display()))?;
        let bundle_name = bundle_path.file_name().ok_or_else(|| {
            Error::GenericError(format!("Invalid bundle path {}", bundle_path.display()))
        })?;

        Ok(ProcessCommand::new("zip")
            .arg("-ryXq")
            .arg(destination.to_string_lossy())
            .arg(bundle_name.to_string_lossy())
            .current_dir(parent))
    }
}

#[async_trait]
impl BundleArchiver for ZipArchiver {
    async fn archive(&self, bundle_path: &Path, destination: &Path) -> Result<()> {
        log::info!("Archiving {} to {}", bundle_path.display(), destination.display());
        fs::remove_file(destination).await?;
        let command = Self::command(bundle_path, destination)?;
        run_checked(self.runner.as_ref(), &command).await?;
        Ok(())
    }

    fn required_tools(&self) -> &[&'static str] {
        &["zip"]
    }
}
