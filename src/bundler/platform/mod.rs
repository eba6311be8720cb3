//! External collaborators of the build pipeline.
//!
//! The orchestrator never shells out directly: dependency installation,
//! packing, installer generation and the macOS side archive all go through
//! the traits below. Default implementations drive the usual external tools
//! through a [`ProcessRunner`].
//!
//! | Step | Default | Tool |
//! |------|---------|------|
//! | dependencies | [`electron::NpmDependencyInstaller`] | `npm` |
//! | pack | [`electron::ElectronPackager`] | `electron-packager` |
//! | darwin installer | [`macos::DmgBuilder`] | `hdiutil` |
//! | darwin side archive | [`macos::ZipArchiver`] | `zip` |
//! | win32 installer | [`windows::NsisBuilder`] | `makensis` |
//! | linux installer | [`linux::DebBuilder`] | `dpkg-deb` |

pub mod electron;
pub mod linux;
pub mod macos;
pub mod windows;

use crate::bundler::{
    Arch, Platform, Result,
    utils::process::ProcessRunner,
};
use crate::metadata::AppMetadata;
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Installs the application's own native dependencies for one architecture.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Installs dependencies in `app_dir`; fails loudly on a non-zero exit.
    async fn install_app_dependencies(
        &self,
        app_dir: &Path,
        arch: Arch,
        runtime_version: &str,
    ) -> Result<()>;
}

/// Everything the packager needs to produce an unsigned bundle.
#[derive(Debug)]
pub struct PackRequest<'a> {
    /// Directory containing the application `package.json`
    pub app_dir: &'a Path,
    /// Directory the packager writes into
    pub out_dir: &'a Path,
    /// Directory holding icons (`build/icon.*`)
    pub resources_dir: &'a Path,
    /// Target platform
    pub platform: Platform,
    /// Target architecture
    pub arch: Arch,
    /// Validated application metadata
    pub metadata: &'a AppMetadata,
    /// Runtime (electron) version to package against
    pub runtime_version: &'a str,
    /// Application version including the CI build number, if any
    pub build_version: &'a str,
}

/// Produces an unsigned application bundle.
#[async_trait]
pub trait AppPackager: Send + Sync {
    /// Packs the application; the bundle lands at the path computed by the
    /// orchestrator from `{out_dir, name, platform, arch}`.
    async fn pack(&self, request: &PackRequest<'_>) -> Result<()>;
}

/// Input of a distributable builder.
#[derive(Debug)]
pub struct DistributableRequest<'a> {
    /// Target architecture
    pub arch: Arch,
    /// Bundle produced by the packager
    pub bundle_path: &'a Path,
    /// Per-run output directory
    pub out_dir: &'a Path,
    /// Directory holding icons (`build/icon.*`)
    pub resources_dir: &'a Path,
    /// Validated application metadata
    pub metadata: &'a AppMetadata,
    /// Version string used for artifact naming (may carry a build number)
    pub version: &'a str,
}

/// Produces the installer for one architecture.
#[async_trait]
pub trait DistributableBuilder: Send + Sync {
    /// Builds the installer and returns where it was written.
    async fn package_in_distributable_format(
        &self,
        request: &DistributableRequest<'_>,
    ) -> Result<PathBuf>;

    /// External tools that must be on `PATH` before building.
    fn required_tools(&self) -> &[&'static str] {
        &[]
    }
}

/// Archives a bundle next to the installer (macOS zip).
#[async_trait]
pub trait BundleArchiver: Send + Sync {
    /// Archives `bundle_path` into `destination`.
    async fn archive(&self, bundle_path: &Path, destination: &Path) -> Result<()>;

    /// External tools that must be on `PATH` before archiving.
    fn required_tools(&self) -> &[&'static str] {
        &[]
    }
}

/// The set of collaborators a [`Bundler`](crate::bundler::Bundler) drives.
#[derive(Clone)]
pub struct Toolchain {
    /// Dependency installer
    pub installer: Arc<dyn DependencyInstaller>,
    /// Application packager
    pub packager: Arc<dyn AppPackager>,
    /// Installer builder for the target platform
    pub distributable: Arc<dyn DistributableBuilder>,
    /// Side archive step, only used on darwin
    pub archiver: Arc<dyn BundleArchiver>,
}

impl Toolchain {
    /// Default process-backed toolchain for `platform`.
    pub fn for_platform(platform: Platform, runner: Arc<dyn ProcessRunner>) -> Self {
        let distributable: Arc<dyn DistributableBuilder> = match platform {
            Platform::Darwin => Arc::new(macos::DmgBuilder::new(runner.clone())),
            Platform::Win32 => Arc::new(windows::NsisBuilder::new(runner.clone())),
            Platform::Linux => Arc::new(linux::DebBuilder::new(runner.clone())),
        };

        Self {
            installer: Arc::new(electron::NpmDependencyInstaller::new(runner.clone())),
            packager: Arc::new(electron::ElectronPackager::new(runner.clone())),
            distributable,
            archiver: Arc::new(macos::ZipArchiver::new(runner)),
        }
    }

    /// Tools the distributable steps need on `platform`.
    pub fn required_tools(&self, platform: Platform) -> Vec<&'static str> {
        let mut tools = self.distributable.required_tools().to_vec();
        if platform.is_mac() {
            tools.extend_from_slice(self.archiver.required_tools());
        }
        tools
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}
