//! `install-app-deps`: rebuild the app's native modules for the runtime.

use crate::bundler::{
    Arch, DependencyInstaller, TokioProcessRunner, platform::electron::NpmDependencyInstaller,
};
use crate::cli::InstallAppDepsArgs;
use crate::error::Result;
use crate::metadata::AppProject;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Installs the application's dependencies against the runtime headers.
pub async fn execute(args: &InstallAppDepsArgs, cancel: CancellationToken) -> Result<i32> {
    let project = AppProject::load(&args.project_dir, args.app_dir.as_deref())?;
    let runtime_version = project.runtime_version()?;
    let arch = args.arch.unwrap_or_else(Arch::host);

    let installer =
        NpmDependencyInstaller::new(Arc::new(TokioProcessRunner::with_cancellation(cancel)));
    installer
        .install_app_dependencies(project.app_dir(), arch, &runtime_version)
        .await?;

    println!(
        "Installed dependencies of {} for {} (electron {})",
        project.app_dir().display(),
        arch,
        runtime_version
    );
    Ok(0)
}
