//! Electron toolchain: native dependency installation and packing.

use super::{AppPackager, DependencyInstaller, PackRequest};
use crate::bundler::{
    Arch, Platform, Result,
    error::Context,
    utils::process::{ProcessCommand, ProcessRunner, run_checked},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{path::Path, sync::Arc};

/// Mirror serving the runtime headers native modules compile against.
pub const ELECTRON_HEADERS_URL: &str = "https://electronjs.org/headers";

/// Default packager executable.
pub const ELECTRON_PACKAGER: &str = "electron-packager";

/// Options the packager receives from the pipeline itself; `build` entries
/// with these names are ignored.
const RESERVED_OPTIONS: &[&str] = &[
    "platform",
    "arch",
    "out",
    "electron-version",
    "app-version",
    "build-version",
    "icon",
    "asar",
    "overwrite",
];

fn npm_program() -> &'static str {
    if cfg!(windows) { "npm.cmd" } else { "npm" }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Runs `npm install` against the runtime's headers instead of Node's.
#[derive(Clone)]
pub struct NpmDependencyInstaller {
    runner: Arc<dyn ProcessRunner>,
}

impl NpmDependencyInstaller {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// The install command for `arch`, exposed for inspection.
    pub fn command(app_dir: &Path, arch: Arch, runtime_version: &str) -> Result<ProcessCommand> {
        let gyp_home = dirs::home_dir()
            .context("Cannot determine the home directory for the native module header cache")?
            .join(".electron-gyp");

        Ok(ProcessCommand::new(npm_program())
            .arg("install")
            .current_dir(app_dir)
            .env("npm_config_disturl", ELECTRON_HEADERS_URL)
            .env("npm_config_target", runtime_version)
            .env("npm_config_runtime", "electron")
            .env("npm_config_arch", arch.as_str())
            .env("HOME", path_arg(&gyp_home)))
    }
}

#[async_trait]
impl DependencyInstaller for NpmDependencyInstaller {
    async fn install_app_dependencies(
        &self,
        app_dir: &Path,
        arch: Arch,
        runtime_version: &str,
    ) -> Result<()> {
        log::info!(
            "Installing app dependencies for {} (electron {}) in {}",
            arch,
            runtime_version,
            app_dir.display()
        );
        let command = Self::command(app_dir, arch, runtime_version)?;
        run_checked(self.runner.as_ref(), &command).await?;
        Ok(())
    }
}

/// Drives the `electron-packager` CLI.
///
/// Entries of the `build` block become `--key=value` flags; nested objects
/// are flattened with dots (`--version-string.CompanyName=...`).
#[derive(Clone)]
pub struct ElectronPackager {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl ElectronPackager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            program: ELECTRON_PACKAGER.to_string(),
        }
    }

    /// Uses another packager executable (e.g. a project-local binary).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The pack command for `request`.
    pub fn command(&self, request: &PackRequest<'_>) -> ProcessCommand {
        let metadata = request.metadata;
        let mut command = ProcessCommand::new(&self.program).args([
            path_arg(request.app_dir),
            metadata.name.clone(),
            format!("--platform={}", request.platform),
            format!("--arch={}", request.arch),
            format!("--out={}", path_arg(request.out_dir)),
            format!("--electron-version={}", request.runtime_version),
            format!("--app-version={}", metadata.version),
            format!("--build-version={}", request.build_version),
            format!("--icon={}", path_arg(&request.resources_dir.join("icon"))),
            "--asar".to_string(),
            "--overwrite".to_string(),
        ]);

        if request.platform == Platform::Win32 {
            for (key, value) in [
                ("CompanyName", metadata.author.as_str()),
                ("FileDescription", metadata.description.as_str()),
                ("ProductName", metadata.name.as_str()),
                ("InternalName", metadata.name.as_str()),
            ] {
                command = command.arg(format!("--win32metadata.{key}={value}"));
            }
        }

        let mut flags = Vec::new();
        for (key, value) in &metadata.build {
            if RESERVED_OPTIONS.contains(&key.as_str()) {
                log::debug!("Ignoring build option '{}' managed by the pipeline", key);
                continue;
            }
            flatten_option(key, value, &mut flags);
        }
        command.args(flags)
    }
}

fn flatten_option(key: &str, value: &Value, flags: &mut Vec<String>) {
    match value {
        Value::Object(entries) => {
            for (sub, value) in entries {
                flatten_option(&format!("{key}.{sub}"), value, flags);
            }
        }
        Value::String(text) => flags.push(format!("--{key}={text}")),
        Value::Bool(true) => flags.push(format!("--{key}")),
        Value::Bool(false) => flags.push(format!("--no-{key}")),
        Value::Number(number) => flags.push(format!("--{key}={number}")),
        Value::Null | Value::Array(_) => {
            log::debug!("Skipping build option '{}' with no flag form", key);
        }
    }
}

#[async_trait]
impl AppPackager for ElectronPackager {
    async fn pack(&self, request: &PackRequest<'_>) -> Result<()> {
        log::info!(
            "Packaging {} for {}-{}",
            request.metadata.name,
            request.platform,
            request.arch
        );
        let command = self.command(request);
        run_checked(self.runner.as_ref(), &command).await?;
        Ok(())
    }
}
