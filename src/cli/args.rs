//! Command line argument parsing and validation.

use crate::bundler::{Arch, Platform};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CI variables consulted, in order, for a build number.
pub const BUILD_NUMBER_VARIABLES: &[&str] = &[
    "BUILD_NUMBER",
    "TRAVIS_BUILD_NUMBER",
    "APPVEYOR_BUILD_NUMBER",
    "CIRCLE_BUILD_NUM",
];

/// Desktop application packager
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_desktop",
    version,
    about = "Package, sign and publish desktop applications",
    long_about = "Packs an application for each requested architecture, signs macOS bundles \
with an ephemeral keychain, builds installers (DMG, NSIS, deb) and uploads them to a \
draft GitHub release.

Usage:
  kodegen_bundler_desktop build --platform darwin --dist
  kodegen_bundler_desktop build --platform win32 --arch all --publish
  kodegen_bundler_desktop install-app-deps --arch x64"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pack, sign, build installers and optionally publish
    Build(BuildArgs),

    /// Install the app's native dependencies against the runtime headers
    InstallAppDeps(InstallAppDepsArgs),
}

/// Arguments of `build`
#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Project directory (holds the development package.json)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// Application directory relative to the project (default: app/ when present)
    #[arg(long, value_name = "DIR")]
    pub app_dir: Option<PathBuf>,

    /// Target platform: darwin, win32, linux (default: host)
    #[arg(long, value_name = "PLATFORM", value_parser = parse_platform)]
    pub platform: Option<Platform>,

    /// Architectures: "all" or a comma separated list (ia32, x64, armv7l, arm64)
    #[arg(long, value_name = "ARCH", default_value = "all")]
    pub arch: String,

    /// Build installers after packing
    #[arg(short = 'd', long)]
    pub dist: bool,

    /// Upload installers to a draft GitHub release (implies --dist)
    #[arg(long)]
    pub publish: bool,

    /// Signing identity already present in a keychain
    #[arg(long, env = "CSC_NAME", value_name = "NAME")]
    pub sign: Option<String>,

    /// Signing certificate (.p12): URL, file path or base64 data URL
    #[arg(long, env = "CSC_LINK", hide_env_values = true, value_name = "LINK")]
    pub csc_link: Option<String>,

    /// Password of the signing certificate
    #[arg(long, env = "CSC_KEY_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub csc_key_password: Option<String>,

    /// GitHub personal access token
    #[arg(long, env = "GH_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub github_token: Option<String>,

    /// GitHub repository (owner/repo or URL); default: package.json "repository"
    #[arg(long, value_name = "REPO")]
    pub repository: Option<String>,

    /// Base URL of the GitHub API
    #[arg(long, value_name = "URL", default_value = crate::bundler::settings::DEFAULT_GITHUB_API_URL)]
    pub github_api_url: String,

    /// Build number appended to artifact versions (default: from CI variables)
    #[arg(long, value_name = "N")]
    pub build_number: Option<String>,
}

/// Arguments of `install-app-deps`
#[derive(clap::Args, Debug)]
pub struct InstallAppDepsArgs {
    /// Project directory (holds the development package.json)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// Application directory relative to the project (default: app/ when present)
    #[arg(long, value_name = "DIR")]
    pub app_dir: Option<PathBuf>,

    /// Architecture (default: host)
    #[arg(long, value_name = "ARCH", value_parser = parse_arch)]
    pub arch: Option<Arch>,
}

fn parse_platform(value: &str) -> Result<Platform, String> {
    value.parse()
}

fn parse_arch(value: &str) -> Result<Arch, String> {
    value.parse()
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl BuildArgs {
    /// Requested architectures; `None` for "all".
    pub fn architectures(&self) -> Result<Option<Vec<Arch>>, String> {
        if self.arch.trim().eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        self.arch
            .split(',')
            .map(str::trim)
            .filter(|arch| !arch.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Arch>, String>>()
            .map(Some)
    }

    /// Explicit build number, else the first CI variable that is set.
    pub fn resolved_build_number(&self) -> Option<String> {
        self.build_number.clone().or_else(|| {
            BUILD_NUMBER_VARIABLES
                .iter()
                .find_map(|name| std::env::var(name).ok())
                .filter(|value| !value.trim().is_empty())
        })
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        let archs = self.architectures()?;
        if archs.as_ref().is_some_and(Vec::is_empty) {
            return Err("--arch must name at least one architecture".to_string());
        }
        if self.csc_link.is_some() && self.csc_key_password.is_none() {
            return Err("CSC_LINK is set but CSC_KEY_PASSWORD is missing".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BuildArgs {
        let mut argv = vec!["kodegen_bundler_desktop", "build"];
        argv.extend_from_slice(args);
        match Args::try_parse_from(argv).unwrap().command {
            Command::Build(build) => build,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn arch_list_is_parsed() {
        let args = parse(&["--arch", "ia32, x64"]);
        assert_eq!(args.architectures().unwrap(), Some(vec![Arch::Ia32, Arch::X64]));

        let args = parse(&["--arch", "all"]);
        assert_eq!(args.architectures().unwrap(), None);
    }

    #[test]
    fn unknown_arch_is_rejected() {
        let args = parse(&["--arch", "sparc"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn platform_is_parsed() {
        let args = parse(&["--platform", "win32", "--publish"]);
        assert_eq!(args.platform, Some(Platform::Win32));
        assert!(args.publish);
    }
}
