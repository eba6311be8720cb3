//! Output directory layout and artifact names.
//!
//! ```text
//! dist/
//! ├── <name>-darwin-x64/          darwin run directory (packager writes to dist/)
//! │   ├── <name>.app
//! │   ├── <name>-<version>.dmg
//! │   └── <name>-<version>-mac.zip
//! ├── win/                        win32 run directory
//! │   ├── <name>-win32-ia32/
//! │   ├── <name>Setup-<version>.exe
//! │   └── <name>Setup-<version>-<arch>.exe   every arch except ia32
//! └── linux/                      linux run directory
//!     ├── <name>-linux-x64/
//!     └── <name>-<version>-amd64.deb
//! ```

use crate::bundler::{Arch, Platform};
use std::path::PathBuf;

/// Version used in artifact names: the application version, with the CI
/// build number appended as `.<n>` when there is one.
pub fn artifact_version(version: &str, build_number: Option<&str>) -> String {
    match build_number.map(str::trim).filter(|n| !n.is_empty()) {
        Some(number) => format!("{version}.{number}"),
        None => version.to_string(),
    }
}

/// Where one run writes for a given platform and application name.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    dist_dir: PathBuf,
    platform: Platform,
    name: String,
}

impl OutputLayout {
    pub fn new(dist_dir: impl Into<PathBuf>, platform: Platform, name: impl Into<String>) -> Self {
        Self {
            dist_dir: dist_dir.into(),
            platform,
            name: name.into(),
        }
    }

    /// Directory removed at the start of the run and holding every artifact.
    pub fn out_dir(&self) -> PathBuf {
        match self.platform {
            Platform::Darwin => self.dist_dir.join(format!("{}-darwin-x64", self.name)),
            Platform::Win32 => self.dist_dir.join("win"),
            Platform::Linux => self.dist_dir.join("linux"),
        }
    }

    /// Directory handed to the packager; it creates `<name>-<platform>-<arch>`
    /// below it.
    pub fn packager_out_dir(&self) -> PathBuf {
        match self.platform {
            Platform::Darwin => self.dist_dir.clone(),
            Platform::Win32 | Platform::Linux => self.out_dir(),
        }
    }

    /// Path of the packed bundle for `arch`.
    pub fn bundle_path(&self, arch: Arch) -> PathBuf {
        match self.platform {
            Platform::Darwin => self.out_dir().join(format!("{}.app", self.name)),
            platform => self
                .out_dir()
                .join(format!("{}-{}-{}", self.name, platform, arch)),
        }
    }

    /// Final installer path for `arch`.
    pub fn installer_path(&self, arch: Arch, version: &str) -> PathBuf {
        let file_name = match self.platform {
            Platform::Darwin => format!("{}-{}.dmg", self.name, version),
            Platform::Win32 => {
                let suffix = if arch == Arch::Ia32 {
                    String::new()
                } else {
                    format!("-{arch}")
                };
                format!("{}Setup-{}{}.exe", self.name, version, suffix)
            }
            Platform::Linux => format!("{}-{}-{}.deb", self.name, version, arch.debian_arch()),
        };
        self.out_dir().join(file_name)
    }

    /// Side archive of the `.app` bundle (darwin only).
    pub fn mac_archive_path(&self, version: &str) -> PathBuf {
        self.out_dir()
            .join(format!("{}-{}-mac.zip", self.name, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn build_number_is_an_optional_suffix() {
        assert_eq!(artifact_version("1.2.0", None), "1.2.0");
        assert_eq!(artifact_version("1.2.0", Some("57")), "1.2.0.57");
        assert_eq!(artifact_version("1.2.0", Some(" ")), "1.2.0");
    }

    #[test]
    fn windows_installers_are_distinct_per_arch() {
        let layout = OutputLayout::new("/p/dist", Platform::Win32, "Acme");

        assert_eq!(
            layout.installer_path(Arch::Ia32, "1.0.0"),
            Path::new("/p/dist/win/AcmeSetup-1.0.0.exe")
        );
        assert_eq!(
            layout.installer_path(Arch::X64, "1.0.0"),
            Path::new("/p/dist/win/AcmeSetup-1.0.0-x64.exe")
        );
        assert_eq!(
            layout.installer_path(Arch::Arm64, "1.0.0"),
            Path::new("/p/dist/win/AcmeSetup-1.0.0-arm64.exe")
        );
        assert_eq!(
            layout.installer_path(Arch::Armv7l, "1.0.0"),
            Path::new("/p/dist/win/AcmeSetup-1.0.0-armv7l.exe")
        );
        assert_eq!(
            layout.bundle_path(Arch::Ia32),
            Path::new("/p/dist/win/Acme-win32-ia32")
        );
    }

    #[test]
    fn darwin_layout() {
        let layout = OutputLayout::new("/p/dist", Platform::Darwin, "Acme");

        assert_eq!(layout.packager_out_dir(), Path::new("/p/dist"));
        assert_eq!(
            layout.bundle_path(Arch::X64),
            Path::new("/p/dist/Acme-darwin-x64/Acme.app")
        );
        assert_eq!(
            layout.installer_path(Arch::X64, "1.0.0.7"),
            Path::new("/p/dist/Acme-darwin-x64/Acme-1.0.0.7.dmg")
        );
        assert_eq!(
            layout.mac_archive_path("1.0.0.7"),
            Path::new("/p/dist/Acme-darwin-x64/Acme-1.0.0.7-mac.zip")
        );
    }
}
