//! Target platform of a build.

use super::Arch;
use std::{fmt, str::FromStr};

/// Operating system the application is packaged for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Platform {
    /// macOS (`.app` bundle, DMG)
    Darwin,
    /// Windows (NSIS installer)
    Win32,
    /// Linux (Debian package)
    Linux,
}

impl Platform {
    /// Platform of the running host.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Darwin
        } else if cfg!(target_os = "windows") {
            Platform::Win32
        } else {
            Platform::Linux
        }
    }

    /// Node-style platform tag (`darwin`, `win32`, `linux`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Darwin => "darwin",
            Platform::Win32 => "win32",
            Platform::Linux => "linux",
        }
    }

    /// Architectures built when none are requested explicitly.
    pub fn default_archs(&self) -> Vec<Arch> {
        match self {
            Platform::Darwin => vec![Arch::X64],
            Platform::Win32 | Platform::Linux => vec![Arch::Ia32, Arch::X64],
        }
    }

    /// `true` for macOS, the only platform with bundle signing.
    pub fn is_mac(&self) -> bool {
        matches!(self, Platform::Darwin)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "darwin" | "mac" | "macos" | "osx" => Ok(Platform::Darwin),
            "win32" | "win" | "windows" => Ok(Platform::Win32),
            "linux" => Ok(Platform::Linux),
            other => Err(format!(
                "Invalid platform: {other}. Valid platforms: darwin, win32, linux"
            )),
        }
    }
}
