//! CPU architecture types and utilities.

use std::{fmt, str::FromStr};

/// CPU architecture of a packaged application.
///
/// Tags follow the names the electron toolchain uses (`ia32`, `x64`, ...).
///
/// # Examples
///
/// ```
/// use kodegen_bundler_desktop::bundler::Arch;
///
/// let arch: Arch = "x64".parse().unwrap();
/// assert_eq!(arch, Arch::X64);
/// assert_eq!(arch.debian_arch(), "amd64");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86 (32-bit)
    Ia32,
    /// x86_64 / AMD64 (64-bit)
    X64,
    /// ARMv7 with hard-float (32-bit)
    Armv7l,
    /// AArch64 / ARM64 (64-bit)
    Arm64,
}

impl Arch {
    /// Tag used in bundle directory names and tool arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
            Arch::Armv7l => "armv7l",
            Arch::Arm64 => "arm64",
        }
    }

    /// Debian architecture name (`dpkg --print-architecture` values).
    pub fn debian_arch(&self) -> &'static str {
        match self {
            Arch::Ia32 => "i386",
            Arch::X64 => "amd64",
            Arch::Armv7l => "armhf",
            Arch::Arm64 => "arm64",
        }
    }

    /// Architecture of the running host, falling back to x64.
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::Ia32,
            "aarch64" => Arch::Arm64,
            "arm" => Arch::Armv7l,
            _ => Arch::X64,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ia32" | "x86" | "i386" => Ok(Arch::Ia32),
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "armv7l" | "armhf" => Ok(Arch::Armv7l),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!(
                "Unknown architecture: {other}. Valid architectures: ia32, x64, armv7l, arm64"
            )),
        }
    }
}
