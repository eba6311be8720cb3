//! Build options driving a [`Bundler`](crate::bundler::Bundler) run.

use super::{Arch, Platform};

/// Default GitHub REST endpoint.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Release host settings used when publishing.
#[derive(Clone, Debug)]
pub struct PublishSettings {
    /// Personal access token (`GH_TOKEN`).
    pub token: Option<String>,

    /// Repository as `owner/repo` or a GitHub URL.
    ///
    /// Default: None (taken from the application `package.json`)
    pub repository: Option<String>,

    /// Base URL of the release API.
    ///
    /// Default: [`DEFAULT_GITHUB_API_URL`]
    pub api_url: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            token: None,
            repository: None,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

/// Options for one build run.
///
/// Constructed via [`BuildOptionsBuilder`](super::BuildOptionsBuilder).
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Requested architectures. `None` means the platform default set.
    architectures: Option<Vec<Arch>>,

    /// Target platform.
    platform: Platform,

    /// Produce installers (DMG, NSIS, deb) after packing.
    produce_distributable: bool,

    /// Upload produced installers to a draft release.
    publish: bool,

    /// Release host settings.
    publish_settings: PublishSettings,

    /// Location of the signing certificate (`CSC_LINK`).
    signing_link: Option<String>,

    /// Password of the signing certificate (`CSC_KEY_PASSWORD`).
    signing_password: Option<String>,

    /// Identity already present in a keychain (`CSC_NAME`).
    explicit_signing_identity: Option<String>,

    /// CI build number appended to artifact versions.
    build_number: Option<String>,
}

impl BuildOptions {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        architectures: Option<Vec<Arch>>,
        platform: Platform,
        produce_distributable: bool,
        publish: bool,
        publish_settings: PublishSettings,
        signing_link: Option<String>,
        signing_password: Option<String>,
        explicit_signing_identity: Option<String>,
        build_number: Option<String>,
    ) -> Self {
        Self {
            architectures,
            platform,
            produce_distributable,
            publish,
            publish_settings,
            signing_link,
            signing_password,
            explicit_signing_identity,
            build_number,
        }
    }

    /// Architectures to build, in order.
    ///
    /// macOS always builds x64 only. Duplicates are dropped, keeping the first
    /// occurrence.
    pub fn resolved_archs(&self) -> Vec<Arch> {
        if self.platform.is_mac() {
            return vec![Arch::X64];
        }

        match &self.architectures {
            Some(archs) if !archs.is_empty() => {
                let mut resolved = Vec::with_capacity(archs.len());
                for arch in archs {
                    if !resolved.contains(arch) {
                        resolved.push(*arch);
                    }
                }
                resolved
            }
            _ => self.platform.default_archs(),
        }
    }

    /// Returns the target platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Whether installers are produced. Always true when publishing.
    pub fn produce_distributable(&self) -> bool {
        self.produce_distributable || self.publish
    }

    /// Whether artifacts are uploaded.
    pub fn publish(&self) -> bool {
        self.publish
    }

    /// Returns the release host settings.
    pub fn publish_settings(&self) -> &PublishSettings {
        &self.publish_settings
    }

    /// Signing link and password, when both are configured.
    pub fn signing_material(&self) -> Option<(&str, &str)> {
        match (&self.signing_link, &self.signing_password) {
            (Some(link), Some(password)) if !link.is_empty() => {
                Some((link.as_str(), password.as_str()))
            }
            _ => None,
        }
    }

    /// Returns the explicitly configured signing identity.
    pub fn explicit_signing_identity(&self) -> Option<&str> {
        self.explicit_signing_identity
            .as_deref()
            .filter(|identity| !identity.is_empty())
    }

    /// Returns the CI build number.
    pub fn build_number(&self) -> Option<&str> {
        self.build_number.as_deref().filter(|n| !n.is_empty())
    }
}
