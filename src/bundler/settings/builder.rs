//! Builder for constructing BuildOptions.

use super::{Arch, BuildOptions, Platform, PublishSettings};

/// Builder for constructing [`BuildOptions`].
///
/// # Examples
///
/// ```
/// use kodegen_bundler_desktop::bundler::{Arch, BuildOptionsBuilder, Platform};
///
/// let options = BuildOptionsBuilder::new()
///     .platform(Platform::Win32)
///     .architectures(vec![Arch::Ia32, Arch::X64])
///     .produce_distributable(true)
///     .build();
///
/// assert_eq!(options.resolved_archs(), vec![Arch::Ia32, Arch::X64]);
/// ```
#[derive(Default)]
pub struct BuildOptionsBuilder {
    architectures: Option<Vec<Arch>>,
    platform: Option<Platform>,
    produce_distributable: bool,
    publish: bool,
    publish_settings: PublishSettings,
    signing_link: Option<String>,
    signing_password: Option<String>,
    explicit_signing_identity: Option<String>,
    build_number: Option<String>,
}

impl BuildOptionsBuilder {
    /// Creates a new options builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the architectures to build.
    ///
    /// Default: platform default set (ignored on darwin, which builds x64)
    pub fn architectures(mut self, archs: Vec<Arch>) -> Self {
        self.architectures = Some(archs);
        self
    }

    /// Sets the target platform.
    ///
    /// Default: host platform
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Produce installers after packing.
    pub fn produce_distributable(mut self, dist: bool) -> Self {
        self.produce_distributable = dist;
        self
    }

    /// Upload installers to a draft GitHub release. Implies distributables.
    pub fn publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    /// Sets the release host settings.
    pub fn publish_settings(mut self, settings: PublishSettings) -> Self {
        self.publish_settings = settings;
        self
    }

    /// Sets the signing certificate location and its password.
    pub fn signing_material(mut self, link: impl Into<String>, password: impl Into<String>) -> Self {
        self.signing_link = Some(link.into());
        self.signing_password = Some(password.into());
        self
    }

    /// Sets an identity already available in the default keychain.
    pub fn explicit_signing_identity(mut self, identity: impl Into<String>) -> Self {
        self.explicit_signing_identity = Some(identity.into());
        self
    }

    /// Sets the CI build number appended to artifact versions.
    pub fn build_number(mut self, number: impl Into<String>) -> Self {
        self.build_number = Some(number.into());
        self
    }

    /// Builds the options.
    pub fn build(self) -> BuildOptions {
        BuildOptions::new(
            self.architectures,
            self.platform.unwrap_or_else(Platform::current),
            self.produce_distributable,
            self.publish,
            self.publish_settings,
            self.signing_link,
            self.signing_password,
            self.explicit_signing_identity,
            self.build_number,
        )
    }
}
