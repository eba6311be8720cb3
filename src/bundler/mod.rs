//! Desktop application bundling.
//!
//! Packs an application for one or more architectures, signs macOS bundles
//! with an ephemeral keychain identity, produces distributable installers and
//! hands the resulting artifacts to the release publisher.
//!
//! # Module Organization
//!
//! - [`builder`] - [`Bundler`] orchestrator, cleanup registry, artifact naming
//! - [`platform`] - external collaborators (packager, installers, code signing)
//! - [`settings`] - build options, architectures and platforms
//! - [`utils`] - process runner, file download, filesystem helpers
//! - [`error`] - error taxonomy and failure combinators

pub mod builder;
pub mod error;
pub mod platform;
pub mod settings;
pub mod utils;

pub use builder::{ArtifactKind, BuildArtifact, Bundler, CleanupRegistry};
pub use error::{Error, HttpError, Result};
pub use platform::{
    AppPackager, BundleArchiver, DependencyInstaller, DistributableBuilder, DistributableRequest, PackRequest,
    Toolchain,
    macos::{CodeSigningManager, DisposeMode, SigningIdentity},
};
pub use settings::{Arch, BuildOptions, BuildOptionsBuilder, Platform, PublishSettings};
pub use utils::{
    http::{Downloader, HttpDownloader},
    process::{ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner},
};
