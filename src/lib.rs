//! Desktop application packaging library.
//!
//! Packs an application for each requested architecture, signs macOS bundles
//! with a throwaway keychain identity, builds installers (DMG, NSIS, deb) and
//! publishes them to a draft GitHub release.
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;
pub mod github;
pub mod metadata;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
