//! Configuration structures for build runs.
//!
//! Architectures, target platforms and the options a build run is driven by,
//! with a builder for constructing them.

mod arch;
mod builder;
mod options;
mod platform;

pub use arch::Arch;
pub use builder::BuildOptionsBuilder;
pub use options::{BuildOptions, DEFAULT_GITHUB_API_URL, PublishSettings};
pub use platform::Platform;
