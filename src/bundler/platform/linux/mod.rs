//! Linux: Debian packages.

mod debian;

pub use debian::DebBuilder;
