//! Shared helpers: process execution, file download, filesystem operations.

pub mod fs;
pub mod http;
pub mod process;
