//! External tool availability checking.
//!
//! Lookups are cached per process so a multi-architecture run does not
//! search `PATH` once per architecture.

use crate::bundler::{Error, Result};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

static FOUND_TOOLS: LazyLock<Mutex<HashMap<&'static str, Option<PathBuf>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Location of `tool` on `PATH`, if any.
pub fn locate(tool: &'static str) -> Option<PathBuf> {
    let mut cache = FOUND_TOOLS.lock().unwrap_or_else(|e| e.into_inner());
    cache
        .entry(tool)
        .or_insert_with(|| match which::which(tool) {
            Ok(path) => {
                log::debug!("Found {} at: {}", tool, path.display());
                Some(path)
            }
            Err(e) => {
                log::debug!("{} not found in PATH: {}", tool, e);
                None
            }
        })
        .clone()
}

/// Fails with the names of every tool in `tools` that is not installed.
pub fn ensure_available(tools: &[&'static str]) -> Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| locate(tool).is_none())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::GenericError(format!(
            "Required tools not found in PATH: {}",
            missing.join(", ")
        )))
    }
}
