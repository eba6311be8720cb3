//! Artifact size and SHA-256 digest.
//!
//! Artifacts are either single files (installers, archives) or directory
//! trees (an unpacked `.app` bundle when no installer was requested). Trees
//! are hashed file by file in sorted path order, mixing in each relative
//! path, so the digest is stable across runs.

use crate::{
    bail,
    bundler::{Result, error::ErrorExt},
};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BUFFER_SIZE: usize = 64 * 1024;

/// Size in bytes and hex SHA-256 of the artifact at `path`.
pub async fn measure(path: &Path) -> Result<(u64, String)> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading artifact metadata", path)?;

    if metadata.is_file() {
        let mut hasher = Sha256::new();
        let size = hash_file(path, &mut hasher).await?;
        Ok((size, format!("{:x}", hasher.finalize())))
    } else if metadata.is_dir() {
        measure_tree(path).await
    } else {
        bail!("Artifact is neither file nor directory: {}", path.display())
    }
}

async fn measure_tree(root: &Path) -> Result<(u64, String)> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut hasher = Sha256::new();
    let mut size = 0;
    for file in files {
        hasher.update(file.strip_prefix(root)?.to_string_lossy().as_bytes());
        size += hash_file(&file, &mut hasher).await?;
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

async fn hash_file(path: &Path, hasher: &mut Sha256) -> Result<u64> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_digest_matches_known_value() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("artifact.zip");
        std::fs::write(&path, b"abc").unwrap();

        let (size, checksum) = measure(&path).await.unwrap();
        assert_eq!(size, 3);
        assert_eq!(
            checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn tree_digest_is_stable_and_sums_sizes() {
        let temp = tempfile::tempdir().unwrap();
        let bundle = temp.path().join("App.app");
        std::fs::create_dir_all(bundle.join("Contents/MacOS")).unwrap();
        std::fs::write(bundle.join("Contents/Info.plist"), b"<plist/>").unwrap();
        std::fs::write(bundle.join("Contents/MacOS/App"), b"\x7fELF").unwrap();

        let first = measure(&bundle).await.unwrap();
        let second = measure(&bundle).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.0, 12);
    }
}
