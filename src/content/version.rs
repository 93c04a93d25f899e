//! Content version hashing using BLAKE3 over a sorted directory walk.

use crate::error::StorageError;
use crate::types::ContentVersion;
use blake3::Hasher;
use std::path::Path;
use walkdir::WalkDir;

/// Directory names never considered part of authored content.
const IGNORED: &[&str] = &[".git", "node_modules"];

/// Compute the content version of a course root.
///
/// version = hash(for each file sorted by relative path:
///   "file" || path_len || path || content_hash)
///
/// Same files with the same bytes always produce the same version.
pub fn compute_content_version(root: &Path) -> Result<ContentVersion, StorageError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !IGNORED.contains(&name))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to walk content directory: {}", e),
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        files.push((relative, entry.path().to_path_buf()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Hasher::new();
    hasher.update(&(files.len() as u64).to_be_bytes());
    for (relative, path) in files {
        let bytes = std::fs::read(&path)?;
        hasher.update(b"file");
        hasher.update(&(relative.len() as u64).to_be_bytes());
        hasher.update(relative.as_bytes());
        hasher.update(blake3::hash(&bytes).as_bytes());
    }
    Ok(*hasher.finalize().as_bytes())
}
