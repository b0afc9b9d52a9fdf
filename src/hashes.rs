//! Per-vault hash cache.
//!
//! A JSON object mapping relative file path to the SHA-256 hex of its
//! content, read at run start to decide which files changed and fully
//! rewritten at run end with hashes of every scanned file.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn cache_path(dir: &Path, vault_name: &str) -> PathBuf {
    dir.join(format!(".{}_file_hashes.json", vault_name))
}

/// Load the cache; a missing file means a first run and yields an empty map.
pub fn load(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read hash cache: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Malformed hash cache: {}", path.display()))
}

/// Rewrite the cache, creating its directory on demand.
pub fn store(path: &Path, hashes: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache dir: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(hashes)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write hash cache: {}", path.display()))?;
    Ok(())
}
