//! Vault scanning and source files.
//!
//! Walks the vault directory for markdown files, honoring directory and glob
//! exclusions, parses YAML front matter into per-file metadata, and selects
//! the files whose content hash differs from the previous run's cache. Each
//! scanned file carries an append-only edit log; [`SourceFile::flush`] applies
//! it and writes the file back only when there is something to apply.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::VaultConfig;
use crate::hashes;
use crate::rewrite::{self, Edit};

/// Front-matter-derived metadata for one file.
#[derive(Debug, Clone, Default)]
pub struct FileMetadata {
    pub tags: Vec<String>,
    /// Optional per-file deck override.
    pub deck: Option<String>,
}

#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub content: String,
    pub metadata: FileMetadata,
    edits: Vec<Edit>,
}

impl SourceFile {
    #[cfg(test)]
    pub(crate) fn for_tests(
        path: PathBuf,
        relative_path: String,
        content: String,
        metadata: FileMetadata,
    ) -> SourceFile {
        SourceFile {
            path,
            relative_path,
            content,
            metadata,
            edits: Vec::new(),
        }
    }

    /// File name without the `.md` extension, used for back-links.
    pub fn file_stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.relative_path)
    }

    pub fn queue_edit(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Apply pending edits and write the file back. A file with no pending
    /// edits is never rewritten.
    pub fn flush(&mut self) -> Result<bool> {
        if self.edits.is_empty() {
            return Ok(false);
        }
        self.content = rewrite::apply(&self.content, &self.edits);
        self.edits.clear();
        std::fs::write(&self.path, &self.content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(true)
    }
}

/// Scan the vault for markdown files, in deterministic (relative path) order.
pub fn scan(config: &VaultConfig) -> Result<Vec<SourceFile>> {
    let exclude_set = build_globset(&config.exclude_globs)?;
    let root = &config.root;

    let exclude_dirs = config.exclude_dirs.clone();
    let exclude_dotted = config.exclude_dotted_dirs;
    let walker = WalkDir::new(root).into_iter().filter_entry(move |entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if exclude_dotted && name.starts_with('.') {
            return false;
        }
        !exclude_dirs.iter().any(|d| d.as_str() == name.as_ref())
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let metadata = parse_front_matter(&content);

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative_path: rel_str,
            content,
            metadata,
            edits: Vec::new(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Indices of files whose content hash differs from the cached one.
pub fn changed_files(files: &[SourceFile], cache: &HashMap<String, String>) -> Vec<usize> {
    files
        .iter()
        .enumerate()
        .filter(|(_, f)| cache.get(&f.relative_path) != Some(&hashes::content_hash(&f.content)))
        .map(|(i, _)| i)
        .collect()
}

/// Hashes of the current (possibly rewritten) content of every scanned file.
pub fn current_hashes(files: &[SourceFile]) -> HashMap<String, String> {
    files
        .iter()
        .map(|f| (f.relative_path.clone(), hashes::content_hash(&f.content)))
        .collect()
}

#[derive(Debug, Deserialize, Default)]
struct RawFrontMatter {
    #[serde(default)]
    tags: Option<TagsSpec>,
    #[serde(default)]
    deck: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsSpec {
    One(String),
    Many(Vec<String>),
}

/// Parse the leading `---` YAML block, if any. Unparseable front matter is
/// treated as absent rather than failing the scan.
fn parse_front_matter(content: &str) -> FileMetadata {
    let Some(rest) = content.strip_prefix("---\n") else {
        return FileMetadata::default();
    };
    let Some(end) = rest.find("\n---") else {
        return FileMetadata::default();
    };
    match serde_yaml::from_str::<RawFrontMatter>(&rest[..end]) {
        Ok(raw) => FileMetadata {
            tags: match raw.tags {
                Some(TagsSpec::One(tag)) => vec![tag],
                Some(TagsSpec::Many(tags)) => tags,
                None => Vec::new(),
            },
            deck: raw.deck,
        },
        Err(_) => FileMetadata::default(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}
