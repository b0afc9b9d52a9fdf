//! TOML configuration parsing.
//!
//! All runtime settings come from a single TOML file: the AnkiConnect
//! endpoint, vault paths, scan exclusions, and the note-type table mapping
//! each enabled variant to its match patterns and field recipe.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub anki: AnkiConfig,
    pub vault: VaultConfig,
    #[serde(default)]
    pub note_types: BTreeMap<String, NoteTypeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnkiConfig {
    #[serde(default = "default_anki_url")]
    pub url: String,
    #[serde(default = "default_deck_name")]
    pub deck_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub media_comparison: MediaComparison,
    /// Append an obsidian back-link to the leading text field of built-in
    /// variants.
    #[serde(default)]
    pub append_source_link: bool,
}

/// How stored media is compared against local media when deciding whether a
/// referenced file still needs uploading. Decided once at config load; the
/// store client and the reconciler both key off this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaComparison {
    /// Filename membership only.
    #[default]
    Name,
    /// Filename membership plus byte-identical content.
    Content,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    pub media_dir: PathBuf,
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_true")]
    pub exclude_dotted_dirs: bool,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Where the per-vault hash cache lives. Defaults to `<root>/.obsanki`.
    pub hash_cache_dir: Option<PathBuf>,
}

/// One enabled note variant. `fields` is validated and compiled by the
/// registry in [`crate::notetype`]; built-in variants may omit it.
#[derive(Debug, Deserialize, Clone)]
pub struct NoteTypeConfig {
    /// Anki model name override; defaults per variant.
    pub model: Option<String>,
    pub patterns: Vec<String>,
    pub fields: Option<toml::Value>,
}

fn default_anki_url() -> String {
    "http://127.0.0.1:8765".to_string()
}
fn default_deck_name() -> String {
    "Default".to_string()
}
fn default_true() -> bool {
    true
}

impl VaultConfig {
    /// Name of the vault, taken from its root directory name.
    pub fn vault_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "vault".to_string())
    }

    pub fn hash_cache_dir(&self) -> PathBuf {
        self.hash_cache_dir
            .clone()
            .unwrap_or_else(|| self.root.join(".obsanki"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: Config = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    // Relative vault paths are resolved against the config file's directory.
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.vault.root = resolve(base, &config.vault.root);
    config.vault.media_dir = resolve(base, &config.vault.media_dir);
    if let Some(dir) = config.vault.hash_cache_dir.take() {
        config.vault.hash_cache_dir = Some(resolve(base, &dir));
    }

    if !config.vault.root.is_dir() {
        bail!("Vault root does not exist: {}", config.vault.root.display());
    }
    if !config.vault.media_dir.is_dir() {
        bail!(
            "Vault media directory does not exist: {}",
            config.vault.media_dir.display()
        );
    }

    Ok(config)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
