//! Media references embedded in note text.
//!
//! Notes may embed pictures (wiki-style `![[img.png]]` or markdown-style
//! `![alt](img.png)`) and audio (`![[clip.mp3]]`). Each reference becomes a
//! [`Media`] descriptor with a normalized filename; content is loaded lazily
//! (base64) from the vault's media directory when the run needs to upload or
//! content-compare it.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "opus"];

static WIKI_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)!\[\[(?P<file>[^\[\]|]+?\.(?:png|jpg|jpeg|gif|bmp|svg|webp))(?:\|[^\]]*)?\]\]")
        .expect("wiki image pattern")
});

static MARKDOWN_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)!\[[^\]]*\]\((?P<file>[^()]+?\.(?:png|jpg|jpeg|gif|bmp|svg|webp))\)")
        .expect("markdown image pattern")
});

static AUDIO_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)!\[\[(?P<file>[^\[\]|]+?\.(?:mp3|wav|ogg|flac|m4a|opus))(?:\|[^\]]*)?\]\]")
        .expect("audio pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Picture,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    /// Not yet known to the remote store (or stored with different content).
    New,
    /// Already present in the remote store.
    Stored,
}

#[derive(Debug, Clone)]
pub struct Media {
    pub kind: MediaKind,
    /// Normalized filename: percent-decoded for markdown-style links.
    pub filename: String,
    pub state: MediaState,
    /// Base64 file content, loaded by [`Media::load_data`].
    pub data: Option<String>,
}

impl Media {
    pub fn new(kind: MediaKind, filename: String) -> Media {
        Media {
            kind,
            filename,
            state: MediaState::New,
            data: None,
        }
    }

    /// Read the file from the vault's media directory and keep it base64
    /// encoded, ready for both upload and content comparison.
    pub fn load_data(&mut self, media_dir: &Path) -> Result<()> {
        if self.data.is_some() {
            return Ok(());
        }
        let path = media_dir.join(&self.filename);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read media file: {}", path.display()))?;
        self.data = Some(BASE64.encode(bytes));
        Ok(())
    }
}

/// Scan note text for media references, in pattern order: wiki images,
/// markdown images, audio links. Duplicates are kept; later stages decide
/// what actually needs uploading.
pub fn find_media(text: &str) -> Vec<Media> {
    let mut media = Vec::new();
    for caps in WIKI_IMAGE.captures_iter(text) {
        media.push(Media::new(MediaKind::Picture, caps["file"].to_string()));
    }
    for caps in MARKDOWN_IMAGE.captures_iter(text) {
        let decoded = urlencoding::decode(&caps["file"])
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| caps["file"].to_string());
        media.push(Media::new(MediaKind::Picture, decoded));
    }
    for caps in AUDIO_LINK.captures_iter(text) {
        media.push(Media::new(MediaKind::Audio, caps["file"].to_string()));
    }
    media
}

/// Glob patterns covering all recognized image extensions, for asking the
/// store what it already has.
pub fn image_globs() -> Vec<String> {
    IMAGE_EXTENSIONS.iter().map(|e| format!("*.{}", e)).collect()
}

pub fn audio_globs() -> Vec<String> {
    AUDIO_EXTENSIONS.iter().map(|e| format!("*.{}", e)).collect()
}

pub(crate) fn wiki_image_pattern() -> &'static Regex {
    &WIKI_IMAGE
}

pub(crate) fn markdown_image_pattern() -> &'static Regex {
    &MARKDOWN_IMAGE
}

pub(crate) fn audio_pattern() -> &'static Regex {
    &AUDIO_LINK
}
