//! Field values and the text transforms that produce them.
//!
//! Raw capture text is rewritten so Anki can render it: wiki and markdown
//! image links become `<img>` tags, audio wikilinks become `[sound:...]`
//! references, and the leading field of the built-in variants gets an
//! obsidian back-link appended so the card links back to its source note.

use crate::media;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Capture-group field without provenance: media rewriting only.
pub fn capture_field(name: &str, raw: &str) -> Field {
    Field::new(name, rewrite_media_refs(raw))
}

/// Leading text field of a built-in variant: media rewriting plus an
/// appended back-link into the vault.
pub fn text_field_with_source(name: &str, raw: &str, vault_name: &str, file_stem: &str) -> Field {
    let mut value = rewrite_media_refs(raw);
    value.push_str("<br><br>");
    value.push_str(&obsidian_link(vault_name, file_stem));
    Field::new(name, value)
}

/// Context field: the file's relative path followed by the chain of
/// enclosing headings, shallowest first.
pub fn context_field(name: &str, relative_path: &str, hierarchy: &[String]) -> Field {
    let mut parts = vec![relative_path.to_string()];
    parts.extend(hierarchy.iter().cloned());
    Field::new(name, parts.join(" > "))
}

/// Back-link field: an anchor opening the source note in Obsidian.
pub fn link_field(name: &str, vault_name: &str, file_stem: &str) -> Field {
    Field::new(name, obsidian_link(vault_name, file_stem))
}

/// Rewrite embedded media references into Anki's syntax. Pictures become
/// `<img src="...">`; audio becomes `[sound:...]`. Markdown-style image
/// targets are percent-decoded, matching the filenames the media uploader
/// stores.
pub fn rewrite_media_refs(text: &str) -> String {
    let text = media::wiki_image_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            format!(r#"<img src="{}">"#, &caps["file"])
        })
        .into_owned();
    let text = media::markdown_image_pattern()
        .replace_all(&text, |caps: &regex::Captures| {
            let decoded = urlencoding::decode(&caps["file"])
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| caps["file"].to_string());
            format!(r#"<img src="{}">"#, decoded)
        })
        .into_owned();
    media::audio_pattern()
        .replace_all(&text, |caps: &regex::Captures| {
            format!("[sound:{}]", &caps["file"])
        })
        .into_owned()
}

fn obsidian_link(vault_name: &str, file_stem: &str) -> String {
    format!(
        r#"<a href="obsidian://open?vault={}&file={}">{}</a>"#,
        urlencoding::encode(vault_name),
        urlencoding::encode(file_stem),
        file_stem
    )
}
