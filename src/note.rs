//! Note extraction and classification.
//!
//! Runs a note type's patterns over a file's text and turns every match into
//! a [`Note`]: lifecycle state read off the embedded id marker, fields built
//! per the type's recipe, media references collected from the matched text,
//! and the offsets the rewriter needs to insert or remove id markers later.
//!
//! Pattern convention: the optional trailing id marker is captured with
//! `(?:\n(?P<del>DELETE)?<!--ID: (?P<id>\d+)-->)?`. A `del` group that
//! matched means the user flagged the note for deletion.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;

use crate::field::{self, Field};
use crate::media::{self, Media};
use crate::notetype::{FieldSpec, NoteType, NoteVariant};
use crate::vault::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    /// No embedded id; the note has never been pushed to the store.
    New,
    /// Carries an id, but the store has not yet confirmed it exists.
    Unknown,
    /// Id confirmed present in the store.
    Existing,
    /// User flagged the note for deletion.
    MarkedForDeletion,
}

/// One matched note occurrence inside one file.
#[derive(Debug, Clone)]
pub struct Note {
    pub state: NoteState,
    pub id: Option<i64>,
    /// Index of the owning file in the scan's file list.
    pub file_index: usize,
    /// Byte span of the match in the original file text.
    pub span: Range<usize>,
    pub original_text: String,
    pub model: String,
    pub deck: String,
    pub tags: Vec<String>,
    pub fields: Vec<Field>,
    pub media: Vec<Media>,
    /// Where a freshly assigned id marker gets inserted: the match end,
    /// backed off past trailing newlines so insertion never opens a blank
    /// line.
    pub id_offset: usize,
    /// Byte span of the deletion marker, when the note is flagged.
    pub marker_span: Option<Range<usize>>,
}

/// Per-file inputs to extraction that don't live on the note type.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    pub vault_name: &'a str,
    pub deck: &'a str,
    pub tags: &'a [String],
    pub append_source_link: bool,
}

/// Extract every match of `note_type` from `file`. Matches are collected per
/// pattern in textual order; a file with zero matches yields an empty vec.
pub fn extract(
    file: &SourceFile,
    file_index: usize,
    note_type: &NoteType,
    opts: ExtractOptions<'_>,
) -> Result<Vec<Note>> {
    let text = &file.content;
    let mut notes = Vec::new();

    for pattern in &note_type.patterns {
        for caps in pattern.captures_iter(text) {
            let m = caps.get(0).expect("group 0 always participates");

            let (state, id) = classify(&caps).with_context(|| {
                format!(
                    "Malformed id marker in {} at byte {}",
                    file.relative_path,
                    m.start()
                )
            })?;

            let id_offset = trim_trailing_newlines(text, m.end());
            let marker_span = caps.name("del").map(|del| {
                let mut start = del.start();
                if text.as_bytes().get(start.wrapping_sub(1)) == Some(&b'\n') {
                    start -= 1;
                }
                start..trim_trailing_newlines(text, m.end())
            });

            let fields = build_fields(file, note_type, &caps, m.start(), opts);

            notes.push(Note {
                state,
                id,
                file_index,
                span: m.range(),
                original_text: m.as_str().to_string(),
                model: note_type.model.clone(),
                deck: opts.deck.to_string(),
                tags: opts.tags.to_vec(),
                fields,
                media: media::find_media(m.as_str()),
                id_offset,
                marker_span,
            });
        }
    }

    Ok(notes)
}

fn classify(caps: &regex::Captures<'_>) -> Result<(NoteState, Option<i64>)> {
    let id = caps
        .name("id")
        .map(|m| {
            m.as_str()
                .parse::<i64>()
                .with_context(|| format!("id '{}' is not a valid note id", m.as_str()))
        })
        .transpose()?;

    match (caps.name("del").is_some(), id) {
        (true, Some(id)) => Ok((NoteState::MarkedForDeletion, Some(id))),
        (true, None) => bail!("deletion marker without an id"),
        (false, Some(id)) => Ok((NoteState::Unknown, Some(id))),
        (false, None) => Ok((NoteState::New, None)),
    }
}

fn build_fields(
    file: &SourceFile,
    note_type: &NoteType,
    caps: &regex::Captures<'_>,
    match_start: usize,
    opts: ExtractOptions<'_>,
) -> Vec<Field> {
    let built_in = note_type.variant != NoteVariant::Obsidian;
    note_type
        .recipe
        .iter()
        .enumerate()
        .map(|(i, (name, spec))| match spec {
            FieldSpec::Capture(idx) => {
                let raw = caps.get(*idx).map(|m| m.as_str()).unwrap_or_default();
                if built_in && i == 0 && opts.append_source_link {
                    field::text_field_with_source(name, raw, opts.vault_name, file.file_stem())
                } else {
                    field::capture_field(name, raw)
                }
            }
            FieldSpec::Context => {
                let hierarchy = heading_hierarchy(&file.content, match_start);
                field::context_field(name, &file.relative_path, &hierarchy)
            }
            FieldSpec::Link => field::link_field(name, opts.vault_name, file.file_stem()),
        })
        .collect()
}

fn trim_trailing_newlines(text: &str, match_end: usize) -> usize {
    let mut end = match_end;
    while end > 0 && text.as_bytes()[end - 1] == b'\n' {
        end -= 1;
    }
    end
}

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.*)").expect("heading pattern"));

/// Chain of enclosing ATX headings at `position`, shallowest first. A heading
/// at some level closes out everything strictly deeper, so a prior sibling's
/// subsections never leak into the hierarchy.
pub fn heading_hierarchy(text: &str, position: usize) -> Vec<String> {
    let mut levels: BTreeMap<usize, String> = BTreeMap::new();
    for caps in HEADING.captures_iter(text) {
        let m = caps.get(0).expect("group 0");
        if m.start() > position {
            break;
        }
        let level = caps[1].len();
        levels.insert(level, caps[2].trim().to_string());
        levels.split_off(&(level + 1));
    }
    levels.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoteTypeConfig;
    use crate::notetype;
    use crate::vault::FileMetadata;
    use std::path::PathBuf;

    const BASIC_PATTERN: &str =
        r"Q: ([^\n]+?) A: ([^\n<]+?)(?:\n(?P<del>DELETE)?<!--ID: (?P<id>\d+)-->)?(?:\n|$)";

    fn basic_type() -> NoteType {
        notetype::build_for_tests(
            NoteVariant::Basic,
            &NoteTypeConfig {
                model: None,
                patterns: vec![BASIC_PATTERN.to_string()],
                fields: None,
            },
        )
    }

    fn source_file(content: &str) -> SourceFile {
        SourceFile::for_tests(
            PathBuf::from("/vault/math notes.md"),
            "math notes.md".to_string(),
            content.to_string(),
            FileMetadata::default(),
        )
    }

    fn opts() -> ExtractOptions<'static> {
        ExtractOptions {
            vault_name: "vault",
            deck: "Default",
            tags: &[],
            append_source_link: false,
        }
    }

    #[test]
    fn no_matches_yields_empty() {
        let file = source_file("just prose, no notes\n");
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn new_note_extracted_with_fields() {
        let file = source_file("Q: 2+2? A: 4");
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        assert_eq!(notes.len(), 1);
        let note = &notes[0];
        assert_eq!(note.state, NoteState::New);
        assert_eq!(note.id, None);
        assert_eq!(note.fields.len(), 2);
        assert_eq!(note.fields[0], Field::new("Front", "2+2?"));
        assert_eq!(note.fields[1], Field::new("Back", "4"));
        assert_eq!(note.id_offset, 12);
        assert!(note.marker_span.is_none());
    }

    #[test]
    fn id_offset_backs_off_trailing_newlines() {
        let file = source_file("Q: 2+2? A: 4\n");
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        assert_eq!(notes[0].id_offset, 12);
    }

    #[test]
    fn existing_id_classified_unknown() {
        let file = source_file("Q: 2+2? A: 4\n<!--ID: 501-->\n");
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        assert_eq!(notes[0].state, NoteState::Unknown);
        assert_eq!(notes[0].id, Some(501));
    }

    #[test]
    fn deletion_marker_classified_and_spanned() {
        let text = "Q: old A: stale\nDELETE<!--ID: 42-->\n";
        let file = source_file(text);
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        let note = &notes[0];
        assert_eq!(note.state, NoteState::MarkedForDeletion);
        assert_eq!(note.id, Some(42));
        // Span covers the preceding newline through the marker end.
        let span = note.marker_span.clone().unwrap();
        assert_eq!(&text[span], "\nDELETE<!--ID: 42-->");
    }

    #[test]
    fn overflowing_id_is_a_parse_error() {
        let file = source_file("Q: x A: y\n<!--ID: 99999999999999999999999-->\n");
        let err = extract(&file, 0, &basic_type(), opts()).unwrap_err();
        assert!(format!("{:#}", err).contains("not a valid note id"));
    }

    #[test]
    fn multiple_notes_in_match_order() {
        let file = source_file("Q: a A: 1\n\nQ: b A: 2\n<!--ID: 7-->\n\nQ: c A: 3\n");
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].state, NoteState::New);
        assert_eq!(notes[1].id, Some(7));
        assert_eq!(notes[2].state, NoteState::New);
        assert!(notes[0].span.start < notes[1].span.start);
        assert!(notes[1].span.start < notes[2].span.start);
    }

    #[test]
    fn media_collected_from_match() {
        let file = source_file("Q: what is this ![[cat.png]] A: a cat ![[meow.mp3]]");
        let notes = extract(&file, 0, &basic_type(), opts()).unwrap();
        assert_eq!(notes[0].media.len(), 2);
        assert_eq!(notes[0].media[0].filename, "cat.png");
        assert_eq!(notes[0].media[1].filename, "meow.mp3");
        // Fields carry the rewritten references.
        assert_eq!(
            notes[0].fields[0].value,
            r#"what is this <img src="cat.png">"#
        );
        assert_eq!(notes[0].fields[1].value, "a cat [sound:meow.mp3]");
    }

    #[test]
    fn source_link_appended_when_enabled() {
        let file = source_file("Q: 2+2? A: 4");
        let notes = extract(
            &file,
            0,
            &basic_type(),
            ExtractOptions {
                append_source_link: true,
                ..opts()
            },
        )
        .unwrap();
        assert!(notes[0].fields[0].value.starts_with("2+2?<br><br><a href="));
        assert_eq!(notes[0].fields[1].value, "4");
    }

    #[test]
    fn hierarchy_tracks_enclosing_headings() {
        let text = "# Math\n## Algebra\nsome text here\n";
        let hierarchy = heading_hierarchy(text, text.len() - 1);
        assert_eq!(hierarchy, vec!["Math", "Algebra"]);
    }

    #[test]
    fn hierarchy_truncates_deeper_siblings() {
        // Levels [1, 2, 3, 2] before the query position: the second level-2
        // heading closes out the level-3 entry.
        let text = "# A\n## B\n### C\n## D\nquery point\n";
        let hierarchy = heading_hierarchy(text, text.len() - 1);
        assert_eq!(hierarchy, vec!["A", "D"]);
    }

    #[test]
    fn hierarchy_ignores_headings_after_position() {
        let text = "# A\nnote here\n# Z\n";
        let hierarchy = heading_hierarchy(text, 5);
        assert_eq!(hierarchy, vec!["A"]);
    }

    #[test]
    fn hierarchy_empty_without_headings() {
        assert!(heading_hierarchy("no headings at all", 5).is_empty());
    }
}
