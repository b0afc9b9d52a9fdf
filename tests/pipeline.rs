//! End-to-end pipeline tests over a real on-disk vault: scan → extract →
//! reconcile → rewrite → re-parse. No Anki instance involved; store answers
//! are simulated at the reconciler boundary.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use obsanki::anki::StoredMedia;
use obsanki::config::Config;
use obsanki::hashes;
use obsanki::note::{self, ExtractOptions, NoteState};
use obsanki::notetype::{self, NoteType};
use obsanki::reconcile::NotesManager;
use obsanki::rewrite::Edit;
use obsanki::vault::{self, SourceFile};

const BASIC_PATTERN: &str =
    r"Q: ([^\n]+?) A: ([^\n<]+?)(?:\n(?P<del>DELETE)?<!--ID: (?P<id>\d+)-->)?(?:\n|$)";

fn setup_vault(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("media")).unwrap();
    for (name, content) in files {
        let path = tmp.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    tmp
}

fn test_config(root: &Path) -> Config {
    let toml_str = format!(
        r#"
[anki]
deck_name = "Default"

[vault]
root = "{root}"
media_dir = "{root}/media"

[note_types.basic]
patterns = ['{pattern}']
"#,
        root = root.display(),
        pattern = BASIC_PATTERN,
    );
    toml::from_str(&toml_str).unwrap()
}

fn extract_all(files: &[SourceFile], note_types: &[NoteType]) -> Vec<obsanki::note::Note> {
    let mut notes = Vec::new();
    for (idx, file) in files.iter().enumerate() {
        let opts = ExtractOptions {
            vault_name: "vault",
            deck: "Default",
            tags: &[],
            append_source_link: false,
        };
        for nt in note_types {
            notes.extend(note::extract(file, idx, nt, opts).unwrap());
        }
    }
    notes
}

#[test]
fn new_note_gets_marker_and_roundtrips() {
    let tmp = setup_vault(&[("math.md", "Q: 2+2? A: 4")]);
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    let mut files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].state, NoteState::New);
    assert_eq!(notes[0].fields[0].value, "2+2?");
    assert_eq!(notes[0].fields[1].value, "4");

    let mut manager = NotesManager::new(notes);
    manager.categorize_notes(&HashSet::new());
    assert_eq!(manager.to_add().len(), 1);
    assert!(manager.to_edit().is_empty() && manager.to_delete().is_empty());

    // Simulate Anki assigning id 501 to the added note.
    manager.assign_id(0, 501);
    let note = manager.note(0);
    files[note.file_index].queue_edit(Edit::InsertId {
        offset: note.id_offset,
        id: 501,
    });
    assert!(files[0].flush().unwrap());

    let rewritten = fs::read_to_string(tmp.path().join("math.md")).unwrap();
    assert_eq!(rewritten, "Q: 2+2? A: 4\n<!--ID: 501-->");

    // Re-parse: the assigned id round-trips, and a second run with the id
    // confirmed produces no further rewrites.
    let files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].state, NoteState::Unknown);
    assert_eq!(notes[0].id, Some(501));

    let mut manager = NotesManager::new(notes);
    manager.categorize_notes(&HashSet::from([501]));
    assert_eq!(manager.to_edit().len(), 1);
    assert!(manager.to_add().is_empty());
    assert_eq!(manager.note(0).state, NoteState::Existing);
}

#[test]
fn marker_insertion_never_opens_blank_line() {
    let tmp = setup_vault(&[("math.md", "Q: 2+2? A: 4\n\nmore prose\n")]);
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    let mut files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    let note = &notes[0];
    files[0].queue_edit(Edit::InsertId {
        offset: note.id_offset,
        id: 9,
    });
    files[0].flush().unwrap();

    let rewritten = fs::read_to_string(tmp.path().join("math.md")).unwrap();
    assert_eq!(rewritten, "Q: 2+2? A: 4\n<!--ID: 9-->\n\nmore prose\n");
}

#[test]
fn deletion_marker_removed_and_note_returns_to_new() {
    let original = "# Topic\n\nQ: old A: stale\nDELETE<!--ID: 42-->\n\ntrailing prose\n";
    let tmp = setup_vault(&[("cull.md", original)]);
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    let mut files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].state, NoteState::MarkedForDeletion);
    assert_eq!(notes[0].id, Some(42));

    let mut manager = NotesManager::new(notes);
    manager.categorize_notes(&HashSet::from([42]));
    assert_eq!(manager.to_delete().len(), 1);
    assert!(manager.to_add().is_empty() && manager.to_edit().is_empty());

    let note = manager.note(0);
    files[note.file_index].queue_edit(Edit::Remove {
        span: note.marker_span.clone().unwrap(),
    });
    files[0].flush().unwrap();

    let rewritten = fs::read_to_string(tmp.path().join("cull.md")).unwrap();
    assert_eq!(rewritten, "# Topic\n\nQ: old A: stale\n\ntrailing prose\n");

    // The surviving markup parses as a brand-new note.
    let files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].state, NoteState::New);
    assert_eq!(notes[0].id, None);
}

#[test]
fn zero_matches_never_queues_a_rewrite() {
    let tmp = setup_vault(&[("prose.md", "just prose, nothing to sync\n")]);
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    let mut files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    assert!(notes.is_empty());
    assert!(!files[0].has_pending_edits());
    assert!(!files[0].flush().unwrap());
}

#[test]
fn unchanged_files_skipped_via_hash_cache() {
    let tmp = setup_vault(&[("a.md", "Q: a A: 1\n"), ("b.md", "Q: b A: 2\n")]);
    let config = test_config(tmp.path());

    let files = vault::scan(&config.vault).unwrap();
    let empty_cache = HashMap::new();
    assert_eq!(vault::changed_files(&files, &empty_cache).len(), 2);

    // A cache matching current content marks everything unchanged.
    let cache = vault::current_hashes(&files);
    assert!(vault::changed_files(&files, &cache).is_empty());

    // Editing one file makes exactly that file changed again.
    fs::write(tmp.path().join("b.md"), "Q: b A: 2 edited\n").unwrap();
    let files = vault::scan(&config.vault).unwrap();
    let changed = vault::changed_files(&files, &cache);
    assert_eq!(changed.len(), 1);
    assert_eq!(files[changed[0]].relative_path, "b.md");
}

#[test]
fn rewrites_keep_bytes_outside_edit_spans() {
    let original = "intro\n\nQ: q1 A: a1\n\nmiddle section stays put\n\nQ: q2 A: a2\n\noutro\n";
    let tmp = setup_vault(&[("multi.md", original)]);
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    let mut files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    assert_eq!(notes.len(), 2);
    for (note, id) in notes.iter().zip([601, 602]) {
        files[0].queue_edit(Edit::InsertId {
            offset: note.id_offset,
            id,
        });
    }
    files[0].flush().unwrap();

    let rewritten = fs::read_to_string(tmp.path().join("multi.md")).unwrap();
    assert_eq!(
        rewritten,
        "intro\n\nQ: q1 A: a1\n<!--ID: 601-->\n\nmiddle section stays put\n\nQ: q2 A: a2\n<!--ID: 602-->\n\noutro\n"
    );
}

#[test]
fn media_classified_against_store_names() {
    let tmp = setup_vault(&[(
        "pets.md",
        "Q: known ![[cat.png]] A: ok\n\nQ: fresh ![[dog.png]] A: new\n",
    )]);
    fs::write(tmp.path().join("media/cat.png"), b"cat").unwrap();
    fs::write(tmp.path().join("media/dog.png"), b"dog").unwrap();
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    let files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    let mut manager = NotesManager::new(notes);
    manager.categorize_notes(&HashSet::new());
    manager
        .load_media_data(&tmp.path().join("media"))
        .unwrap();
    manager.categorize_media(&StoredMedia::Names {
        images: HashSet::from(["cat.png".to_string()]),
        audios: HashSet::new(),
    });

    let upload: Vec<&str> = manager
        .media_to_upload()
        .iter()
        .map(|m| m.filename.as_str())
        .collect();
    assert_eq!(upload, vec!["dog.png"]);
}

#[test]
fn second_run_after_assignment_is_a_fixpoint() {
    let tmp = setup_vault(&[("fix.md", "Q: q A: a\n")]);
    let config = test_config(tmp.path());
    let note_types = notetype::build_note_types(&config).unwrap();

    // First run: assign an id and persist hashes of the rewritten content.
    let mut files = vault::scan(&config.vault).unwrap();
    let notes = extract_all(&files, &note_types);
    files[0].queue_edit(Edit::InsertId {
        offset: notes[0].id_offset,
        id: 77,
    });
    files[0].flush().unwrap();
    let cache_file = hashes::cache_path(&config.vault.hash_cache_dir(), "fixvault");
    hashes::store(&cache_file, &vault::current_hashes(&files)).unwrap();

    // Second run: nothing changed, nothing to do.
    let files = vault::scan(&config.vault).unwrap();
    let cache = hashes::load(&cache_file).unwrap();
    assert!(vault::changed_files(&files, &cache).is_empty());
}
