//! Sync pipeline orchestration.
//!
//! Drives one full run: load cache → scan vault → extract notes from changed
//! files → reconcile against the store → execute the store phases in strict
//! order (decks, deletes, adds, updates, media) → rewrite source files →
//! rewrite the hash cache. A failure in any phase stops the run at that
//! phase boundary; completed phases are not rolled back.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::anki::AnkiClient;
use crate::config::Config;
use crate::hashes;
use crate::note::{self, ExtractOptions};
use crate::notetype;
use crate::progress::{ProgressReporter, SyncEvent};
use crate::reconcile::NotesManager;
use crate::rewrite::Edit;
use crate::vault;

pub async fn run_sync(
    config: &Config,
    full: bool,
    dry_run: bool,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let note_types = notetype::build_note_types(config)?;
    if note_types.is_empty() {
        bail!("No note types configured; nothing to sync");
    }

    let vault_name = config.vault.vault_name();
    let cache_file = hashes::cache_path(&config.vault.hash_cache_dir(), &vault_name);
    let cache = if full {
        HashMap::new()
    } else {
        hashes::load(&cache_file)?
    };

    reporter.report(SyncEvent::Scanning {
        vault: vault_name.clone(),
    });
    let mut files = vault::scan(&config.vault)?;
    let changed = vault::changed_files(&files, &cache);
    reporter.report(SyncEvent::Scanned {
        changed: changed.len() as u64,
        total: files.len() as u64,
    });

    let mut notes = Vec::new();
    for &file_idx in &changed {
        let file = &files[file_idx];
        let deck = file
            .metadata
            .deck
            .clone()
            .unwrap_or_else(|| config.anki.deck_name.clone());
        let tags = merge_tags(&config.anki.tags, &file.metadata.tags);
        let opts = ExtractOptions {
            vault_name: &vault_name,
            deck: &deck,
            tags: &tags,
            append_source_link: config.anki.append_source_link,
        };
        for note_type in &note_types {
            notes.extend(note::extract(file, file_idx, note_type, opts)?);
        }
    }
    reporter.report(SyncEvent::Parsed {
        notes: notes.len() as u64,
        files: changed.len() as u64,
    });

    let mut manager = NotesManager::new(notes);

    let anki = AnkiClient::new(&config.anki.url)?;
    let existing_ids = anki.find_note_ids().await?;
    let stored_media = anki.stored_media(config.anki.media_comparison).await?;

    manager.categorize_notes(&existing_ids);
    manager.load_media_data(&config.vault.media_dir)?;
    manager.categorize_media(&stored_media);
    manager.drop_edits_superseded_by_deletes();

    if dry_run {
        println!(
            "Dry run: would add {}, update {}, delete {}, upload {} media files.",
            manager.to_add().len(),
            manager.to_edit().len(),
            manager.to_delete().len(),
            manager.media_to_upload().len(),
        );
        return Ok(());
    }

    // Phase 1: decks.
    let decks = manager.needed_decks();
    reporter.report(SyncEvent::Phase {
        name: "creating decks",
        count: decks.len() as u64,
    });
    anki.create_decks(&decks).await?;

    // Phase 2: deletes. The store call goes first; marker removal is queued
    // against the owning files only once the store accepted the deletion.
    let delete_ids: Vec<i64> = manager.notes_to_delete().iter().filter_map(|n| n.id).collect();
    reporter.report(SyncEvent::Phase {
        name: "deleting notes",
        count: delete_ids.len() as u64,
    });
    anki.delete_notes(&delete_ids).await?;
    for &idx in manager.to_delete() {
        let note = manager.note(idx);
        if let Some(span) = note.marker_span.clone() {
            files[note.file_index].queue_edit(Edit::Remove { span });
        }
    }

    // Phase 3: adds. Response order matches request order; null entries are
    // notes Anki rejected (duplicates) and get no marker.
    let add_indices: Vec<usize> = manager.to_add().to_vec();
    reporter.report(SyncEvent::Phase {
        name: "adding notes",
        count: add_indices.len() as u64,
    });
    let assigned = anki.add_notes(&manager.notes_to_add()).await?;
    let mut added = 0u64;
    for (&idx, maybe_id) in add_indices.iter().zip(assigned) {
        match maybe_id {
            Some(id) => {
                manager.assign_id(idx, id);
                let note = manager.note(idx);
                files[note.file_index].queue_edit(Edit::InsertId {
                    offset: note.id_offset,
                    id,
                });
                added += 1;
            }
            None => {
                let note = manager.note(idx);
                eprintln!(
                    "warning: Anki rejected a note from {} (duplicate?)",
                    files[note.file_index].relative_path
                );
            }
        }
    }

    // Phase 4: updates.
    let to_edit = manager.notes_to_edit();
    reporter.report(SyncEvent::Phase {
        name: "updating notes",
        count: to_edit.len() as u64,
    });
    anki.update_notes(&to_edit).await?;

    // Commit id changes back into the vault.
    let mut rewritten = 0u64;
    for file in &mut files {
        if file.flush()? {
            rewritten += 1;
        }
    }
    reporter.report(SyncEvent::Rewritten { files: rewritten });

    anki.ensure_deck(&manager.notes_to_edit()).await?;

    // Phase 5: media.
    let uploads = manager.media_to_upload();
    reporter.report(SyncEvent::Phase {
        name: "storing media",
        count: uploads.len() as u64,
    });
    anki.store_media(&uploads).await?;

    hashes::store(&cache_file, &vault::current_hashes(&files))?;

    println!(
        "Sync complete: {} added, {} updated, {} deleted, {} media uploaded, {} files rewritten.",
        added,
        manager.to_edit().len(),
        delete_ids.len(),
        uploads.len(),
        rewritten,
    );
    Ok(())
}

/// Config default tags first, then file tags, first occurrence wins.
fn merge_tags(defaults: &[String], file_tags: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(defaults.len() + file_tags.len());
    for tag in defaults.iter().chain(file_tags) {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}
