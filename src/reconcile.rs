//! Note and media reconciliation.
//!
//! Takes everything the extractor produced and decides what the run has to
//! do: which notes get added, updated, or deleted, and which referenced media
//! still need uploading. Buckets are indices into the owned note list so a
//! note can never land in two buckets.

use anyhow::Result;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::anki::StoredMedia;
use crate::media::{Media, MediaState};
use crate::note::{Note, NoteState};

pub struct NotesManager {
    notes: Vec<Note>,
    to_add: Vec<usize>,
    to_edit: Vec<usize>,
    to_delete: Vec<usize>,
    /// (note index, media index) pairs classified `New`, in encounter order.
    /// Duplicate filenames are kept; the upload step dedups.
    new_media: Vec<(usize, usize)>,
}

impl NotesManager {
    pub fn new(notes: Vec<Note>) -> NotesManager {
        NotesManager {
            notes,
            to_add: Vec::new(),
            to_edit: Vec::new(),
            to_delete: Vec::new(),
            new_media: Vec::new(),
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Bucket every note, in original order.
    ///
    /// `MarkedForDeletion` goes to delete; `Unknown` with a confirmed id is
    /// promoted to `Existing` and goes to edit; everything else, including
    /// an `Unknown` whose id the store no longer knows, is (re)classified
    /// `New` and goes to add. A stale id is cleared; the old marker stays in
    /// the file until the freshly assigned one is appended after it.
    pub fn categorize_notes(&mut self, existing_ids: &HashSet<i64>) {
        for (idx, note) in self.notes.iter_mut().enumerate() {
            match note.state {
                NoteState::MarkedForDeletion => self.to_delete.push(idx),
                NoteState::Unknown if note.id.is_some_and(|id| existing_ids.contains(&id)) => {
                    note.state = NoteState::Existing;
                    self.to_edit.push(idx);
                }
                _ => {
                    note.state = NoteState::New;
                    note.id = None;
                    self.to_add.push(idx);
                }
            }
        }
    }

    /// Delete wins: an id queued for deletion must not also be updated.
    /// Classification is purely local per note, so the same id can surface in
    /// both buckets when a file carries duplicate markers.
    pub fn drop_edits_superseded_by_deletes(&mut self) {
        let deleted_ids: HashSet<i64> = self
            .to_delete
            .iter()
            .filter_map(|&i| self.notes[i].id)
            .collect();
        let notes = &self.notes;
        self.to_edit
            .retain(|&i| notes[i].id.map_or(true, |id| !deleted_ids.contains(&id)));
    }

    /// Load content for every collected media reference.
    pub fn load_media_data(&mut self, media_dir: &Path) -> Result<()> {
        for note in &mut self.notes {
            for media in &mut note.media {
                media.load_data(media_dir)?;
            }
        }
        Ok(())
    }

    /// Mark every collected media reference `Stored` or `New`, per the typed
    /// comparison answer the store client produced.
    pub fn categorize_media(&mut self, stored: &StoredMedia) {
        for (note_idx, note) in self.notes.iter_mut().enumerate() {
            for (media_idx, media) in note.media.iter_mut().enumerate() {
                let is_stored = match stored {
                    StoredMedia::Names { images, audios } => {
                        images.contains(&media.filename) || audios.contains(&media.filename)
                    }
                    StoredMedia::Content { images, audios } => images
                        .get(&media.filename)
                        .or_else(|| audios.get(&media.filename))
                        .is_some_and(|content| media.data.as_deref() == Some(content.as_str())),
                };
                if is_stored {
                    media.state = MediaState::Stored;
                } else {
                    media.state = MediaState::New;
                    self.new_media.push((note_idx, media_idx));
                }
            }
        }
    }

    pub fn to_add(&self) -> &[usize] {
        &self.to_add
    }

    pub fn to_edit(&self) -> &[usize] {
        &self.to_edit
    }

    pub fn to_delete(&self) -> &[usize] {
        &self.to_delete
    }

    pub fn note(&self, idx: usize) -> &Note {
        &self.notes[idx]
    }

    pub fn notes_to_add(&self) -> Vec<&Note> {
        self.to_add.iter().map(|&i| &self.notes[i]).collect()
    }

    pub fn notes_to_edit(&self) -> Vec<&Note> {
        self.to_edit.iter().map(|&i| &self.notes[i]).collect()
    }

    pub fn notes_to_delete(&self) -> Vec<&Note> {
        self.to_delete.iter().map(|&i| &self.notes[i]).collect()
    }

    /// New media deduped by filename, first occurrence wins.
    pub fn media_to_upload(&self) -> Vec<&Media> {
        let mut seen = HashSet::new();
        self.new_media
            .iter()
            .map(|&(n, m)| &self.notes[n].media[m])
            .filter(|media| seen.insert(media.filename.clone()))
            .collect()
    }

    /// Every distinct target deck across all notes.
    pub fn needed_decks(&self) -> BTreeSet<String> {
        self.notes.iter().map(|n| n.deck.clone()).collect()
    }

    pub fn files_with_deleted_notes(&self) -> BTreeSet<usize> {
        self.to_delete
            .iter()
            .map(|&i| self.notes[i].file_index)
            .collect()
    }

    pub fn files_with_added_notes(&self) -> BTreeSet<usize> {
        self.to_add
            .iter()
            .map(|&i| self.notes[i].file_index)
            .collect()
    }

    /// Record the id the store assigned to a freshly added note.
    pub fn assign_id(&mut self, note_idx: usize, id: i64) {
        let note = &mut self.notes[note_idx];
        note.id = Some(id);
        note.state = NoteState::Existing;
    }
}
