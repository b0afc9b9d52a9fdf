//! Source-file rewriting.
//!
//! Rewrites are expressed as an edit log over the original text and applied
//! as a pure function: insertions of freshly assigned id markers and removals
//! of deletion-marker spans. Edits are applied in descending offset order so
//! earlier edits never shift the offsets of later ones; every byte outside
//! the edit spans is preserved exactly.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Insert an id marker at `offset` (already backed off past trailing
    /// newlines of the match it belongs to).
    InsertId { offset: usize, id: i64 },
    /// Remove the byte span of a deletion marker.
    Remove { span: Range<usize> },
}

impl Edit {
    fn offset(&self) -> usize {
        match self {
            Edit::InsertId { offset, .. } => *offset,
            Edit::Remove { span } => span.start,
        }
    }
}

/// The textual form of an embedded id marker. Inserting this after a match
/// and re-parsing with a pattern that captures
/// `(?:\n(?P<del>DELETE)?<!--ID: (?P<id>\d+)-->)?` yields the same id back.
pub fn id_marker(id: i64) -> String {
    format!("\n<!--ID: {}-->", id)
}

/// Apply all edits to `text`, producing the rewritten file content.
pub fn apply(text: &str, edits: &[Edit]) -> String {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by_key(|e| std::cmp::Reverse(e.offset()));

    let mut out = text.to_string();
    for edit in ordered {
        match edit {
            Edit::InsertId { offset, id } => out.insert_str(*offset, &id_marker(*id)),
            Edit::Remove { span } => out.replace_range(span.clone(), ""),
        }
    }
    out
}
