//! Substring search over notes.
use log::{debug, trace};

use crate::Note;

/// True if `needle` (already lower-cased) occurs in the title, content or
/// any tag of `note`, ignoring case.
pub fn note_matches(note: &Note, needle: &str) -> bool {
    note.title.to_lowercase().contains(needle)
        || note.content.to_lowercase().contains(needle)
        || note.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
}

/// Notes whose title, content or tags contain `query`, case-insensitively.
///
/// A blank query matches nothing. Results keep collection order.
pub fn search<'a>(notes: &'a [Note], query: &str) -> Vec<&'a Note> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        trace!("Blank search query");
        return Vec::new();
    }

    let matches: Vec<&Note> = notes
        .iter()
        .filter(|note| note_matches(note, &needle))
        .collect();

    debug!(
        "Search for '{}' matched {} of {} notes",
        needle,
        matches.len(),
        notes.len()
    );
    matches
}
