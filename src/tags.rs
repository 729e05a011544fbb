//! Tags derived from the note collection.
//!
//! Tags are never stored on their own. Every derivation recounts them from the
//! notes, so a tag disappears as soon as the last note carrying it is gone.
use std::collections::HashMap;

use serde::Serialize;

use crate::Note;

/// Display colors handed out to tags.
pub const TAG_PALETTE: [&str; 8] = [
    "#007AFF", // Blue
    "#34C759", // Green
    "#FF9500", // Orange
    "#FF2D55", // Pink
    "#5856D6", // Purple
    "#FF3B30", // Red
    "#5AC8FA", // Light Blue
    "#FFCC00", // Yellow
];

/// Size of the popular-tags view.
pub const POPULAR_TAG_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: String,
    /// Number of notes carrying the tag
    pub count: usize,
    pub color: String,
}

/// Hash a tag for deterministic color selection
fn hash_tag(name: &str) -> u64 {
    let mut h: u64 = 5381;
    for b in name.bytes() {
        h = (h.wrapping_shl(5)).wrapping_add(h) ^ u64::from(b);
    }
    h
}

/// Palette entry for a tag name; the same name always gets the same color.
pub fn palette_color(name: &str) -> &'static str {
    TAG_PALETTE[(hash_tag(name) % TAG_PALETTE.len() as u64) as usize]
}

/// Counts tags across `notes` in order of first appearance.
///
/// Names are compared exactly. A tag listed twice on one note counts once, so
/// `count` is a number of notes rather than of tag occurrences.
/// Colors are carried over from `previous` where the name is already known.
pub fn derive_tags(notes: &[Note], previous: &[Tag]) -> Vec<Tag> {
    let known: HashMap<&str, &str> = previous
        .iter()
        .map(|tag| (tag.name.as_str(), tag.color.as_str()))
        .collect();

    let mut tags: Vec<Tag> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for note in notes {
        for (i, name) in note.tags.iter().enumerate() {
            if note.tags[..i].contains(name) {
                continue;
            }

            match positions.get(name.as_str()) {
                Some(&position) => tags[position].count += 1,
                None => {
                    let color = known
                        .get(name.as_str())
                        .copied()
                        .unwrap_or_else(|| palette_color(name));
                    positions.insert(name.as_str(), tags.len());
                    tags.push(Tag {
                        name: name.clone(),
                        count: 1,
                        color: color.to_string(),
                    });
                }
            }
        }
    }

    tags
}

/// Most used first; ties keep their first-appearance order.
pub fn popular_tags(tags: &[Tag]) -> Vec<Tag> {
    let mut sorted = tags.to_vec();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted
}

pub fn top_tags(tags: &[Tag], limit: usize) -> Vec<Tag> {
    let mut popular = popular_tags(tags);
    popular.truncate(limit);
    popular
}

/// Keeps the last derivation so colors stay put between refreshes.
#[derive(Debug, Default)]
pub struct TagAggregator {
    tags: Vec<Tag>,
}

impl TagAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes tags from the current notes.
    pub fn refresh(&mut self, notes: &[Note]) -> &[Tag] {
        self.tags = derive_tags(notes, &self.tags);
        &self.tags
    }

    /// All tags from the last refresh, first appearance first.
    pub fn all(&self) -> &[Tag] {
        &self.tags
    }

    pub fn popular(&self) -> Vec<Tag> {
        popular_tags(&self.tags)
    }

    pub fn top(&self, limit: usize) -> Vec<Tag> {
        top_tags(&self.tags, limit)
    }
}
