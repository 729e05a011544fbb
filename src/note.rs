//! Core note data structures.
//!
//! This module contains the `Note` record as it is held in memory and written
//! to storage, the `NoteDraft` used to create one, and the id generator.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Note title
    pub title: String,
    /// Note body text
    pub content: String,
    /// Tag names, without the leading `#`
    pub tags: Vec<String>,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// The user-editable part of a note, used to create one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags,
        }
    }
}

impl Note {
    /// Builds a note from a draft, stamping both timestamps with `now`.
    pub fn from_draft(id: String, draft: NoteDraft, now: DateTime<Utc>) -> Self {
        Note {
            id,
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exact, case-sensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Generates note ids of the form `<millis>-<sequence>`.
///
/// The sequence restarts whenever the clock moves past the last seen
/// millisecond, so ids stay unique for bursts of calls inside one millisecond
/// and keep increasing if the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_millis: i64,
    sequence: u32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis();
        if millis > self.last_millis {
            self.last_millis = millis;
            self.sequence = 0;
        } else {
            match self.sequence.checked_add(1) {
                Some(next) => self.sequence = next,
                None => {
                    self.last_millis += 1;
                    self.sequence = 0;
                }
            }
        }

        format!("{}-{:04}", self.last_millis, self.sequence)
    }
}
