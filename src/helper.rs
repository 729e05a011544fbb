use chrono::{DateTime, Local};

/// Marker shown in front of tag names.
pub const TAG_MARKER: char = '#';

/// Normalizes user tag input: trims whitespace and strips leading `#` markers.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let name = raw.trim().trim_start_matches(TAG_MARKER).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Renders a stored tag name with its marker.
pub fn display_tag(name: &str) -> String {
    format!("{}{}", TAG_MARKER, name)
}

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    let mut parsed = Vec::new();
    if let Some(t) = tags {
        for name in t.split(',').filter_map(normalize_tag) {
            if !parsed.contains(&name) {
                parsed.push(name);
            }
        }
    }
    parsed
}

/// Appends each tag not already present, keeping order.
pub fn add_tags(tags: &mut Vec<String>, extra: Vec<String>) {
    for tag in extra {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
}

pub fn remove_tags(tags: &mut Vec<String>, unwanted: &[String]) {
    tags.retain(|tag| !unwanted.contains(tag));
}

/// A tag naming the given moment, e.g. `20261014 0930`.
pub fn timestamp_tag(at: DateTime<Local>) -> String {
    at.format("%Y%m%d %H%M").to_string()
}

/// First non-empty line of `content`, cut to at most `max_chars` characters.
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
