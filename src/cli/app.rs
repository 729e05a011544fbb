//! CLI module for the hashnotes application
//!
//! This module handles the command-line interface for interacting with the
//! note store.
use std::{
    fs::{read_to_string, OpenOptions},
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use chrono::Local;
use console::{style, Color};
use log::{debug, info, warn};
use shell_words::split;
use tempfile::Builder;

use crate::{
    add_tags, content_preview, display_tag, normalize_tag, parse_tags, remove_tags, search,
    timestamp_tag, Commands, Config, Note, NoteDraft, NoteError, NoteStore, Result, Tag,
    TagAggregator, WritePolicy,
};

/// Upper bound for the final flush on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// CLI Application handler - processes CLI commands and interfaces with NoteStore
pub struct App {
    /// The note store
    store: NoteStore,

    /// Carries tag colors between listings within one session
    tags: TagAggregator,

    /// Application configuration
    config: Config,

    /// Where `config --set`/`--reset` write to
    config_path: Option<PathBuf>,
}

impl App {
    pub fn new(store: NoteStore, config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            store,
            tags: TagAggregator::new(),
            config,
            config_path,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Create {
                title,
                content,
                edit,
                tags,
                file,
                stamp,
            } => self.create_note(title, content, file, tags, edit, stamp)?,

            Commands::View { id, json } => self.view_note(&id, json)?,

            Commands::List {
                tag,
                limit,
                json,
                brief,
            } => self.list_notes(tag, limit, json, brief)?,

            Commands::Search { query, limit, json } => self.handle_search(&query, limit, json)?,

            Commands::Edit {
                id,
                title,
                content,
                edit,
                tags,
                add,
                remove,
                file,
            } => self.handle_edit(EditRequest {
                id,
                title,
                content,
                open_editor: edit,
                tags,
                add_tags: add,
                remove_tags: remove,
                file,
            })?,

            Commands::Delete { id, force } => self.handle_delete(&id, force)?,

            Commands::Tags {
                popular,
                limit,
                json,
            } => self.show_tags(popular, limit, json)?,

            Commands::Config { show, set, reset } => self.handle_config(show, set, reset)?,
        }

        Ok(())
    }

    /// Flushes the store; a write that cannot finish in time is reported.
    pub async fn shutdown(self) -> Result<()> {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.store.shutdown()).await {
            Ok(result) => result,
            Err(_) => {
                let error_msg = "Timed out while saving notes";
                warn!("{}", error_msg);
                Err(NoteError::ApplicationError {
                    message: error_msg.to_string(),
                })
            }
        }
    }

    fn create_note(
        &mut self,
        title: String,
        content: Option<String>,
        file: Option<PathBuf>,
        tags: Option<String>,
        open_editor: bool,
        stamp: bool,
    ) -> Result<()> {
        let mut parsed_tags = parse_tags(tags);
        if stamp {
            add_tags(&mut parsed_tags, vec![timestamp_tag(Local::now())]);
        }

        // Get content based on the provided options
        let note_content = match (content, file) {
            (Some(_), Some(_)) => {
                return Err(NoteError::ApplicationError {
                    message: "Cannot specify both --content and --file options".to_string(),
                })
            }
            (Some(c), None) => c,
            (None, Some(file_path)) => self.read_content_from_file(&file_path)?,
            (None, None) if open_editor => self.open_editor(&title, "")?,
            (None, None) => String::new(),
        };

        let note = self
            .store
            .create(NoteDraft::new(title, note_content, parsed_tags));
        println!("Note created with ID: {}", note.id);
        self.report_persistence();
        Ok(())
    }

    fn view_note(&self, id: &str, json: bool) -> Result<()> {
        let note = self.store.get(id).ok_or_else(|| NoteError::NoteNotFound {
            id: id.to_string(),
        })?;

        if json {
            println!("{}", serde_json::to_string_pretty(note)?);
            return Ok(());
        }

        println!(
            "ID: {} | Created: {} | Updated: {}",
            note.id,
            note.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            note.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
        println!("Title: {}", style(&note.title).bold());
        if !note.tags.is_empty() {
            println!("Tags: {}", style(format_tags(&note.tags)).cyan());
        }
        if !note.content.is_empty() {
            println!("\n{}", note.content);
        }
        Ok(())
    }

    /// List notes, optionally only those with a tag
    fn list_notes(&self, tag: Option<String>, limit: usize, json: bool, brief: bool) -> Result<()> {
        let mut notes: Vec<&Note> = match tag {
            Some(raw) => {
                let tag = normalize_tag(&raw).ok_or_else(|| NoteError::ApplicationError {
                    message: format!("Not a usable tag: \"{}\"", raw),
                })?;
                self.store.find_by_tag(&tag)
            }
            None => self.store.list().iter().collect(),
        };

        if limit > 0 {
            notes.truncate(limit);
        }

        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        if json {
            self.display_notes_json(&notes)?;
        } else if brief {
            for note in &notes {
                println!("{}  {}", note.id, note.title);
            }
        } else {
            self.display_notes_text(&notes);
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn handle_search(&self, query: &str, limit: usize, json: bool) -> Result<()> {
        let mut results = search(self.store.list(), query);
        let total = results.len();

        // Apply limit if specified (0 means no limit)
        if limit > 0 {
            results.truncate(limit);
        }

        if results.is_empty() {
            println!("No notes found matching query: \"{}\"", query);
            return Ok(());
        }

        if json {
            self.display_notes_json(&results)?;
        } else {
            self.display_notes_text(&results);
        }

        if results.len() < total {
            println!(
                "\nShowing {} of {} matching notes. Use --limit to show more.",
                results.len(),
                total
            );
        } else {
            println!("\nFound {} matching notes.", total);
        }
        Ok(())
    }

    fn handle_edit(&mut self, request: EditRequest) -> Result<()> {
        let sources = [
            request.content.is_some(),
            request.file.is_some(),
            request.open_editor,
        ];
        if sources.iter().filter(|given| **given).count() > 1 {
            return Err(NoteError::ApplicationError {
                message: "Use only one of --content, --file and --edit".to_string(),
            });
        }

        // Retrieve the existing note
        let mut note = self
            .store
            .get(&request.id)
            .cloned()
            .ok_or_else(|| NoteError::NoteNotFound {
                id: request.id.clone(),
            })?;

        if let Some(new_title) = request.title {
            note.title = new_title;
        }

        if let Some(new_content) = request.content {
            note.content = new_content;
        } else if let Some(file_path) = request.file {
            note.content = self.read_content_from_file(&file_path)?;
            println!("Content updated from file: {}", file_path.display());
        } else if request.open_editor {
            note.content = self.open_editor(&note.title, &note.content)?;
            println!("Content updated from editor");
        }

        if request.tags.is_some() {
            note.tags = parse_tags(request.tags);
        }
        if request.add_tags.is_some() {
            add_tags(&mut note.tags, parse_tags(request.add_tags));
        }
        if request.remove_tags.is_some() {
            remove_tags(&mut note.tags, &parse_tags(request.remove_tags));
        }

        let id = note.id.clone();
        if !self.store.update(note) {
            return Err(NoteError::NoteNotFound { id });
        }

        println!("Note {} updated successfully", id);
        self.report_persistence();
        Ok(())
    }

    fn handle_delete(&mut self, id: &str, force: bool) -> Result<()> {
        let note = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| NoteError::NoteNotFound { id: id.to_string() })?;

        if !force {
            println!("You are about to delete the following note:");
            println!("ID:     {}", note.id);
            println!("Title:  {}", note.title);
            println!("Tags:   {}", format_tags(&note.tags));
            println!(
                "Created: {}",
                note.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );

            let preview = content_preview(&note.content, 80);
            if !preview.is_empty() {
                println!("\nContent preview:\n{}", preview);
            }

            println!("\nThis action cannot be undone!");
            print!("Are you sure you want to delete this note? [y/N]: ");
            stdout().flush()?;

            let mut input = String::new();
            stdin().read_line(&mut input)?;

            let input = input.trim().to_lowercase();
            if input != "y" && input != "yes" {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.store.delete(id);
        println!(
            "Note '{}' ({}) has been permanently deleted.",
            note.title, note.id
        );
        self.report_persistence();
        Ok(())
    }

    fn show_tags(&mut self, popular: bool, limit: Option<usize>, json: bool) -> Result<()> {
        self.tags.refresh(self.store.list());

        let tags: Vec<Tag> = if popular {
            self.tags
                .top(limit.unwrap_or(self.config.popular_tag_limit))
        } else {
            self.tags.all().to_vec()
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&tags)?);
            return Ok(());
        }

        if tags.is_empty() {
            println!("No tags yet. Tags will appear here when you add them to your notes.");
            return Ok(());
        }

        if popular {
            println!("{}", style("Popular Tags").bold());
        } else {
            println!("{}", style("All Tags").bold());
        }
        for tag in &tags {
            println!(
                "{} {:<24} {} note{}",
                style("●").fg(terminal_color(&tag.color)),
                display_tag(&tag.name),
                tag.count,
                if tag.count == 1 { "" } else { "s" }
            );
        }
        Ok(())
    }

    fn handle_config(&mut self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        if reset || set.is_some() {
            let path = self
                .config_path
                .clone()
                .ok_or_else(|| NoteError::ConfigError {
                    message: "no configuration path available".to_string(),
                })?;

            let mut updated = if reset {
                Config::default()
            } else {
                self.config.clone()
            };
            if let Some(assignment) = set {
                updated.set_value(&assignment)?;
            }

            updated.save(&path)?;
            println!("Configuration written to {}", path.display());
            self.config = updated;
        }

        if show || !reset {
            println!("{}", serde_json::to_string_pretty(&self.config)?);
        }
        Ok(())
    }

    /// Warns when the write-through save of the last change failed.
    fn report_persistence(&self) {
        if self.store.write_policy() != WritePolicy::WriteThrough {
            return;
        }

        let status = self.store.persistence_status();
        if status.is_dirty() {
            eprintln!(
                "{} change kept in memory but not saved: {}",
                style("warning:").yellow().bold(),
                status.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// Display notes in JSON format
    fn display_notes_json(&self, notes: &[&Note]) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(notes)?);
        Ok(())
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[&Note]) {
        // Use terminal width for formatting if available
        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, note) in notes.iter().enumerate() {
            // Add separator between notes (except before the first)
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let created_at = note.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
            println!("ID: {} | Created: {}", note.id, created_at);
            println!("Title: {}", style(&note.title).bold());

            if !note.tags.is_empty() {
                println!("Tags: {}", style(format_tags(&note.tags)).cyan());
            }

            let preview = content_preview(&note.content, 100);
            if !preview.is_empty() {
                println!("\n{}", preview);
            }
        }
    }

    // Helper function for reading content from file
    fn read_content_from_file(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(NoteError::ApplicationError {
                message: format!("Not a file: {}", path.display()),
            });
        }

        read_to_string(path).map_err(NoteError::Io)
    }

    /// Opens the configured editor on `existing` and returns what was saved.
    fn open_editor(&self, title: &str, existing: &str) -> Result<String> {
        let temp_file = Builder::new().suffix(".md").tempfile()?;
        let temp_path = temp_file.path().to_path_buf();

        {
            let mut file = OpenOptions::new().write(true).open(&temp_path)?;
            writeln!(file, "<!-- Editing: {} -->", title)?;
            writeln!(
                file,
                "<!-- Lines starting with <!-- are removed. Save and exit when done. -->"
            )?;
            write!(file, "{}", existing)?;
        }

        let editor_cmd = self.config.get_editor_command();
        info!("Opening editor to write note content. Save and exit when done...");
        self.launch_editor(&editor_cmd, &temp_path)?;

        let content = read_to_string(&temp_path)?;
        Ok(process_editor_content(&content))
    }

    fn launch_editor(&self, editor_cmd: &str, file_path: &Path) -> Result<()> {
        // Handle shell-like command parsing
        let args = split(editor_cmd).map_err(|e| NoteError::EditorError {
            message: format!("Failed to parse editor command: {}", e),
        })?;

        let Some((program, rest)) = args.split_first() else {
            return Err(NoteError::EditorError {
                message: "Empty editor command".to_string(),
            });
        };

        debug!("Launching editor: {} {:?}", program, rest);
        let status = Command::new(program)
            .args(rest)
            .arg(file_path)
            .status()
            .map_err(|e| NoteError::EditorError {
                message: format!("Failed to execute editor command: {}", e),
            })?;

        if !status.success() {
            return Err(NoteError::EditorError {
                message: "Editor exited with non-zero status".to_string(),
            });
        }

        Ok(())
    }
}

/// Options for `edit`, gathered from the subcommand.
struct EditRequest {
    id: String,
    title: Option<String>,
    content: Option<String>,
    open_editor: bool,
    tags: Option<String>,
    add_tags: Option<String>,
    remove_tags: Option<String>,
    file: Option<PathBuf>,
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| display_tag(tag))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops the comment lines the editor template adds.
fn process_editor_content(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("<!--"))
        .collect::<Vec<&str>>()
        .join("\n")
        .trim_end()
        .to_string()
}

/// Closest terminal color for a palette entry.
fn terminal_color(hex: &str) -> Color {
    match hex {
        "#007AFF" => Color::Blue,
        "#34C759" => Color::Green,
        "#FF9500" => Color::Color256(208),
        "#FF2D55" => Color::Magenta,
        "#5856D6" => Color::Color256(99),
        "#FF3B30" => Color::Red,
        "#5AC8FA" => Color::Cyan,
        "#FFCC00" => Color::Yellow,
        _ => Color::White,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{MemoryBackend, NoteBackend, RetryPolicy, TAG_PALETTE};

    fn app_with(backend: Arc<MemoryBackend>) -> App {
        let store = NoteStore::open(backend, WritePolicy::WriteThrough, RetryPolicy::default());
        App::new(store, Config::default(), None)
    }

    fn create(title: &str, tags: &str) -> Commands {
        Commands::Create {
            title: title.to_string(),
            content: Some("body".to_string()),
            edit: false,
            tags: Some(tags.to_string()),
            file: None,
            stamp: false,
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_tags() {
        let backend = Arc::new(MemoryBackend::new());
        let mut app = app_with(backend.clone());

        app.run(create("Groceries", "#home, errands,home")).await.unwrap();

        let saved = backend.load().unwrap().unwrap();
        assert_eq!(saved[0].tags, vec!["home", "errands"]);
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_edit_adds_and_removes_tags() {
        let backend = Arc::new(MemoryBackend::new());
        let mut app = app_with(backend.clone());
        app.run(create("Plan", "a,b")).await.unwrap();
        let id = app.store.list()[0].id.clone();

        app.run(Commands::Edit {
            id: id.clone(),
            title: Some("Plan v2".to_string()),
            content: None,
            edit: false,
            tags: None,
            add: Some("#c".to_string()),
            remove: Some("a".to_string()),
            file: None,
        })
        .await
        .unwrap();

        let note = app.store.get(&id).unwrap();
        assert_eq!(note.title, "Plan v2");
        assert_eq!(note.content, "body");
        assert_eq!(note.tags, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_edit_rejects_conflicting_sources() {
        let mut app = app_with(Arc::new(MemoryBackend::new()));
        app.run(create("Plan", "")).await.unwrap();
        let id = app.store.list()[0].id.clone();

        let result = app
            .run(Commands::Edit {
                id,
                title: None,
                content: Some("x".to_string()),
                edit: true,
                tags: None,
                add: None,
                remove: None,
                file: None,
            })
            .await;
        assert!(matches!(result, Err(NoteError::ApplicationError { .. })));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_reported() {
        let mut app = app_with(Arc::new(MemoryBackend::new()));

        let view = app
            .run(Commands::View {
                id: "nope".to_string(),
                json: false,
            })
            .await;
        assert!(matches!(view, Err(NoteError::NoteNotFound { .. })));

        let delete = app
            .run(Commands::Delete {
                id: "nope".to_string(),
                force: true,
            })
            .await;
        assert!(matches!(delete, Err(NoteError::NoteNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_rejects_empty_tag_filter() {
        let mut app = app_with(Arc::new(MemoryBackend::new()));
        app.run(create("Tagged", "work")).await.unwrap();

        for raw in ["#", " ", "##"] {
            let result = app
                .run(Commands::List {
                    tag: Some(raw.to_string()),
                    limit: 0,
                    json: false,
                    brief: true,
                })
                .await;
            assert!(matches!(result, Err(NoteError::ApplicationError { .. })));
        }

        let filtered = app
            .run(Commands::List {
                tag: Some("#work".to_string()),
                limit: 0,
                json: false,
                brief: true,
            })
            .await;
        assert!(filtered.is_ok());
    }

    #[tokio::test]
    async fn test_forced_delete_removes_note() {
        let backend = Arc::new(MemoryBackend::new());
        let mut app = app_with(backend.clone());
        app.run(create("Temp", "")).await.unwrap();
        let id = app.store.list()[0].id.clone();

        app.run(Commands::Delete { id, force: true }).await.unwrap();

        assert!(app.store.is_empty());
        assert!(backend.load().unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_keep_colors_between_listings() {
        let mut app = app_with(Arc::new(MemoryBackend::new()));
        app.run(create("One", "x,y")).await.unwrap();

        app.show_tags(false, None, true).unwrap();
        let first = app.tags.all().to_vec();
        app.show_tags(true, Some(1), true).unwrap();

        assert_eq!(app.tags.all(), first.as_slice());
        assert!(first.iter().all(|t| TAG_PALETTE.contains(&t.color.as_str())));
    }

    #[test]
    fn test_process_editor_content_strips_comments() {
        let raw = "<!-- Editing: x -->\n<!-- help -->\nline one\n\nline two\n\n";
        assert_eq!(process_editor_content(raw), "line one\n\nline two");
    }

    #[test]
    fn test_every_palette_entry_has_terminal_color() {
        for hex in TAG_PALETTE {
            assert_ne!(terminal_color(hex), Color::White);
        }
    }
}
