use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use which::which;

use crate::{NoteError, Result, RetryPolicy, POPULAR_TAG_LIMIT};

const APPLICATION: &str = "hashnotes";
const CONFIG_FILE: &str = "config.json";
const DATA_FILE: &str = "notes.json";

/// When a mutation's snapshot reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Written before the mutation returns; the save blocks the caller
    #[default]
    WriteThrough,
    /// Queued to a background writer
    WriteBehind,
}

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// File holding the note collection
    pub data_file: PathBuf,

    pub write_policy: WritePolicy,

    /// First retry delay for failed background writes (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Upper bound for the retry delay (milliseconds)
    pub retry_max_delay_ms: u64,

    /// Number of tags in the popular view
    pub popular_tag_limit: usize,

    /// Default editor command
    pub editor_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", APPLICATION)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".hashnotes"));

        Self {
            data_file: data_dir.join(DATA_FILE),
            write_policy: WritePolicy::default(),
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 30_000,
            popular_tag_limit: POPULAR_TAG_LIMIT,
            editor_command: None,
        }
    }
}

impl Config {
    /// Platform config location, e.g. `~/.config/hashnotes/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Loads the config file.
    ///
    /// An explicitly named file must exist; a missing file at the default
    /// location yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(NoteError::ConfigError {
                        message: format!("config file not found: {}", path.display()),
                    });
                }
                path.to_path_buf()
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Config::default());
                }
            },
        };

        debug!("Loading config from {}", path.display());
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| NoteError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|_| NoteError::DirectoryError {
            path: dir.to_path_buf(),
        })?;

        let mut temp_file = NamedTempFile::new_in(dir)?;
        temp_file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(path).map_err(|e| NoteError::Io(e.error))?;

        info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Applies a `key=value` assignment.
    pub fn set_value(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| NoteError::ConfigError {
                message: format!("expected key=value, got '{}'", assignment),
            })?;

        let invalid = |expected: &str| NoteError::ConfigError {
            message: format!("invalid value '{}' for {}: expected {}", value, key, expected),
        };

        match key {
            "data_file" => {
                if value.is_empty() {
                    return Err(invalid("a path"));
                }
                self.data_file = PathBuf::from(value);
            }
            "write_policy" => {
                self.write_policy = WritePolicy::from_str(value, true)
                    .map_err(|_| invalid("write-through or write-behind"))?;
            }
            "retry_base_delay_ms" => {
                self.retry_base_delay_ms = value.parse().map_err(|_| invalid("milliseconds"))?;
            }
            "retry_max_delay_ms" => {
                self.retry_max_delay_ms = value.parse().map_err(|_| invalid("milliseconds"))?;
            }
            "popular_tag_limit" => {
                self.popular_tag_limit = value.parse().map_err(|_| invalid("a number"))?;
            }
            "editor_command" => {
                self.editor_command = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => {
                return Err(NoteError::ConfigError {
                    message: format!("unknown setting '{}'", key),
                })
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base_delay = Duration::from_millis(self.retry_base_delay_ms.max(1));
        RetryPolicy {
            base_delay,
            max_delay: Duration::from_millis(self.retry_max_delay_ms).max(base_delay),
        }
    }

    // This method provides smart fallbacks when no editor is configured
    pub fn get_editor_command(&self) -> String {
        // First try the configured editor
        if let Some(editor) = &self.editor_command {
            return editor.clone();
        }

        // Then try environment variable
        if let Ok(editor) = std::env::var("EDITOR") {
            return editor;
        }

        // Fall back to platform defaults
        if cfg!(windows) {
            "notepad".to_string()
        } else if cfg!(target_os = "macos") {
            "open -t".to_string()
        } else {
            // Try common Linux editors
            for editor in &["nano", "vim", "vi", "emacs"] {
                if which(editor).is_ok() {
                    return editor.to_string();
                }
            }
            "nano".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.write_policy, WritePolicy::WriteThrough);
        assert_eq!(config.popular_tag_limit, 5);
        assert!(config.data_file.ends_with("notes.json"));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_set_value_updates_known_keys() {
        let mut config = Config::default();

        config.set_value("write_policy=write-behind").unwrap();
        config.set_value(" popular_tag_limit = 3 ").unwrap();
        config.set_value("data_file=/tmp/elsewhere.json").unwrap();
        config.set_value("editor_command=vim -n").unwrap();

        assert_eq!(config.write_policy, WritePolicy::WriteBehind);
        assert_eq!(config.popular_tag_limit, 3);
        assert_eq!(config.data_file, PathBuf::from("/tmp/elsewhere.json"));
        assert_eq!(config.editor_command.as_deref(), Some("vim -n"));

        config.set_value("editor_command=").unwrap();
        assert!(config.editor_command.is_none());
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();

        assert!(config.set_value("no_equals_sign").is_err());
        assert!(config.set_value("colour=blue").is_err());
        assert!(config.set_value("popular_tag_limit=many").is_err());
        assert!(config.set_value("write_policy=sometimes").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("config.json");
        let mut config = Config::default();
        config.set_value("write_policy=write-behind").unwrap();

        config.save(&path).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"popular_tag_limit": 2}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.popular_tag_limit, 2);
        assert_eq!(config.write_policy, WritePolicy::WriteThrough);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.json")));

        assert!(matches!(result, Err(NoteError::ConfigError { .. })));
    }

    #[test]
    fn test_retry_policy_never_caps_below_base() {
        let mut config = Config::default();
        config.retry_base_delay_ms = 500;
        config.retry_max_delay_ms = 10;

        let retry = config.retry_policy();
        assert_eq!(retry.max_delay, Duration::from_millis(500));
    }
}
