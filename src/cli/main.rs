use std::path::PathBuf;

use clap::Parser;

use crate::{Commands, Config, WritePolicy};

/// Main CLI application arguments and command structure
#[derive(Parser, Debug)]
#[clap(version, about = "Personal notes with tags, kept in one local file")]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Path to the notes file
    #[clap(long, value_parser)]
    pub data_file: Option<PathBuf>,

    /// When changes are written to the notes file
    #[clap(long, value_enum)]
    pub write_policy: Option<WritePolicy>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the hashnotes application
    #[clap(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Command-line flags take precedence over the config file.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(data_file) = &self.data_file {
            config.data_file = data_file.clone();
        }
        if let Some(policy) = self.write_policy {
            config.write_policy = policy;
        }
    }
}
