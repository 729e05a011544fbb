use std::{process, sync::Arc};

use clap::Parser;
use log::{error, info};

use hashnotes::{App, Cli, Config, JsonFileBackend, NoteStore, Result};

pub fn initialize_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let config_path = cli.config.clone().or_else(Config::default_path);
    info!("Using notes file {}", config.data_file.display());

    let backend = Arc::new(JsonFileBackend::new(config.data_file.clone()));
    let store = NoteStore::open(backend, config.write_policy, config.retry_policy());

    let mut app = App::new(store, config, config_path);
    let outcome = app.run(cli.command).await;
    let shutdown = app.shutdown().await;

    outcome.and(shutdown)
}
