mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use shudaika_core::config::{AppConfig, LoggingConfig};

use cli::{Cli, Commands};
use error::CliError;

/// Console logging, plus a daily rolling file when a log directory is configured.
/// `RUST_LOG` takes precedence over the configured filter.
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "shudaika.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

async fn execute(cli: Cli, config: AppConfig) -> Result<(), CliError> {
    match &cli.command {
        Commands::Sync(args) => commands::sync(&config, args).await,
        Commands::Search { title, year } => commands::search(&config, title, *year).await,
        Commands::Themes { slug, movie, video } => {
            commands::themes(&config, slug, *movie, *video).await
        }
        Commands::Library(command) => commands::library(command),
        Commands::Config(command) => commands::config(&config, command),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("shudaika: {e}");
            std::process::exit(2);
        }
    };

    let guard = init_tracing(&config.logging);

    if let Err(e) = execute(cli, config).await {
        error!("{e}");
        // Flush the file writer; `exit` skips destructors.
        drop(guard);
        std::process::exit(1);
    }
}
