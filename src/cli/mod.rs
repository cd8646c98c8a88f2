use clap::Parser;
use error_stack::{Result, ResultExt};
use thiserror::Error;

use whisperline::config;

mod cleanup;
mod migrate;
mod server;

/// Command line options for whisperline.
#[derive(Debug, Parser)]
#[command(
    about = "Notification service of the whisperline feed",
    version,
    author,
    long_about
)]
pub struct Cli {
    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Debug, Error)]
#[error("Failed to run whisperline")]
pub struct CliError;

impl Cli {
    pub fn run(self) -> Result<(), CliError> {
        match self.subcommand {
            Subcommand::Server(args) => self::server::run(&args).change_context(CliError),
            Subcommand::Cleanup => self::cleanup::run().change_context(CliError),
            Subcommand::Migrate => self::migrate::run().change_context(CliError),
        }
    }
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    /// Serves the HTTP API with the outbox worker and sweeper.
    Server(self::server::ServerCommand),
    /// Removes notifications past their retention period.
    Cleanup,
    /// Applies pending database migrations.
    Migrate,
}

#[derive(Debug, Error)]
#[error("Failed to prepare the environment")]
pub struct SetupError;

/// Loads the configuration, starts logging and builds the runtime
/// every subcommand runs on.
fn setup(
    worker_threads: Option<usize>,
) -> Result<(config::Server, tokio::runtime::Runtime), SetupError> {
    let config = config::Server::load().change_context(SetupError)?;
    whisperline::telemetry::init(&config.logging).change_context(SetupError)?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    let runtime = builder
        .build()
        .change_context(SetupError)
        .attach_printable("could not build tokio runtime")?;

    Ok((config, runtime))
}
