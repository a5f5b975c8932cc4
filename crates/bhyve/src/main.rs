mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bhyve_api::BhyveClient;
use bhyve_config::Settings;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Settings load first so `debug` from the file or environment also
    // raises the log level, not just the flag.
    let settings = bhyve_config::load(cli.global.config.as_deref(), &cli.global.overrides());
    let debug = settings
        .as_ref()
        .ok()
        .and_then(|settings| settings.debug)
        .unwrap_or(cli.global.debug);
    init_tracing(cli.global.verbose, debug);

    let result = match settings {
        Ok(settings) => run(cli.command, settings).await,
        Err(err) => Err(err.into()),
    };
    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `RUST_LOG` wins; otherwise `-v` picks the level and `debug` raises
/// it to at least debug.
fn init_tracing(verbosity: u8, debug: bool) {
    let verbosity = if debug { verbosity.max(2) } else { verbosity };
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command, settings: Settings) -> Result<(), CliError> {
    let config = settings.into_client_config()?;
    let client = BhyveClient::new(config)?;

    tracing::debug!(command = ?command, "dispatching command");
    commands::dispatch(command, &client).await
}
