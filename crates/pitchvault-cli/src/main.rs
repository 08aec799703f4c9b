mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use pitchvault_core::config::{self, LoggingConfig};
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(error = %error, "command failed");
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let resolved = if cli.command.needs_config() {
        Some(config::resolve(&cli.config_dir)?)
    } else {
        None
    };
    let logging = match &resolved {
        Some(resolved) => resolved.logging.clone(),
        None => LoggingConfig {
            log_to_file: false,
            ..LoggingConfig::default()
        },
    };
    if let Some(path) = logging::init(&logging, cli.log_dir.as_deref())? {
        tracing::debug!(log_file = %path.display(), "logging to file");
    }

    let result = commands::run(&cli, resolved.as_ref()).await?;
    output::render(&result.data, cli.pretty)?;

    if cli.strict && result.failed_units > 0 {
        return Err(CliError::StrictModeViolation {
            failed_units: result.failed_units,
        });
    }

    Ok(ExitCode::SUCCESS)
}
