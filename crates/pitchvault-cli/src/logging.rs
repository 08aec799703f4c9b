use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pitchvault_core::config::LoggingConfig;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Initialize structured logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise the configured level.
/// Console output goes to stderr so stdout stays machine-readable; file
/// output goes to `<log_dir>/pitchvault_<YYYYMMDD>.log`.
pub fn init(config: &LoggingConfig, log_dir: Option<&Path>) -> Result<Option<PathBuf>, CliError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));

    let console = config.log_to_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let (file_layer, log_path) = if config.log_to_file {
        let dir = log_dir.unwrap_or(config.log_dir.as_path());
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(OffsetDateTime::now_utc().date())?);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file));
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))?;

    Ok(log_path)
}

fn log_file_name(date: Date) -> Result<String, CliError> {
    let stamp = date
        .format(format_description!("[year][month][day]"))
        .map_err(|error| CliError::Logging(error.to_string()))?;
    Ok(format!("pitchvault_{stamp}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn log_files_are_named_by_day() {
        assert_eq!(
            log_file_name(date!(2024 - 08 - 03)).expect("name"),
            "pitchvault_20240803.log"
        );
    }
}
