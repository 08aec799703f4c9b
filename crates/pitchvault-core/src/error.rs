use std::path::PathBuf;

use thiserror::Error;

/// Validation errors for identifiers and ranges supplied by callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "invalid source '{value}', expected one of fbref, fotmob, understat, whoscored, sofascore, espn, clubelo, matchhistory, sofifa"
    )]
    InvalidSource { value: String },

    #[error("invalid season '{value}', expected YYZZ (e.g. 2324) or a start year (e.g. 2023)")]
    InvalidSeason { value: String },

    #[error("start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("month {value} is outside 1..=12")]
    InvalidMonth { value: u8 },

    #[error("at least one season is required")]
    EmptySeasons,

    #[error("unknown league '{name}'")]
    UnknownLeague { name: String },
}

/// Failures while loading the declarative configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} not found", path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid {file}: {message}")]
    Invalid { file: &'static str, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ConfigError {
    pub(crate) fn invalid(file: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            file,
            message: message.into(),
        }
    }
}

/// Errors that abort a whole orchestration run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no adapter registered for source '{source_id}'")]
    MissingAdapter { source_id: crate::SourceId },

    #[error("persistence sink unavailable: {message}")]
    SinkUnavailable { message: String },
}
