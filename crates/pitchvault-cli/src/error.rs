use pitchvault_core::{ConfigError, OrchestratorError, ValidationError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("command error: {0}")]
    Command(String),

    #[error("strict mode failed: {failed_units} work unit(s) failed")]
    StrictModeViolation { failed_units: usize },

    #[error("failed to initialise logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Command(_) => 2,
            Self::Orchestrator(error) => match error {
                OrchestratorError::SinkUnavailable { .. } => 3,
                OrchestratorError::Config(_)
                | OrchestratorError::Validation(_)
                | OrchestratorError::MissingAdapter { .. } => 2,
            },
            Self::Warehouse(_) => 3,
            Self::StrictModeViolation { .. } => 5,
            Self::Logging(_) | Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_failure_category() {
        assert_eq!(CliError::from(ValidationError::EmptySeasons).exit_code(), 2);
        assert_eq!(
            CliError::from(OrchestratorError::SinkUnavailable {
                message: String::from("connection lost"),
            })
            .exit_code(),
            3
        );
        assert_eq!(
            CliError::StrictModeViolation { failed_units: 2 }.exit_code(),
            5
        );
        assert_eq!(
            CliError::from(std::io::Error::other("broken pipe")).exit_code(),
            10
        );
    }
}
