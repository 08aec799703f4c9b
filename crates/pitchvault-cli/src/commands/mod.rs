mod daily;
mod historical;
mod orchestrate;
mod reset;
mod status;

use std::sync::Arc;

use pitchvault_core::{
    AdapterRegistry, LoadState, Orchestrator, ResolvedConfig, StatusFilter, Warehouse,
    WarehouseConfig,
};
use serde_json::Value;

use crate::cli::{Cli, Command, StatusFilterArgs};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// Work units that ended up failed, for `--strict`.
    pub failed_units: usize,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            failed_units: 0,
        }
    }
}

pub async fn run(cli: &Cli, config: Option<&ResolvedConfig>) -> Result<CommandResult, CliError> {
    let warehouse = open_warehouse(cli)?;

    match (&cli.command, config) {
        (Command::Orchestrate(args), Some(config)) => {
            orchestrate::run(args, config, &orchestrator(config, warehouse)).await
        }
        (Command::Historical(args), Some(config)) => {
            historical::run(args, config, &orchestrator(config, warehouse)).await
        }
        (Command::Daily(args), Some(config)) => {
            daily::run(args, config, &orchestrator(config, warehouse)).await
        }
        (Command::Status(args), _) => status::run(args, &warehouse),
        (Command::Reset(args), _) => reset::run(args, &warehouse),
        (_, None) => Err(CliError::Command(String::from(
            "configuration was not loaded for a run command",
        ))),
    }
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.db_path {
        Some(path) => WarehouseConfig::at_path(path.clone()),
        None => WarehouseConfig::default(),
    };
    let warehouse = Warehouse::open(config)?;
    tracing::debug!(db_path = %warehouse.db_path().display(), "warehouse opened");
    Ok(warehouse)
}

fn orchestrator(config: &ResolvedConfig, warehouse: Warehouse) -> Orchestrator {
    Orchestrator::new(config, AdapterRegistry::from_config(config), Arc::new(warehouse))
}

fn status_filter(args: &StatusFilterArgs) -> Result<StatusFilter, CliError> {
    let status = args
        .state
        .as_deref()
        .map(|value| {
            value
                .parse::<LoadState>()
                .map_err(|error| CliError::Command(error.to_string()))
        })
        .transpose()?;

    Ok(StatusFilter {
        data_source: args.source.clone(),
        table_name: args.table.clone(),
        league: args.league.clone(),
        season: args.season.clone(),
        status,
    })
}
