use pitchvault_core::{Orchestrator, ResolvedConfig, RunRequest, Season};

use crate::cli::OrchestrateArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &OrchestrateArgs,
    config: &ResolvedConfig,
    orchestrator: &Orchestrator,
) -> Result<CommandResult, CliError> {
    let seasons = args
        .seasons
        .iter()
        .map(|value| Season::parse(value))
        .collect::<Result<Vec<_>, _>>()?;

    let request = RunRequest::from_selection(
        config,
        "orchestrate",
        &args.selection.sources,
        &args.selection.leagues,
        seasons,
        !args.no_skip_completed,
    )?;

    let summary = orchestrator.run(&request).await?;
    Ok(CommandResult {
        failed_units: summary.totals.failed,
        data: serde_json::to_value(&summary)?,
    })
}
