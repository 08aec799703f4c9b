use pitchvault_core::{HistoricalLoader, HistoricalPlan, Orchestrator, ResolvedConfig};

use crate::cli::HistoricalArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &HistoricalArgs,
    config: &ResolvedConfig,
    orchestrator: &Orchestrator,
) -> Result<CommandResult, CliError> {
    let plan = HistoricalPlan {
        start_year: args.start_year,
        end_year: args.end_year,
        sources: args.selection.sources.clone(),
        leagues: args.selection.leagues.clone(),
        skip_completed: !args.no_skip_completed,
    };

    let summary = HistoricalLoader::new(orchestrator).run(config, &plan).await?;
    Ok(CommandResult {
        failed_units: summary.totals.failed,
        data: serde_json::to_value(&summary)?,
    })
}
