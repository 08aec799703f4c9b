use pitchvault_core::{DailyPlan, DailyUpdater, Orchestrator, ResolvedConfig, Season};
use serde_json::json;
use time::OffsetDateTime;

use crate::cli::DailyArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &DailyArgs,
    config: &ResolvedConfig,
    orchestrator: &Orchestrator,
) -> Result<CommandResult, CliError> {
    let plan = DailyPlan {
        season: args.season.as_deref().map(Season::parse).transpose()?,
        sources: args.selection.sources.clone(),
        leagues: args.selection.leagues.clone(),
    };

    let today = OffsetDateTime::now_utc().date();
    let summaries = DailyUpdater::new(orchestrator)
        .run(config, &plan, today)
        .await?;

    Ok(CommandResult {
        failed_units: summaries.iter().map(|summary| summary.totals.failed).sum(),
        data: json!({ "runs": summaries }),
    })
}
