use pitchvault_core::{StatusFilter, Warehouse};
use serde_json::json;

use crate::cli::ResetArgs;
use crate::error::CliError;

use super::{status_filter, CommandResult};

pub fn run(args: &ResetArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let filter = status_filter(&args.filter)?;
    if filter == StatusFilter::default() && !args.all {
        return Err(CliError::Command(String::from(
            "refusing to reset every status row without --all",
        )));
    }

    let reset = warehouse.reset_status(&filter)?;
    tracing::info!(reset, "status rows moved back to pending");
    Ok(CommandResult::ok(json!({ "reset": reset })))
}
