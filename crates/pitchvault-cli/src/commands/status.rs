use pitchvault_core::Warehouse;
use serde_json::json;

use crate::cli::StatusArgs;
use crate::error::CliError;

use super::{status_filter, CommandResult};

const SUMMARY_QUERY: &str =
    "SELECT * FROM vw_load_progress ORDER BY data_source, table_name";
const SUMMARY_MAX_ROWS: usize = 10_000;

pub fn run(args: &StatusArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    if args.summary {
        let progress = warehouse.select(SUMMARY_QUERY, SUMMARY_MAX_ROWS)?;
        return Ok(CommandResult::ok(serde_json::to_value(&progress)?));
    }

    let filter = status_filter(&args.filter)?;
    let rows = warehouse.list_status(&filter)?;
    Ok(CommandResult::ok(json!({
        "count": rows.len(),
        "rows": rows,
    })))
}
