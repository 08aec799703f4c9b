//! Monitoring views over the load-status table.

use ::duckdb::Connection;

/// Create the operator-facing monitoring views.
///
/// - `vw_load_progress`: unit counts per status and rows written, per source and table
/// - `vw_failed_loads`: failed units with their last error, newest first
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_load_progress AS
SELECT
    data_source,
    table_name,
    COUNT(*) AS units,
    COUNT(*) FILTER (WHERE status = 'completed') AS completed,
    COUNT(*) FILTER (WHERE status = 'failed') AS failed,
    COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
    COUNT(*) FILTER (WHERE status = 'pending') AS pending,
    SUM(rows_processed)::BIGINT AS rows_processed
FROM load_status
GROUP BY data_source, table_name;

CREATE OR REPLACE VIEW vw_failed_loads AS
SELECT
    data_source,
    table_name,
    league,
    season,
    error_message,
    completed_at
FROM load_status
WHERE status = 'failed'
ORDER BY completed_at DESC;
",
    )?;

    Ok(())
}
