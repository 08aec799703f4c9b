//! # Pitchvault Warehouse
//!
//! DuckDB-backed persistence for the football statistics loader.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `load_status` | One record per source, table, league and season unit |
//! | `load_runs` | One summary record per orchestration run |
//! | `<source>_<table>` | Business tables, created from the rows they receive |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_load_progress` | Unit counts per status for each source table |
//! | `vw_failed_loads` | Failed units with their last error |
//!
//! ```rust,no_run
//! use pitchvault_warehouse::{StatusKey, StatusUpdate, Warehouse};
//!
//! let warehouse = Warehouse::open_default()?;
//! let key = StatusKey::new("fbref", "fbref_schedule", "ENG-Premier League", "2324");
//! warehouse.record_status(&key, &StatusUpdate::in_progress())?;
//! # Ok::<(), pitchvault_warehouse::WarehouseError>(())
//! ```

pub mod duckdb;
pub mod migrations;
pub mod status;
pub mod upsert;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params, Connection, ToSql};
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

pub use duckdb::{ConnectionPool, PooledConnection};
pub use status::{LoadState, LoadStatus, StatusFilter, StatusKey, StatusUpdate};
pub use upsert::{validate_identifier, Row};

/// Errors raised by warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Timestamp(#[from] time::error::Format),

    /// Table or column name outside `[a-z_][a-z0-9_]*`.
    #[error("invalid SQL identifier '{name}'")]
    InvalidIdentifier { name: String },

    /// Request was refused before reaching the database.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Where the warehouse lives on disk.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for pitchvault data.
    pub pitchvault_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept by the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let pitchvault_home = resolve_pitchvault_home();
        let db_path = pitchvault_home.join("warehouse.duckdb");
        Self {
            pitchvault_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Use an explicit database file instead of the home-relative default.
    pub fn at_path(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let pitchvault_home = db_path
            .parent()
            .map_or_else(resolve_pitchvault_home, Path::to_path_buf);
        Self {
            pitchvault_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Result of a read-only query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub truncated: bool,
}

/// Summary of one orchestration run, as stored in `load_runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub command: String,
    pub started_at: String,
    pub finished_at: String,
    pub units_total: u64,
    pub units_completed: u64,
    pub units_failed: u64,
    pub units_skipped: u64,
    pub rows_written: u64,
}

/// Handle to the warehouse database.
#[derive(Clone)]
pub struct Warehouse {
    pool: ConnectionPool,
}

impl Warehouse {
    /// Open the warehouse at the default location.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open the warehouse, creating parent directories, tables and views.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { pool };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending migrations and refresh the monitoring views.
    ///
    /// # Errors
    /// Returns an error if a migration or view definition fails.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Cheap liveness probe.
    ///
    /// # Errors
    /// Returns an error if a connection cannot run a trivial query.
    pub fn ping(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        let _: i32 = connection.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(())
    }

    /// Store the summary of a finished run.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_run(&self, run: &RunRecord) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute(
            "INSERT OR REPLACE INTO load_runs (
                run_id, command, started_at, finished_at, units_total,
                units_completed, units_failed, units_skipped, rows_written
            ) VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?)",
            params![
                run.run_id,
                run.command,
                run.started_at,
                run.finished_at,
                to_sql_count(run.units_total),
                to_sql_count(run.units_completed),
                to_sql_count(run.units_failed),
                to_sql_count(run.units_skipped),
                to_sql_count(run.rows_written),
            ],
        )?;
        Ok(())
    }

    /// Run a single read-only statement and return at most `max_rows` rows.
    ///
    /// # Errors
    /// Returns [`WarehouseError::Rejected`] for anything other than one
    /// SELECT-like statement, or a database error.
    pub fn select(&self, sql: &str, max_rows: usize) -> Result<QueryResult, WarehouseError> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if !is_select_like(sql) || sql.contains(';') {
            return Err(WarehouseError::Rejected(String::from(
                "only a single SELECT or WITH statement is accepted",
            )));
        }

        let connection = self.pool.acquire()?;
        execute_select(&connection, sql, max_rows.max(1))
    }
}

/// Current UTC time in the layout `DuckDB` casts to `TIMESTAMP`.
///
/// # Errors
/// Returns an error if the timestamp cannot be formatted.
pub fn now_timestamp() -> Result<String, WarehouseError> {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
    );
    Ok(OffsetDateTime::now_utc().format(format)?)
}

pub(crate) fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(first_keyword.as_str(), "SELECT" | "WITH")
}

fn execute_select(
    connection: &Connection,
    sql: &str,
    max_rows: usize,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only populated once the statement has run.
    let _ = statement.query([] as [&dyn ToSql; 0])?;
    let columns = statement.column_names();
    let column_count = columns.len();

    let mut cursor = statement.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.next()? {
        if rows.len() >= max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value: DuckValue = row.get(index)?;
            values.push(to_json_value(value));
        }
        rows.push(values);
    }

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
    })
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::HugeInt(value) => i64::try_from(value)
            .map_or_else(|_| Value::String(value.to_string()), |v| Value::Number(Number::from(v))),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        other => Value::String(format!("{other:?}")),
    }
}

fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn resolve_pitchvault_home() -> PathBuf {
    if let Some(path) = env::var_os("PITCHVAULT_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".pitchvault");
    }

    PathBuf::from(".pitchvault")
}
