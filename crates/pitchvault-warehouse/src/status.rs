//! Per-unit load status records.
//!
//! One row per `(data_source, table_name, league, season)`. Each write is a
//! whole-record replacement computed inside a transaction, so a reader never
//! observes a half-applied transition.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ::duckdb::{params, Connection, OptionalExt, ToSql};
use serde::{Deserialize, Serialize};

use crate::{finalize_transaction, now_timestamp, Warehouse, WarehouseError};

/// Lifecycle of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl LoadState {
    pub const ALL: [Self; 4] = [Self::Pending, Self::InProgress, Self::Completed, Self::Failed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed records carry a completion timestamp.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for LoadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadState {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(WarehouseError::Rejected(format!(
                "unknown load status '{other}'"
            ))),
        }
    }
}

/// Identity of one unit of work in the status table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusKey {
    pub data_source: String,
    pub table_name: String,
    pub league: String,
    pub season: String,
}

impl StatusKey {
    pub fn new(
        data_source: impl Into<String>,
        table_name: impl Into<String>,
        league: impl Into<String>,
        season: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            table_name: table_name.into(),
            league: league.into(),
            season: season.into(),
        }
    }
}

impl Display for StatusKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.data_source, self.table_name, self.league, self.season
        )
    }
}

/// A requested transition for one status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: LoadState,
    pub rows_processed: Option<u64>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    #[must_use]
    pub fn in_progress() -> Self {
        Self {
            state: LoadState::InProgress,
            rows_processed: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn completed(rows_processed: u64) -> Self {
        Self {
            state: LoadState::Completed,
            rows_processed: Some(rows_processed),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            state: LoadState::Failed,
            rows_processed: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Stored status of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStatus {
    #[serde(flatten)]
    pub key: StatusKey,
    pub status: LoadState,
    pub rows_processed: u64,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub last_updated: String,
}

/// Narrows status listings and resets. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    pub data_source: Option<String>,
    pub table_name: Option<String>,
    pub league: Option<String>,
    pub season: Option<String>,
    pub status: Option<LoadState>,
}

impl StatusFilter {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        let columns = [
            ("data_source", self.data_source.as_deref()),
            ("table_name", self.table_name.as_deref()),
            ("league", self.league.as_deref()),
            ("season", self.season.as_deref()),
            ("status", self.status.map(LoadState::as_str)),
        ];
        for (column, value) in columns {
            if let Some(value) = value {
                clauses.push(format!("{column} = ?"));
                values.push(value.to_string());
            }
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

const SELECT_STATUS: &str = "SELECT data_source, table_name, league, season, status, \
     rows_processed, error_message, CAST(started_at AS VARCHAR), \
     CAST(completed_at AS VARCHAR), CAST(last_updated AS VARCHAR) FROM load_status";

impl Warehouse {
    /// Apply a status transition as one atomic record replacement.
    ///
    /// `started_at` is stamped when a unit enters `in_progress` and carried
    /// over otherwise. `completed_at` is present only for terminal states and
    /// `error_message` only for `failed`.
    ///
    /// # Errors
    /// Returns an error if the transaction cannot be written.
    pub fn record_status(
        &self,
        key: &StatusKey,
        update: &StatusUpdate,
    ) -> Result<(), WarehouseError> {
        let now = now_timestamp()?;
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;

        let result = write_status(&connection, key, update, &now);
        finalize_transaction(&connection, result)
    }

    /// Read the stored status for one unit, if any.
    ///
    /// # Errors
    /// Returns an error if the status table cannot be read.
    pub fn load_status(&self, key: &StatusKey) -> Result<Option<LoadStatus>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let sql = format!(
            "{SELECT_STATUS} WHERE data_source = ? AND table_name = ? AND league = ? AND season = ?"
        );
        let mut statement = connection.prepare(&sql)?;
        let status = statement
            .query_row(
                params![key.data_source, key.table_name, key.league, key.season],
                read_status_row,
            )
            .optional()?;

        status.transpose()
    }

    /// List status records matching `filter`, ordered by key.
    ///
    /// # Errors
    /// Returns an error if the status table cannot be read.
    pub fn list_status(&self, filter: &StatusFilter) -> Result<Vec<LoadStatus>, WarehouseError> {
        let (where_clause, values) = filter.where_clause();
        let sql = format!(
            "{SELECT_STATUS}{where_clause} ORDER BY data_source, table_name, league, season"
        );

        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(&sql)?;
        let params = values.iter().map(|value| value as &dyn ToSql).collect::<Vec<_>>();
        let rows = statement.query_map(params.as_slice(), read_status_row)?;

        let mut output = Vec::new();
        for row in rows {
            output.push(row??);
        }
        Ok(output)
    }

    /// Move matching records back to `pending` so the next run picks them up.
    /// Returns the number of records reset.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn reset_status(&self, filter: &StatusFilter) -> Result<usize, WarehouseError> {
        let (where_clause, values) = filter.where_clause();
        let now = now_timestamp()?;
        let sql = format!(
            "UPDATE load_status SET status = 'pending', error_message = NULL, \
             completed_at = NULL, last_updated = CAST(? AS TIMESTAMP){where_clause}"
        );

        let mut params: Vec<&dyn ToSql> = vec![&now];
        params.extend(values.iter().map(|value| value as &dyn ToSql));

        let connection = self.pool.acquire()?;
        let changed = connection.execute(&sql, params.as_slice())?;
        Ok(changed)
    }
}

fn write_status(
    connection: &Connection,
    key: &StatusKey,
    update: &StatusUpdate,
    now: &str,
) -> Result<(), WarehouseError> {
    let previous_started: Option<String> = connection
        .query_row(
            "SELECT CAST(started_at AS VARCHAR) FROM load_status \
             WHERE data_source = ? AND table_name = ? AND league = ? AND season = ?",
            params![key.data_source, key.table_name, key.league, key.season],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    let started_at = match update.state {
        LoadState::InProgress => Some(now.to_string()),
        _ => previous_started,
    };
    let completed_at = update.state.is_terminal().then(|| now.to_string());
    let error_message = match update.state {
        LoadState::Failed => update.error_message.clone(),
        _ => None,
    };
    let rows_processed = i64::try_from(update.rows_processed.unwrap_or(0)).unwrap_or(i64::MAX);

    connection.execute(
        "INSERT OR REPLACE INTO load_status (
            data_source, table_name, league, season, status, rows_processed,
            error_message, started_at, completed_at, last_updated
        ) VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
        params![
            key.data_source,
            key.table_name,
            key.league,
            key.season,
            update.state.as_str(),
            rows_processed,
            error_message,
            started_at,
            completed_at,
            now,
        ],
    )?;

    Ok(())
}

fn read_status_row(
    row: &::duckdb::Row<'_>,
) -> Result<Result<LoadStatus, WarehouseError>, ::duckdb::Error> {
    let status: String = row.get(4)?;
    let rows_processed: i64 = row.get(5)?;
    let key = StatusKey {
        data_source: row.get(0)?,
        table_name: row.get(1)?,
        league: row.get(2)?,
        season: row.get(3)?,
    };
    let error_message: Option<String> = row.get(6)?;
    let started_at: Option<String> = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;
    let last_updated: String = row.get(9)?;

    Ok(status.parse::<LoadState>().map(|status| LoadStatus {
        key,
        status,
        rows_processed: u64::try_from(rows_processed).unwrap_or(0),
        error_message,
        started_at,
        completed_at,
        last_updated,
    }))
}
