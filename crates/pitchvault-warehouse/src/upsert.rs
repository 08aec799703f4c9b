//! Keyed, idempotent row upserts into business tables.
//!
//! Tables are created on first write from the shape of the incoming rows and
//! widened with new columns as later batches bring them. Every table carries
//! `created_at` and `updated_at`; on key conflict all non-key columns are
//! overwritten and `updated_at` is refreshed while `created_at` is kept.

use std::collections::BTreeMap;

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params_from_iter, Connection};
use serde_json::{Map, Value};

use crate::{finalize_transaction, Warehouse, WarehouseError};

/// One record as produced by a source adapter: column name to JSON value.
pub type Row = Map<String, Value>;

const MANAGED_COLUMNS: [&str; 2] = ["created_at", "updated_at"];
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Text,
}

impl ColumnType {
    const fn sql(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Text => "TEXT",
        }
    }

    /// Map an `information_schema` data type back to the types this module
    /// creates.
    fn from_sql(data_type: &str) -> Option<Self> {
        match data_type.to_ascii_uppercase().as_str() {
            "BOOLEAN" => Some(Self::Boolean),
            "BIGINT" => Some(Self::BigInt),
            "DOUBLE" => Some(Self::Double),
            "VARCHAR" | "TEXT" => Some(Self::Text),
            _ => None,
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(number) if number.is_i64() => Some(Self::BigInt),
            Value::Number(_) => Some(Self::Double),
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(Self::Text),
        }
    }

    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (left, right) if left == right => left,
            (Self::BigInt, Self::Double) | (Self::Double, Self::BigInt) => Self::Double,
            _ => Self::Text,
        }
    }
}

/// Check that `name` is safe to splice into SQL as a table or column name.
///
/// # Errors
/// Returns [`WarehouseError::InvalidIdentifier`] unless the name matches
/// `[a-z_][a-z0-9_]*` and is at most 63 characters.
pub fn validate_identifier(name: &str) -> Result<&str, WarehouseError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_');
    let valid_tail = chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');

    if valid_head && valid_tail && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name)
    } else {
        Err(WarehouseError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

impl Warehouse {
    /// Insert `rows` into `table`, updating rows whose `unique_key` already
    /// exists. Returns the number of rows written.
    ///
    /// The whole batch is applied in one transaction; on any failure nothing
    /// from the batch is kept.
    ///
    /// # Errors
    /// Returns an error for invalid identifiers, rows missing a key column,
    /// or any database failure.
    pub fn upsert_rows(
        &self,
        table: &str,
        unique_key: &[String],
        rows: &[Row],
    ) -> Result<u64, WarehouseError> {
        validate_identifier(table)?;
        if unique_key.is_empty() {
            return Err(WarehouseError::Rejected(format!(
                "table '{table}' has no unique key"
            )));
        }
        for column in unique_key {
            validate_identifier(column)?;
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let columns = infer_columns(rows, unique_key)?;
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;

        let result = ensure_table(&connection, table, unique_key, &columns)
            .and_then(|resolved| write_rows(&connection, table, unique_key, &resolved, rows));
        finalize_transaction(&connection, result)
    }
}

fn infer_columns(
    rows: &[Row],
    unique_key: &[String],
) -> Result<Vec<(String, ColumnType)>, WarehouseError> {
    let mut types: BTreeMap<&str, Option<ColumnType>> = BTreeMap::new();

    for (index, row) in rows.iter().enumerate() {
        for column in unique_key {
            if row.get(column).map_or(true, Value::is_null) {
                return Err(WarehouseError::Rejected(format!(
                    "row {index} has no value for key column '{column}'"
                )));
            }
        }

        for (column, value) in row {
            if MANAGED_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            let slot = types.entry(column.as_str()).or_insert(None);
            if let Some(observed) = ColumnType::of(value) {
                *slot = Some(slot.map_or(observed, |current| current.widen(observed)));
            }
        }
    }

    let mut columns = Vec::with_capacity(types.len());
    for (column, column_type) in types {
        validate_identifier(column)?;
        columns.push((column.to_string(), column_type.unwrap_or(ColumnType::Text)));
    }
    Ok(columns)
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// Create `table` if needed and bring its columns in line with the batch.
///
/// Returns the column types the batch must be written with: an existing
/// column keeps its type unless the batch needs a wider one, in which case
/// the column is altered to the widened type first.
fn ensure_table(
    connection: &Connection,
    table: &str,
    unique_key: &[String],
    columns: &[(String, ColumnType)],
) -> Result<Vec<(String, ColumnType)>, WarehouseError> {
    let definitions = columns
        .iter()
        .map(|(name, column_type)| format!("{} {}", quote(name), column_type.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let key = unique_key
        .iter()
        .map(|column| quote(column))
        .collect::<Vec<_>>()
        .join(", ");

    connection.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({definitions}, \
         created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
         updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
         PRIMARY KEY ({key}))",
        quote(table)
    ))?;

    let mut statement = connection.prepare(
        "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = ?",
    )?;
    let existing = statement
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let mut resolved = Vec::with_capacity(columns.len());
    for (name, incoming) in columns {
        let Some(data_type) = existing.get(name) else {
            connection.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote(table),
                quote(name),
                incoming.sql()
            ))?;
            resolved.push((name.clone(), *incoming));
            continue;
        };

        let Some(current) = ColumnType::from_sql(data_type) else {
            return Err(WarehouseError::Rejected(format!(
                "column '{name}' of table '{table}' has unsupported type {data_type}"
            )));
        };
        let widened = current.widen(*incoming);
        if widened != current {
            if unique_key.contains(name) {
                return Err(WarehouseError::Rejected(format!(
                    "key column '{name}' of table '{table}' is {} but the batch needs {}",
                    current.sql(),
                    widened.sql()
                )));
            }
            tracing::info!(
                table,
                column = name.as_str(),
                from = current.sql(),
                to = widened.sql(),
                "widening column type"
            );
            connection
                .execute_batch(&format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE {}",
                    quote(table),
                    quote(name),
                    widened.sql()
                ))
                .map_err(|error| {
                    WarehouseError::Rejected(format!(
                        "column '{name}' of table '{table}' could not be widened to {}: {error}",
                        widened.sql()
                    ))
                })?;
        }
        resolved.push((name.clone(), widened));
    }

    Ok(resolved)
}

fn write_rows(
    connection: &Connection,
    table: &str,
    unique_key: &[String],
    columns: &[(String, ColumnType)],
    rows: &[Row],
) -> Result<u64, WarehouseError> {
    let column_list = columns
        .iter()
        .map(|(name, _)| quote(name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let key_list = unique_key
        .iter()
        .map(|column| quote(column))
        .collect::<Vec<_>>()
        .join(", ");
    let mut assignments = columns
        .iter()
        .filter(|(name, _)| !unique_key.contains(name))
        .map(|(name, _)| format!("{0} = EXCLUDED.{0}", quote(name)))
        .collect::<Vec<_>>();
    assignments.push(String::from("updated_at = now()"));

    let sql = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders}) \
         ON CONFLICT ({key_list}) DO UPDATE SET {}",
        quote(table),
        assignments.join(", ")
    );

    let mut statement = connection.prepare(&sql)?;
    let mut written = 0_u64;
    for row in rows {
        let values = columns
            .iter()
            .map(|(name, column_type)| to_duck_value(row.get(name), *column_type));
        written += statement.execute(params_from_iter(values))? as u64;
    }

    Ok(written)
}

fn to_duck_value(value: Option<&Value>, column_type: ColumnType) -> DuckValue {
    let Some(value) = value else {
        return DuckValue::Null;
    };

    match (value, column_type) {
        (Value::Null, _) => DuckValue::Null,
        (Value::Bool(flag), ColumnType::Boolean) => DuckValue::Boolean(*flag),
        (Value::Number(number), ColumnType::BigInt) => number
            .as_i64()
            .map_or_else(|| DuckValue::Text(number.to_string()), DuckValue::BigInt),
        (Value::Number(number), ColumnType::Double) => number
            .as_f64()
            .map_or_else(|| DuckValue::Text(number.to_string()), DuckValue::Double),
        (Value::String(text), _) => DuckValue::Text(text.clone()),
        (other, _) => DuckValue::Text(other.to_string()),
    }
}
