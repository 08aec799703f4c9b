use serde_json::Value;

use crate::{Row, TableSpec};

/// Rows that passed the required-field check, and how many did not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedRows {
    pub valid: Vec<Row>,
    pub rejected: u64,
}

/// Keep only rows that carry every required field of `table`.
///
/// A field counts as missing when it is absent, null, or a blank string.
pub fn validate_rows(table: &TableSpec, rows: Vec<Row>) -> ValidatedRows {
    let mut validated = ValidatedRows {
        valid: Vec::with_capacity(rows.len()),
        rejected: 0,
    };

    for row in rows {
        let complete = table
            .required_fields
            .iter()
            .all(|field| is_present(row.get(field)));
        if complete {
            validated.valid.push(row);
        } else {
            validated.rejected += 1;
        }
    }

    validated
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    }
}
