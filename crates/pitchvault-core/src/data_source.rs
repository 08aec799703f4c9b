//! Source adapter contract.
//!
//! Every football data source is reached through a [`SourceAdapter`]: it
//! declares the tables it produces (with their business keys) and fetches
//! rows for one league and season.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use pitchvault_warehouse::Row;

use crate::retry::Retryable;
use crate::{Season, SourceId};

/// Rows returned by one fetch, keyed by destination table.
pub type ExtractedTables = BTreeMap<String, Vec<Row>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Timeouts, throttling, temporary server errors. Worth retrying.
    Transient,
    /// Bad league/season combination, auth or schema changes. Not retried.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Transient => "fetch.transient",
            FetchErrorKind::Permanent => "fetch.permanent",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

impl Retryable for FetchError {
    fn retryable(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// A destination table and the columns that identify its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub unique_key: Vec<String>,
    /// Columns a row must carry to be loaded: the key plus `data_source`,
    /// and anything added with [`TableSpec::requiring`].
    pub required_fields: Vec<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, unique_key: &[&str]) -> Self {
        let unique_key = unique_key
            .iter()
            .map(|column| column.to_string())
            .collect::<Vec<_>>();
        let mut required_fields = unique_key.clone();
        required_fields.push(String::from("data_source"));

        Self {
            name: name.into(),
            unique_key,
            required_fields,
        }
    }

    pub fn requiring(mut self, column: &str) -> Self {
        if !self.required_fields.iter().any(|field| field == column) {
            self.required_fields.push(column.to_string());
        }
        self
    }
}

/// One fetch for a league and season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// League name as configured; stamped on every row.
    pub league: String,
    /// The source's own identifier for the league, `None` when the source
    /// does not cover it.
    pub league_id: Option<String>,
    pub season: Season,
    /// Tables to fetch; empty means every declared table.
    pub tables: Vec<String>,
}

pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    /// Tables this source produces, in load order.
    fn declared_tables(&self) -> &[TableSpec];

    fn table(&self, name: &str) -> Option<&TableSpec> {
        self.declared_tables().iter().find(|table| table.name == name)
    }

    /// Fetch rows for `request`.
    ///
    /// # Errors
    /// Returns a transient [`FetchError`] for failures worth retrying and a
    /// permanent one otherwise.
    fn fetch<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ExtractedTables, FetchError>> + Send + 'a>>;
}
