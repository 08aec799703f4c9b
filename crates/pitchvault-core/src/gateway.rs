//! Persistence gateway: the storage sink as seen by the orchestrator.

use pitchvault_warehouse::{
    LoadStatus, RunRecord, StatusKey, StatusUpdate, Warehouse, WarehouseError,
};
use thiserror::Error;

use crate::Row;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// The sink could not be reached at all.
    #[error("sink unreachable: {0}")]
    Unreachable(String),
}

/// Writes business rows and load-status records.
///
/// Status writes replace the whole record for a key, so repeating a write
/// leaves the same observable state.
pub trait PersistenceGateway: Send + Sync {
    fn ping(&self) -> Result<(), PersistenceError>;

    fn load_status(&self, key: &StatusKey) -> Result<Option<LoadStatus>, PersistenceError>;

    /// Insert or update `rows` keyed by `unique_key`; returns rows written.
    /// The batch is applied atomically.
    fn upsert(
        &self,
        table: &str,
        unique_key: &[String],
        rows: &[Row],
    ) -> Result<u64, PersistenceError>;

    fn record_status(&self, key: &StatusKey, update: &StatusUpdate)
        -> Result<(), PersistenceError>;

    fn record_run(&self, run: &RunRecord) -> Result<(), PersistenceError>;
}

impl PersistenceGateway for Warehouse {
    fn ping(&self) -> Result<(), PersistenceError> {
        Warehouse::ping(self).map_err(|error| PersistenceError::Unreachable(error.to_string()))
    }

    fn load_status(&self, key: &StatusKey) -> Result<Option<LoadStatus>, PersistenceError> {
        Ok(Warehouse::load_status(self, key)?)
    }

    fn upsert(
        &self,
        table: &str,
        unique_key: &[String],
        rows: &[Row],
    ) -> Result<u64, PersistenceError> {
        Ok(self.upsert_rows(table, unique_key, rows)?)
    }

    fn record_status(
        &self,
        key: &StatusKey,
        update: &StatusUpdate,
    ) -> Result<(), PersistenceError> {
        Ok(Warehouse::record_status(self, key, update)?)
    }

    fn record_run(&self, run: &RunRecord) -> Result<(), PersistenceError> {
        Ok(Warehouse::record_run(self, run)?)
    }
}
