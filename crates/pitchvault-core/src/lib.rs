//! # Pitchvault Core
//!
//! Extraction orchestration for the pitchvault football-stats warehouse.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Source catalog, scraper-export adapter, adapter registry |
//! | [`circuit_breaker`] | Consecutive-failure breaker for sources and the sink |
//! | [`config`] | YAML configuration resolver |
//! | [`data_source`] | Source adapter trait and fetch types |
//! | [`gateway`] | Persistence gateway trait over the warehouse |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`loaders`] | Historical backfill and daily refresh planning |
//! | [`orchestrator`] | Work-unit scheduler and run summaries |
//! | [`retry`] | Bounded exponential backoff |
//! | [`season`] | Season identifiers |
//! | [`source`] | Source identifiers |
//! | [`throttling`] | Shared request-rate budget |
//! | [`validation`] | Required-field row checks |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pitchvault_core::{config, AdapterRegistry, Orchestrator, RunRequest, Season, Warehouse};
//!
//! let config = config::resolve("config")?;
//! let warehouse = Warehouse::open_default()?;
//! let orchestrator = Orchestrator::new(
//!     &config,
//!     AdapterRegistry::from_config(&config),
//!     Arc::new(warehouse),
//! );
//! let request = RunRequest::from_selection(
//!     &config,
//!     "orchestrate",
//!     &[String::from("understat")],
//!     &[],
//!     vec![Season::parse("2324")?],
//!     true,
//! )?;
//! let summary = orchestrator.run(&request).await?;
//! println!("{} units completed", summary.totals.completed);
//! ```

pub mod adapters;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod loaders;
pub mod orchestrator;
pub mod retry;
pub mod season;
pub mod source;
pub mod throttling;
pub mod validation;

pub use adapters::{AdapterRegistry, ScraperAdapter};
pub use config::{LeagueConfig, ResolvedConfig};
pub use data_source::{
    ExtractedTables, FetchError, FetchErrorKind, FetchRequest, SourceAdapter, TableSpec,
};
pub use error::{ConfigError, OrchestratorError, ValidationError};
pub use gateway::{PersistenceError, PersistenceGateway};
pub use loaders::{DailyPlan, DailyUpdater, HistoricalLoader, HistoricalPlan};
pub use orchestrator::{
    AttemptObserver, AttemptRecord, Orchestrator, RunRequest, RunSummary, SourceSummary,
    UnitError, UnitOutcome, UnitReport, WorkUnit,
};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use season::Season;
pub use source::SourceId;
pub use throttling::{RateLimitConfig, RateLimiter};

pub use pitchvault_warehouse::{
    LoadState, LoadStatus, QueryResult, Row, RunRecord, StatusFilter, StatusKey, StatusUpdate,
    Warehouse, WarehouseConfig, WarehouseError,
};
