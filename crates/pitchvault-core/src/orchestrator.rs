//! Work-unit scheduler.
//!
//! A run walks sources, then leagues, then seasons, then each source's
//! declared tables. Every (source, table, league, season) combination is one
//! [`WorkUnit`] with its own load-status row:
//!
//! ```text
//!  pending ──> in_progress ──> completed
//!                   │
//!                   └────────> failed
//!  completed ──(no skip)──> in_progress
//!  failed    ─────────────> in_progress
//! ```
//!
//! A unit's failure is recorded on its status row and never stops the run.
//! Only a lost persistence sink aborts a run.

use std::sync::Arc;
use std::time::Instant;

use pitchvault_warehouse::{
    now_timestamp, LoadState, RunRecord, StatusKey, StatusUpdate,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::adapters::AdapterRegistry;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::{LeagueConfig, ResolvedConfig};
use crate::gateway::{PersistenceError, PersistenceGateway};
use crate::retry::{run_with_retry, AttemptEvent, RetryError, RetryPolicy};
use crate::validation::validate_rows;
use crate::{
    ExtractedTables, FetchError, FetchRequest, OrchestratorError, Season, SourceAdapter, SourceId,
    ValidationError,
};

/// One extraction task: a single table of one source for a league and season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub source: SourceId,
    pub table: String,
    pub league: String,
    /// The source's identifier for the league, if the source covers it.
    pub league_id: Option<String>,
    pub season: Season,
}

impl WorkUnit {
    pub fn status_key(&self) -> StatusKey {
        StatusKey::new(
            self.source.as_str(),
            self.table.as_str(),
            self.league.as_str(),
            self.season.as_str(),
        )
    }
}

/// What to run in one orchestrator pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Label stored with the run record, e.g. `orchestrate` or `daily`.
    pub command: String,
    pub sources: Vec<SourceId>,
    pub leagues: Vec<LeagueConfig>,
    pub seasons: Vec<Season>,
    pub skip_completed: bool,
}

impl RunRequest {
    /// Resolve operator selections against `config`.
    ///
    /// Empty `sources` or `leagues` select everything enabled in config.
    pub fn from_selection(
        config: &ResolvedConfig,
        command: impl Into<String>,
        sources: &[String],
        leagues: &[String],
        seasons: Vec<Season>,
        skip_completed: bool,
    ) -> Result<Self, ValidationError> {
        if seasons.is_empty() {
            return Err(ValidationError::EmptySeasons);
        }

        Ok(Self {
            command: command.into(),
            sources: config.select_sources(sources)?,
            leagues: config.select_leagues(leagues)?,
            seasons,
            skip_completed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed,
    Failed,
    Skipped,
}

/// Result of processing one work unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub source: SourceId,
    pub table: String,
    pub league: String,
    pub season: Season,
    pub outcome: UnitOutcome,
    pub attempts: u32,
    pub rows_written: u64,
    pub rows_rejected: u64,
    /// Set when the unit resumed an `in_progress` row left by an earlier run.
    pub resumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// A status read or write that failed; the status table may not reflect
    /// this unit's outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_write_error: Option<String>,
}

impl UnitReport {
    fn new(unit: &WorkUnit, outcome: UnitOutcome) -> Self {
        Self {
            source: unit.source,
            table: unit.table.clone(),
            league: unit.league.clone(),
            season: unit.season.clone(),
            outcome,
            attempts: 0,
            rows_written: 0,
            rows_rejected: 0,
            resumed: false,
            error: None,
            status_write_error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceId>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows_written: u64,
}

impl SourceSummary {
    fn add(&mut self, report: &UnitReport) {
        self.total += 1;
        self.rows_written += report.rows_written;
        match report.outcome {
            UnitOutcome::Completed => self.completed += 1,
            UnitOutcome::Failed => self.failed += 1,
            UnitOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Everything one orchestrator pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub command: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub totals: SourceSummary,
    pub sources: Vec<SourceSummary>,
    pub units: Vec<UnitReport>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0
    }

    fn tally(units: &[UnitReport]) -> (SourceSummary, Vec<SourceSummary>) {
        let mut totals = SourceSummary::default();
        let mut sources: Vec<SourceSummary> = Vec::new();
        for report in units {
            totals.add(report);
            match sources
                .iter_mut()
                .find(|summary| summary.source == Some(report.source))
            {
                Some(summary) => summary.add(report),
                None => {
                    let mut summary = SourceSummary {
                        source: Some(report.source),
                        ..SourceSummary::default()
                    };
                    summary.add(report);
                    sources.push(summary);
                }
            }
        }
        (totals, sources)
    }
}

/// Why a unit ended up `failed`.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Fetch(#[from] RetryError<FetchError>),

    #[error("failed to upsert table '{table}': {source}")]
    Persistence {
        table: String,
        #[source]
        source: PersistenceError,
    },

    #[error("{source_id} returned undeclared table '{table}'")]
    UndeclaredTable { source_id: SourceId, table: String },
}

/// One attempt of one unit's fetch, as seen by an [`AttemptObserver`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub key: StatusKey,
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: Option<String>,
    pub will_retry: bool,
}

pub type AttemptObserver = Arc<dyn Fn(&AttemptRecord) + Send + Sync>;

pub struct Orchestrator {
    adapters: AdapterRegistry,
    gateway: Arc<dyn PersistenceGateway>,
    retry: RetryPolicy,
    sink_failure_threshold: u32,
    observer: Option<AttemptObserver>,
}

impl Orchestrator {
    pub fn new(
        config: &ResolvedConfig,
        adapters: AdapterRegistry,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            adapters,
            gateway,
            retry: config.retry.clone(),
            sink_failure_threshold: config.sink_failure_threshold,
            observer: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_observer(mut self, observer: AttemptObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Process every work unit of `request` in order.
    ///
    /// # Errors
    /// Fails before any unit runs when a requested source has no adapter or
    /// the sink does not answer, and mid-run with
    /// [`OrchestratorError::SinkUnavailable`] once status reads and writes
    /// keep failing.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, OrchestratorError> {
        let mut adapters = Vec::with_capacity(request.sources.len());
        for source in &request.sources {
            let adapter = self
                .adapters
                .get(*source)
                .ok_or(OrchestratorError::MissingAdapter { source_id: *source })?;
            adapters.push(adapter);
        }

        self.gateway
            .ping()
            .map_err(|error| OrchestratorError::SinkUnavailable {
                message: error.to_string(),
            })?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = now_timestamp().unwrap_or_default();
        let clock = Instant::now();
        let sink_breaker = CircuitBreaker::new(
            "persistence",
            CircuitBreakerConfig {
                failure_threshold: self.sink_failure_threshold,
                open_timeout: None,
            },
        );

        tracing::info!(
            run_id = %run_id,
            command = %request.command,
            sources = request.sources.len(),
            leagues = request.leagues.len(),
            seasons = request.seasons.len(),
            skip_completed = request.skip_completed,
            "starting run"
        );

        let mut units = Vec::new();
        for adapter in &adapters {
            for league in &request.leagues {
                for season in &request.seasons {
                    for table in adapter.declared_tables() {
                        if sink_breaker.is_open() {
                            tracing::error!(
                                run_id = %run_id,
                                processed = units.len(),
                                "persistence sink lost, aborting run"
                            );
                            return Err(OrchestratorError::SinkUnavailable {
                                message: format!(
                                    "{} consecutive status failures after {} units",
                                    sink_breaker.consecutive_failures(),
                                    units.len()
                                ),
                            });
                        }

                        let unit = WorkUnit {
                            source: adapter.id(),
                            table: table.name.clone(),
                            league: league.name.clone(),
                            league_id: league.id_for(adapter.id()).map(str::to_string),
                            season: season.clone(),
                        };
                        let report = self
                            .run_unit(adapter.as_ref(), &unit, request.skip_completed, &sink_breaker)
                            .await;
                        units.push(report);
                    }
                }
            }
        }

        let (totals, sources) = RunSummary::tally(&units);
        let summary = RunSummary {
            run_id,
            command: request.command.clone(),
            started_at,
            finished_at: now_timestamp().unwrap_or_default(),
            duration_ms: clock.elapsed().as_millis() as u64,
            totals,
            sources,
            units,
        };

        for source in &summary.sources {
            tracing::info!(
                source = ?source.source,
                total = source.total,
                completed = source.completed,
                failed = source.failed,
                skipped = source.skipped,
                rows = source.rows_written,
                "source finished"
            );
        }
        tracing::info!(
            run_id = %summary.run_id,
            completed = summary.totals.completed,
            failed = summary.totals.failed,
            skipped = summary.totals.skipped,
            rows = summary.totals.rows_written,
            duration_ms = summary.duration_ms,
            "run finished"
        );

        if let Err(error) = self.gateway.record_run(&run_record(&summary)) {
            tracing::warn!(run_id = %summary.run_id, error = %error, "failed to record run");
        }

        Ok(summary)
    }

    async fn run_unit(
        &self,
        adapter: &dyn SourceAdapter,
        unit: &WorkUnit,
        skip_completed: bool,
        sink_breaker: &CircuitBreaker,
    ) -> UnitReport {
        let key = unit.status_key();

        // Only status writes close the sink breaker; a readable but
        // unwritable status table still counts as lost.
        let prior = match self.gateway.load_status(&key) {
            Ok(prior) => prior,
            Err(error) => {
                sink_breaker.record_failure();
                tracing::error!(unit = %key, error = %error, "failed to read load status");
                let mut report = UnitReport::new(unit, UnitOutcome::Failed);
                report.error = Some(format!("could not read load status: {error}"));
                report.status_write_error = Some(error.to_string());
                return report;
            }
        };

        let mut report = UnitReport::new(unit, UnitOutcome::Failed);
        match prior.as_ref().map(|status| status.status) {
            Some(LoadState::Completed) if skip_completed => {
                tracing::debug!(unit = %key, "already completed, skipping");
                report.outcome = UnitOutcome::Skipped;
                return report;
            }
            Some(LoadState::InProgress) => {
                tracing::warn!(unit = %key, "found abandoned in-progress unit, reprocessing");
                report.resumed = true;
            }
            _ => {}
        }

        if let Err(error) = self.gateway.record_status(&key, &StatusUpdate::in_progress()) {
            sink_breaker.record_failure();
            tracing::error!(unit = %key, error = %error, "failed to mark unit in progress");
            report.error = Some(format!("could not mark unit in progress: {error}"));
            report.status_write_error = Some(error.to_string());
            return report;
        }
        sink_breaker.record_success();

        tracing::info!(unit = %key, "processing unit");
        let result = match self.fetch(adapter, unit, &key, &mut report).await {
            Ok(extracted) => self.load(adapter, &key, extracted, &mut report),
            Err(error) => Err(error),
        };

        let update = match &result {
            Ok(rows) => {
                report.outcome = UnitOutcome::Completed;
                report.rows_written = *rows;
                tracing::info!(unit = %key, rows, attempts = report.attempts, "unit completed");
                StatusUpdate::completed(*rows)
            }
            Err(error) => {
                report.outcome = UnitOutcome::Failed;
                report.error = Some(error.to_string());
                tracing::error!(
                    unit = %key,
                    source = %unit.source,
                    table = %unit.table,
                    league = %unit.league,
                    season = %unit.season,
                    attempts = report.attempts,
                    error = %error,
                    "unit failed"
                );
                StatusUpdate::failed(error.to_string())
            }
        };

        match self.gateway.record_status(&key, &update) {
            Ok(()) => sink_breaker.record_success(),
            Err(error) => {
                sink_breaker.record_failure();
                tracing::error!(
                    unit = %key,
                    outcome = ?report.outcome,
                    error = %error,
                    "failed to record unit outcome, status table is unreliable for this unit"
                );
                report.status_write_error = Some(error.to_string());
            }
        }

        report
    }

    async fn fetch(
        &self,
        adapter: &dyn SourceAdapter,
        unit: &WorkUnit,
        key: &StatusKey,
        report: &mut UnitReport,
    ) -> Result<ExtractedTables, UnitError> {
        let request = FetchRequest {
            league: unit.league.clone(),
            league_id: unit.league_id.clone(),
            season: unit.season.clone(),
            tables: vec![unit.table.clone()],
        };

        let mut attempts = 0_u32;
        let observer = self.observer.as_ref();
        let mut hook = |event: &AttemptEvent<'_, FetchError>| {
            attempts = event.attempt;
            if let Some(error) = event.error {
                tracing::debug!(
                    unit = %key,
                    attempt = event.attempt,
                    max_attempts = event.max_attempts,
                    error = %error,
                    "fetch attempt failed"
                );
            }
            if let Some(observer) = observer {
                observer(&AttemptRecord {
                    key: key.clone(),
                    attempt: event.attempt,
                    max_attempts: event.max_attempts,
                    error: event.error.map(ToString::to_string),
                    will_retry: event.next_delay.is_some(),
                });
            }
        };

        let result = run_with_retry(
            &self.retry,
            |_attempt| adapter.fetch(request.clone()),
            &mut hook,
        )
        .await;
        report.attempts = attempts;
        Ok(result?)
    }

    fn load(
        &self,
        adapter: &dyn SourceAdapter,
        key: &StatusKey,
        extracted: ExtractedTables,
        report: &mut UnitReport,
    ) -> Result<u64, UnitError> {
        let mut written = 0_u64;
        for (name, rows) in extracted {
            let table = adapter.table(&name).ok_or_else(|| UnitError::UndeclaredTable {
                source_id: adapter.id(),
                table: name.clone(),
            })?;

            let validated = validate_rows(table, rows);
            if validated.rejected > 0 {
                tracing::warn!(
                    unit = %key,
                    table = %table.name,
                    rejected = validated.rejected,
                    "dropped rows missing required fields"
                );
                report.rows_rejected += validated.rejected;
            }

            written += self
                .gateway
                .upsert(&table.name, &table.unique_key, &validated.valid)
                .map_err(|source| UnitError::Persistence {
                    table: table.name.clone(),
                    source,
                })?;
        }
        Ok(written)
    }
}

fn run_record(summary: &RunSummary) -> RunRecord {
    RunRecord {
        run_id: summary.run_id.clone(),
        command: summary.command.clone(),
        started_at: summary.started_at.clone(),
        finished_at: summary.finished_at.clone(),
        units_total: summary.totals.total as u64,
        units_completed: summary.totals.completed as u64,
        units_failed: summary.totals.failed as u64,
        units_skipped: summary.totals.skipped as u64,
        rows_written: summary.totals.rows_written,
    }
}
