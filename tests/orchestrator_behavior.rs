//! Behavior-driven tests for the work-unit orchestrator.
//!
//! These run real orchestrator passes against a temporary warehouse with
//! scripted source adapters, checking what an operator would observe in the
//! status table, the business tables and the run summary.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pitchvault_core::config;
use pitchvault_core::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use pitchvault_core::{
    AdapterRegistry, AttemptRecord, ExtractedTables, FetchError, FetchRequest, LoadState,
    LoadStatus, Orchestrator, OrchestratorError, PersistenceError, PersistenceGateway,
    ResolvedConfig, RetryPolicy, Row, RunRecord, RunRequest, Season, SourceAdapter, SourceId,
    StatusKey, StatusUpdate, TableSpec, UnitOutcome, Warehouse, WarehouseConfig,
};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

const LEAGUE: &str = "ENG-Premier League";

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Every fetch returns `rows` rows per requested table.
    Rows(usize),
    /// The first `failures` fetches fail transiently, then rows are returned.
    TransientThenRows { failures: usize, rows: usize },
    AlwaysTransient,
    AlwaysPermanent,
    /// Returns a table the adapter never declared.
    UndeclaredTable,
    /// Returns one valid row and one row without its key.
    PartiallyInvalid,
}

struct ScriptedAdapter {
    source: SourceId,
    tables: Vec<TableSpec>,
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedAdapter {
    fn new(source: SourceId, table_names: &[&str], script: Script) -> Arc<Self> {
        Arc::new(Self {
            source,
            tables: table_names
                .iter()
                .map(|name| TableSpec::new(*name, &["league", "season", "game"]))
                .collect(),
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn rows(&self, request: &FetchRequest, count: usize) -> Vec<Row> {
        (0..count)
            .map(|index| {
                let value = json!({
                    "league": request.league,
                    "season": request.season.as_str(),
                    "game": format!("game-{index}"),
                    "data_source": self.source.as_str(),
                    "home_goals": index,
                });
                value.as_object().cloned().expect("object row")
            })
            .collect()
    }

    fn tables_with(&self, request: &FetchRequest, count: usize) -> ExtractedTables {
        request
            .tables
            .iter()
            .map(|table| (table.clone(), self.rows(request, count)))
            .collect()
    }
}

impl SourceAdapter for ScriptedAdapter {
    fn id(&self) -> SourceId {
        self.source
    }

    fn declared_tables(&self) -> &[TableSpec] {
        &self.tables
    }

    fn fetch<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ExtractedTables, FetchError>> + Send + 'a>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let result = match self.script {
            Script::Rows(count) => Ok(self.tables_with(&request, count)),
            Script::TransientThenRows { failures, rows } => {
                if call < failures {
                    Err(FetchError::transient("429 too many requests"))
                } else {
                    Ok(self.tables_with(&request, rows))
                }
            }
            Script::AlwaysTransient => Err(FetchError::transient("connection timed out")),
            Script::AlwaysPermanent => Err(FetchError::permanent("league not covered")),
            Script::UndeclaredTable => {
                let mut tables = self.tables_with(&request, 1);
                tables.insert(String::from("surprise_table"), self.rows(&request, 1));
                Ok(tables)
            }
            Script::PartiallyInvalid => {
                let mut rows = self.rows(&request, 2);
                rows[1].remove("game");
                Ok(request
                    .tables
                    .iter()
                    .map(|table| (table.clone(), rows.clone()))
                    .collect())
            }
        };
        Box::pin(async move { result })
    }
}

/// Scraper export service stand-in: one table endpoint answers 503, every
/// other endpoint answers with a single row.
struct ExportService {
    broken_table: &'static str,
    urls: Mutex<Vec<String>>,
}

impl ExportService {
    fn with_broken(broken_table: &'static str) -> Arc<Self> {
        Arc::new(Self {
            broken_table,
            urls: Mutex::new(Vec::new()),
        })
    }

    fn hits(&self, table: &str) -> usize {
        let path = format!("/{table}?");
        self.urls
            .lock()
            .expect("urls lock")
            .iter()
            .filter(|url| url.contains(&path))
            .count()
    }
}

impl HttpClient for ExportService {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let url = request.full_url();
        self.urls.lock().expect("urls lock").push(url.clone());

        let response = if url.contains(&format!("/{}?", self.broken_table)) {
            HttpResponse::with_status(503)
        } else {
            HttpResponse::ok(
                json!([{
                    "Game": "ARS-CHE",
                    "Team": "Arsenal",
                    "Player": "Saka",
                    "Shot ID": 1,
                    "Date": "2023-10-21",
                    "Home Team": "Arsenal",
                }])
                .to_string(),
            )
        };
        Box::pin(async move { Ok(response) })
    }
}

/// Warehouse wrapper that can be told to fail.
struct FlakyGateway {
    inner: Warehouse,
    unreachable: AtomicBool,
    fail_status_reads: AtomicBool,
    fail_status_writes: AtomicBool,
    fail_terminal_writes: AtomicBool,
}

impl FlakyGateway {
    fn new(inner: Warehouse) -> Arc<Self> {
        Arc::new(Self {
            inner,
            unreachable: AtomicBool::new(false),
            fail_status_reads: AtomicBool::new(false),
            fail_status_writes: AtomicBool::new(false),
            fail_terminal_writes: AtomicBool::new(false),
        })
    }

    fn lost() -> PersistenceError {
        PersistenceError::Unreachable(String::from("connection reset"))
    }
}

impl PersistenceGateway for FlakyGateway {
    fn ping(&self) -> Result<(), PersistenceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Self::lost());
        }
        PersistenceGateway::ping(&self.inner)
    }

    fn load_status(&self, key: &StatusKey) -> Result<Option<LoadStatus>, PersistenceError> {
        if self.fail_status_reads.load(Ordering::SeqCst) {
            return Err(Self::lost());
        }
        PersistenceGateway::load_status(&self.inner, key)
    }

    fn upsert(
        &self,
        table: &str,
        unique_key: &[String],
        rows: &[Row],
    ) -> Result<u64, PersistenceError> {
        self.inner.upsert(table, unique_key, rows)
    }

    fn record_status(
        &self,
        key: &StatusKey,
        update: &StatusUpdate,
    ) -> Result<(), PersistenceError> {
        let terminal = update.state.is_terminal();
        if self.fail_status_writes.load(Ordering::SeqCst)
            || (terminal && self.fail_terminal_writes.load(Ordering::SeqCst))
        {
            return Err(Self::lost());
        }
        PersistenceGateway::record_status(&self.inner, key, update)
    }

    fn record_run(&self, run: &RunRecord) -> Result<(), PersistenceError> {
        PersistenceGateway::record_run(&self.inner, run)
    }
}

fn write_config(dir: &Path) -> ResolvedConfig {
    fs::write(
        dir.join("data_sources.yaml"),
        concat!(
            "sources:\n",
            "  understat: { enabled: true, priority: 1 }\n",
            "  espn: { enabled: true, priority: 2 }\n",
            "extraction:\n",
            "  retry: { max_attempts: 3, initial_delay: 0, max_delay: 0 }\n",
            "  rate_limiting: { enabled: false }\n",
            "  sink_failure_threshold: 3\n",
        ),
    )
    .expect("write data_sources.yaml");
    fs::write(
        dir.join("leagues.yaml"),
        "leagues:\n  - name: ENG-Premier League\n",
    )
    .expect("write leagues.yaml");
    config::resolve(dir).expect("config resolves")
}

struct Harness {
    _temp: TempDir,
    config: ResolvedConfig,
    warehouse: Warehouse,
}

impl Harness {
    fn new() -> Self {
        let temp = tempdir().expect("tempdir");
        let config = write_config(temp.path());
        let warehouse = Warehouse::open(WarehouseConfig {
            pitchvault_home: temp.path().to_path_buf(),
            db_path: temp.path().join("warehouse.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse open");
        Self {
            _temp: temp,
            config,
            warehouse,
        }
    }

    fn orchestrator(
        &self,
        adapters: &[Arc<ScriptedAdapter>],
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Orchestrator {
        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(Arc::clone(adapter) as Arc<dyn SourceAdapter>);
        }
        Orchestrator::new(&self.config, registry, gateway)
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    fn request(&self, sources: &[&str], skip_completed: bool) -> RunRequest {
        let sources = sources
            .iter()
            .map(|source| source.to_string())
            .collect::<Vec<_>>();
        RunRequest::from_selection(
            &self.config,
            "orchestrate",
            &sources,
            &[String::from(LEAGUE)],
            vec![Season::parse("2324").expect("season")],
            skip_completed,
        )
        .expect("request")
    }

    fn status(&self, source: &str, table: &str) -> Option<LoadStatus> {
        self.warehouse
            .load_status(&StatusKey::new(source, table, LEAGUE, "2324"))
            .expect("load status")
    }

    fn count(&self, table: &str) -> i64 {
        let result = self
            .warehouse
            .select(&format!("SELECT COUNT(*) FROM {table}"), 1)
            .expect("count");
        match &result.rows[0][0] {
            Value::Number(number) => number.as_i64().expect("integer count"),
            other => panic!("unexpected count {other}"),
        }
    }
}

// =============================================================================
// Orchestrator: Happy Path and Skip Behavior
// =============================================================================

#[tokio::test]
async fn when_run_on_a_fresh_warehouse_then_every_declared_table_is_fetched_and_completed() {
    // Given: An adapter declaring three tables and no prior status rows
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule", "understat_shots", "understat_players"],
        Script::Rows(4),
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(&[Arc::clone(&adapter)], warehouse);

    // When: One pass runs
    let summary = orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    // Then: One fetch per declared table, each asking for exactly that table
    assert_eq!(adapter.calls(), 3);
    let requested = adapter
        .requests
        .lock()
        .expect("requests")
        .iter()
        .map(|request| request.tables.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        requested,
        vec![
            vec![String::from("understat_schedule")],
            vec![String::from("understat_shots")],
            vec![String::from("understat_players")],
        ]
    );

    // And: Every unit is completed with its row count and no error
    for table in ["understat_schedule", "understat_shots", "understat_players"] {
        let status = harness.status("understat", table).expect("status row");
        assert_eq!(status.status, LoadState::Completed);
        assert_eq!(status.rows_processed, 4);
        assert!(status.error_message.is_none());
        assert!(status.started_at.is_some());
        assert!(status.completed_at.is_some());
        assert_eq!(harness.count(table), 4);
    }
    assert_eq!(summary.totals.completed, 3);
    assert_eq!(summary.totals.rows_written, 12);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn when_rerun_immediately_then_completed_units_are_skipped_without_fetching() {
    // Given: A completed run
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule", "understat_shots"],
        Script::Rows(2),
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(&[Arc::clone(&adapter)], warehouse);
    orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("first run");
    let before = harness.status("understat", "understat_schedule");

    // When: The same pass runs again
    let summary = orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("second run");

    // Then: Nothing is fetched and the status rows are untouched
    assert_eq!(adapter.calls(), 2);
    assert_eq!(summary.totals.skipped, 2);
    assert_eq!(summary.totals.completed, 0);
    assert_eq!(harness.status("understat", "understat_schedule"), before);
}

#[tokio::test]
async fn when_skip_completed_is_off_then_completed_units_are_fetched_again_without_duplicates() {
    // Given: A completed run
    let harness = Harness::new();
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(3));
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(&[Arc::clone(&adapter)], warehouse);
    orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("first run");

    // When: A forced refresh runs
    let summary = orchestrator
        .run(&harness.request(&["understat"], false))
        .await
        .expect("forced run");

    // Then: The unit is fetched again and the table still holds one copy per key
    assert_eq!(adapter.calls(), 2);
    assert_eq!(summary.totals.completed, 1);
    assert_eq!(harness.count("understat_schedule"), 3);
    let status = harness
        .status("understat", "understat_schedule")
        .expect("status");
    assert_eq!(status.status, LoadState::Completed);
    assert_eq!(status.rows_processed, 3);
}

// =============================================================================
// Orchestrator: Retry Behavior
// =============================================================================

#[tokio::test]
async fn when_source_always_fails_transiently_then_it_is_called_exactly_max_attempts_times() {
    // Given: An adapter that never recovers
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::AlwaysTransient,
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(&[Arc::clone(&adapter)], warehouse);

    // When: The unit runs
    let summary = orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run completes despite failure");

    // Then: Exactly three attempts, then a failed row naming the exhaustion
    assert_eq!(adapter.calls(), 3);
    let status = harness
        .status("understat", "understat_schedule")
        .expect("status");
    assert_eq!(status.status, LoadState::Failed);
    let message = status.error_message.expect("error message");
    assert!(message.contains("retries exhausted after 3 attempts"), "{message}");
    assert!(message.contains("connection timed out"), "{message}");
    assert_eq!(summary.units[0].attempts, 3);
    assert_eq!(summary.units[0].outcome, UnitOutcome::Failed);
}

#[tokio::test]
async fn when_source_fails_permanently_then_it_is_not_retried() {
    // Given: An adapter reporting a permanent failure
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::AlwaysPermanent,
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(&[Arc::clone(&adapter)], warehouse);

    // When: The unit runs
    orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    // Then: One call and an immediate failed status
    assert_eq!(adapter.calls(), 1);
    let status = harness
        .status("understat", "understat_schedule")
        .expect("status");
    assert_eq!(status.status, LoadState::Failed);
    assert_eq!(
        status.error_message.as_deref(),
        Some("league not covered (fetch.permanent)")
    );
}

#[tokio::test]
async fn when_source_recovers_on_the_third_attempt_then_unit_completes_and_hook_sees_three_attempts()
{
    // Given: Two throttled responses before success, and an attempt observer
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::TransientThenRows {
            failures: 2,
            rows: 5,
        },
    );
    let attempts: Arc<Mutex<Vec<AttemptRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&attempts);
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness
        .orchestrator(&[Arc::clone(&adapter)], warehouse)
        .with_attempt_observer(Arc::new(move |record: &AttemptRecord| {
            seen.lock().expect("attempts").push(record.clone());
        }));

    // When: The unit runs
    let summary = orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    // Then: It completes after three recorded attempts
    let status = harness
        .status("understat", "understat_schedule")
        .expect("status");
    assert_eq!(status.status, LoadState::Completed);
    assert_eq!(status.rows_processed, 5);
    assert_eq!(adapter.calls(), 3);

    let attempts = attempts.lock().expect("attempts");
    assert_eq!(
        attempts.iter().map(|record| record.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(attempts[0].will_retry && attempts[1].will_retry);
    assert!(attempts[2].error.is_none());
    assert_eq!(summary.units[0].attempts, 3);
}

// =============================================================================
// Orchestrator: Isolation and Resume
// =============================================================================

#[tokio::test]
async fn when_one_source_fails_then_the_other_source_still_completes() {
    // Given: A failing source and a healthy one
    let harness = Harness::new();
    let failing = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::AlwaysPermanent,
    );
    let healthy = ScriptedAdapter::new(SourceId::Espn, &["espn_schedule"], Script::Rows(2));
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(
        &[Arc::clone(&failing), Arc::clone(&healthy)],
        warehouse,
    );

    // When: Both run in one pass
    let summary = orchestrator
        .run(&harness.request(&["understat", "espn"], true))
        .await
        .expect("run");

    // Then: The failure stays with its own unit
    assert_eq!(
        harness
            .status("understat", "understat_schedule")
            .expect("failed row")
            .status,
        LoadState::Failed
    );
    assert_eq!(
        harness
            .status("espn", "espn_schedule")
            .expect("completed row")
            .status,
        LoadState::Completed
    );
    assert_eq!(summary.sources.len(), 2);
    assert_eq!(summary.sources[0].source, Some(SourceId::Understat));
    assert_eq!(summary.sources[0].failed, 1);
    assert_eq!(summary.sources[1].completed, 1);
}

#[tokio::test]
async fn when_one_table_endpoint_is_broken_then_the_sources_other_tables_still_load() {
    // Given: The shipped scraper adapters over an export service where only
    // the understat schedule endpoint is down
    let harness = Harness::new();
    let service = ExportService::with_broken("understat_schedule");
    let registry = AdapterRegistry::from_config_with_client(
        &harness.config,
        Arc::clone(&service) as Arc<dyn HttpClient>,
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = Orchestrator::new(&harness.config, registry, warehouse)
        .with_retry_policy(RetryPolicy::immediate(3));

    // When: Every understat table runs in one pass
    let summary = orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    // Then: The broken endpoint used its own retries and failed alone
    let schedule = harness
        .status("understat", "understat_schedule")
        .expect("schedule row");
    assert_eq!(schedule.status, LoadState::Failed);
    assert_eq!(service.hits("understat_schedule"), 3);

    // And: Every other table was requested and completed
    for table in [
        "understat_leagues",
        "understat_seasons",
        "understat_team_match_stats",
        "understat_player_season_stats",
        "understat_player_match_stats",
        "understat_shot_events",
    ] {
        assert_eq!(service.hits(table), 1, "{table}");
        let status = harness.status("understat", table).expect("status row");
        assert_eq!(status.status, LoadState::Completed, "{table}");
        assert_eq!(status.rows_processed, 1, "{table}");
    }
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(summary.totals.completed, 6);

    // And: Column names were normalised on the way in
    let result = harness
        .warehouse
        .select("SELECT home_team, data_source FROM understat_shot_events", 1)
        .expect("select");
    assert_eq!(result.rows, vec![vec![json!("Arsenal"), json!("understat")]]);
}

#[tokio::test]
async fn when_a_prior_run_was_interrupted_then_the_in_progress_unit_is_reprocessed() {
    // Given: A status row left in progress by a crashed run
    let harness = Harness::new();
    harness
        .warehouse
        .record_status(
            &StatusKey::new("understat", "understat_schedule", LEAGUE, "2324"),
            &StatusUpdate::in_progress(),
        )
        .expect("seed in-progress row");
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(1));
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let orchestrator = harness.orchestrator(&[Arc::clone(&adapter)], warehouse);

    // When: A new run with skip_completed starts
    let summary = orchestrator
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    // Then: The abandoned unit is fetched and completed
    assert_eq!(adapter.calls(), 1);
    assert!(summary.units[0].resumed);
    assert_eq!(
        harness
            .status("understat", "understat_schedule")
            .expect("status")
            .status,
        LoadState::Completed
    );
}

#[tokio::test]
async fn when_a_failed_unit_is_retried_successfully_then_the_error_is_cleared() {
    // Given: A unit that failed in an earlier run
    let harness = Harness::new();
    let broken = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::AlwaysPermanent,
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    harness
        .orchestrator(&[broken], Arc::clone(&warehouse))
        .run(&harness.request(&["understat"], true))
        .await
        .expect("failing run");

    // When: The source works again
    let fixed =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(2));
    harness
        .orchestrator(&[Arc::clone(&fixed)], warehouse)
        .run(&harness.request(&["understat"], true))
        .await
        .expect("recovery run");

    // Then: The failed unit was not skipped and now reads completed
    assert_eq!(fixed.calls(), 1);
    let status = harness
        .status("understat", "understat_schedule")
        .expect("status");
    assert_eq!(status.status, LoadState::Completed);
    assert!(status.error_message.is_none());
}

// =============================================================================
// Orchestrator: Row Handling
// =============================================================================

#[tokio::test]
async fn when_rows_miss_required_fields_then_they_are_dropped_and_counted() {
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::PartiallyInvalid,
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let summary = harness
        .orchestrator(&[adapter], warehouse)
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    assert_eq!(summary.units[0].outcome, UnitOutcome::Completed);
    assert_eq!(summary.units[0].rows_written, 1);
    assert_eq!(summary.units[0].rows_rejected, 1);
    assert_eq!(harness.count("understat_schedule"), 1);
}

#[tokio::test]
async fn when_a_source_returns_an_undeclared_table_then_the_unit_fails() {
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_schedule"],
        Script::UndeclaredTable,
    );
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    harness
        .orchestrator(&[adapter], warehouse)
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    let status = harness
        .status("understat", "understat_schedule")
        .expect("status");
    assert_eq!(status.status, LoadState::Failed);
    assert!(status
        .error_message
        .expect("message")
        .contains("undeclared table 'surprise_table'"));
}

// =============================================================================
// Orchestrator: Persistence Faults
// =============================================================================

#[tokio::test]
async fn when_the_sink_is_unreachable_at_start_then_no_unit_is_attempted() {
    let harness = Harness::new();
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(1));
    let gateway = FlakyGateway::new(harness.warehouse.clone());
    gateway.unreachable.store(true, Ordering::SeqCst);

    let result = harness
        .orchestrator(&[Arc::clone(&adapter)], gateway)
        .run(&harness.request(&["understat"], true))
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::SinkUnavailable { .. })
    ));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn when_status_writes_keep_failing_then_the_run_aborts_as_sink_lost() {
    // Given: A sink that rejects every status write, and more units than the threshold
    let harness = Harness::new();
    let adapter = ScriptedAdapter::new(
        SourceId::Understat,
        &["understat_a", "understat_b", "understat_c", "understat_d", "understat_e"],
        Script::Rows(1),
    );
    let gateway = FlakyGateway::new(harness.warehouse.clone());
    gateway.fail_status_writes.store(true, Ordering::SeqCst);

    // When: The run starts
    let result = harness
        .orchestrator(&[Arc::clone(&adapter)], gateway)
        .run(&harness.request(&["understat"], true))
        .await;

    // Then: Nothing is fetched without an in-progress marker and the run aborts
    assert!(matches!(
        result,
        Err(OrchestratorError::SinkUnavailable { .. })
    ));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn when_the_terminal_status_write_fails_then_the_fault_is_surfaced_in_the_report() {
    // Given: A sink that accepts in-progress markers but not outcomes
    let harness = Harness::new();
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(2));
    let gateway = FlakyGateway::new(harness.warehouse.clone());
    gateway.fail_terminal_writes.store(true, Ordering::SeqCst);

    // When: The unit runs
    let summary = harness
        .orchestrator(&[adapter], gateway)
        .run(&harness.request(&["understat"], true))
        .await
        .expect("one fault stays below the threshold");

    // Then: The extraction outcome is kept and the status fault is reported
    let report = &summary.units[0];
    assert_eq!(report.outcome, UnitOutcome::Completed);
    assert_eq!(report.rows_written, 2);
    assert!(report.status_write_error.is_some());

    // And: The row still reads in progress, so the next run reprocesses it
    assert_eq!(
        harness
            .status("understat", "understat_schedule")
            .expect("status")
            .status,
        LoadState::InProgress
    );
}

#[tokio::test]
async fn when_status_reads_fail_then_units_fail_without_fetching() {
    let harness = Harness::new();
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(1));
    let gateway = FlakyGateway::new(harness.warehouse.clone());
    gateway.fail_status_reads.store(true, Ordering::SeqCst);

    let summary = harness
        .orchestrator(&[Arc::clone(&adapter)], gateway)
        .run(&harness.request(&["understat"], true))
        .await
        .expect("single read failure stays below the threshold");

    assert_eq!(adapter.calls(), 0);
    assert_eq!(summary.units[0].outcome, UnitOutcome::Failed);
    assert!(summary.units[0].status_write_error.is_some());
}

#[tokio::test]
async fn when_a_requested_source_has_no_adapter_then_the_run_fails_up_front() {
    let harness = Harness::new();
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(1));
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());

    let result = harness
        .orchestrator(&[Arc::clone(&adapter)], warehouse)
        .run(&harness.request(&["understat", "espn"], true))
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::MissingAdapter {
            source_id: SourceId::Espn
        })
    ));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn when_a_run_finishes_then_it_is_recorded_in_load_runs() {
    let harness = Harness::new();
    let adapter =
        ScriptedAdapter::new(SourceId::Understat, &["understat_schedule"], Script::Rows(2));
    let warehouse: Arc<dyn PersistenceGateway> = Arc::new(harness.warehouse.clone());
    let summary = harness
        .orchestrator(&[adapter], warehouse)
        .run(&harness.request(&["understat"], true))
        .await
        .expect("run");

    let result = harness
        .warehouse
        .select(
            &format!(
                "SELECT command, units_completed, rows_written FROM load_runs WHERE run_id = '{}'",
                summary.run_id
            ),
            1,
        )
        .expect("select run");
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0][0], Value::from("orchestrate"));
    assert_eq!(result.rows[0][1], Value::from(1));
    assert_eq!(result.rows[0][2], Value::from(2));
}
