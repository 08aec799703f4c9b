//! Declarative configuration loaded from a config directory.
//!
//! | File | Required | Contents |
//! |------|----------|----------|
//! | `data_sources.yaml` | yes | source enablement and priority, scraper endpoint, retry and rate limits |
//! | `leagues.yaml` | yes | leagues, their per-source identifiers and season months |
//! | `logging.yaml` | no | log level and destinations |
//!
//! [`resolve`] reads these once and returns an immutable [`ResolvedConfig`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::season::{DEFAULT_END_MONTH, DEFAULT_START_MONTH};
use crate::throttling::RateLimitConfig;
use crate::{ConfigError, SourceId, ValidationError};

pub const DATA_SOURCES_FILE: &str = "data_sources.yaml";
pub const LEAGUES_FILE: &str = "leagues.yaml";
pub const LOGGING_FILE: &str = "logging.yaml";

const DEFAULT_PRIORITY: u32 = 999;
const DEFAULT_SCRAPER_URL: &str = "http://127.0.0.1:8765";

/// Where the scraper export service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScraperConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_SCRAPER_URL),
            timeout_ms: 30_000,
        }
    }
}

/// Logging preferences; the CLI turns these into a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub log_to_file: bool,
    pub log_to_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: String::from("info"),
            log_dir: PathBuf::from("logs"),
            log_to_file: true,
            log_to_console: true,
        }
    }
}

/// One configured league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeagueConfig {
    pub name: String,
    pub soccerdata_id: Option<String>,
    pub enabled: bool,
    pub season_start_month: u8,
    pub season_end_month: u8,
    /// Per-source identifier overrides. `None` marks a source that does not
    /// cover this league.
    pub ids: BTreeMap<SourceId, Option<String>>,
}

impl LeagueConfig {
    /// Identifier `source` uses for this league, if it covers it.
    pub fn id_for(&self, source: SourceId) -> Option<&str> {
        match self.ids.get(&source) {
            Some(id) => id.as_deref(),
            None => Some(
                self.soccerdata_id
                    .as_deref()
                    .unwrap_or(self.name.as_str()),
            ),
        }
    }
}

/// Fully validated configuration shared by the orchestrator and adapters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub config_dir: PathBuf,
    /// Enabled sources, highest priority first.
    pub enabled_sources: Vec<SourceId>,
    pub leagues: Vec<LeagueConfig>,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub scraper: ScraperConfig,
    pub sink_failure_threshold: u32,
    pub logging: LoggingConfig,
}

impl ResolvedConfig {
    pub fn league(&self, name: &str) -> Option<&LeagueConfig> {
        self.leagues.iter().find(|league| league.name == name)
    }

    /// Requested sources in the given order, or every enabled source when
    /// none are requested.
    pub fn select_sources(&self, requested: &[String]) -> Result<Vec<SourceId>, ValidationError> {
        if requested.is_empty() {
            return Ok(self.enabled_sources.clone());
        }

        let mut selected = Vec::with_capacity(requested.len());
        for value in requested {
            let source = value.parse::<SourceId>()?;
            if !selected.contains(&source) {
                selected.push(source);
            }
        }
        Ok(selected)
    }

    /// Requested leagues in the given order, or every enabled league when
    /// none are requested.
    pub fn select_leagues(
        &self,
        requested: &[String],
    ) -> Result<Vec<LeagueConfig>, ValidationError> {
        if requested.is_empty() {
            return Ok(self
                .leagues
                .iter()
                .filter(|league| league.enabled)
                .cloned()
                .collect());
        }

        let mut selected: Vec<LeagueConfig> = Vec::with_capacity(requested.len());
        for name in requested {
            let league = self
                .league(name)
                .ok_or_else(|| ValidationError::UnknownLeague { name: name.clone() })?;
            if !selected.iter().any(|existing| existing.name == league.name) {
                selected.push(league.clone());
            }
        }
        Ok(selected)
    }
}

#[derive(Debug, Deserialize)]
struct DataSourcesFile {
    sources: BTreeMap<String, RawSource>,
    #[serde(default)]
    scraper: RawScraper,
    #[serde(default)]
    extraction: RawExtraction,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    priority: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScraper {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    retry: RawRetry,
    #[serde(default)]
    rate_limiting: RawRateLimit,
    sink_failure_threshold: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRetry {
    max_attempts: i64,
    initial_delay: f64,
    max_delay: f64,
    #[serde(alias = "backoff_base")]
    exponential_base: f64,
    jitter: bool,
}

impl Default for RawRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: 2.0,
            max_delay: 60.0,
            exponential_base: 2.0,
            jitter: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRateLimit {
    enabled: bool,
    requests_per_minute: i64,
    delay_between_requests: f64,
}

impl Default for RawRateLimit {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 20,
            delay_between_requests: 3.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeaguesFile {
    leagues: Vec<RawLeague>,
}

#[derive(Debug, Deserialize)]
struct RawLeague {
    name: String,
    soccerdata_id: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    season_start_month: Option<u8>,
    season_end_month: Option<u8>,
    #[serde(default)]
    ids: BTreeMap<String, Option<String>>,
}

const fn default_true() -> bool {
    true
}

/// Load and validate the configuration in `config_dir`.
///
/// # Errors
/// Returns [`ConfigError`] when a required file is missing, cannot be parsed,
/// or holds values that fail validation.
pub fn resolve(config_dir: impl AsRef<Path>) -> Result<ResolvedConfig, ConfigError> {
    let config_dir = config_dir.as_ref();

    let sources_file: DataSourcesFile = read_yaml(&config_dir.join(DATA_SOURCES_FILE))?;
    let leagues_file: LeaguesFile = read_yaml(&config_dir.join(LEAGUES_FILE))?;
    let logging_path = config_dir.join(LOGGING_FILE);
    let logging = if logging_path.exists() {
        read_yaml::<LoggingConfig>(&logging_path)?
    } else {
        LoggingConfig::default()
    };

    let enabled_sources = resolve_sources(&sources_file.sources)?;
    let retry = resolve_retry(&sources_file.extraction.retry)?;
    let rate_limit = resolve_rate_limit(&sources_file.extraction.rate_limiting)?;
    let sink_failure_threshold = sources_file.extraction.sink_failure_threshold.unwrap_or(3);
    if sink_failure_threshold == 0 {
        return Err(ConfigError::invalid(
            DATA_SOURCES_FILE,
            "extraction.sink_failure_threshold must be greater than zero",
        ));
    }

    let scraper = ScraperConfig {
        base_url: sources_file
            .scraper
            .base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| String::from(DEFAULT_SCRAPER_URL)),
        timeout_ms: sources_file.scraper.timeout_ms.unwrap_or(30_000).max(1),
    };

    Ok(ResolvedConfig {
        config_dir: config_dir.to_path_buf(),
        enabled_sources,
        leagues: resolve_leagues(leagues_file.leagues)?,
        retry,
        rate_limit,
        scraper,
        sink_failure_threshold,
        logging,
    })
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_sources(raw: &BTreeMap<String, RawSource>) -> Result<Vec<SourceId>, ConfigError> {
    let mut enabled = Vec::new();
    for (name, source) in raw {
        let id = name
            .parse::<SourceId>()
            .map_err(|error| ConfigError::invalid(DATA_SOURCES_FILE, error.to_string()))?;
        if source.enabled {
            enabled.push((source.priority.unwrap_or(DEFAULT_PRIORITY), id));
        }
    }

    enabled.sort();
    Ok(enabled.into_iter().map(|(_, id)| id).collect())
}

fn resolve_retry(raw: &RawRetry) -> Result<RetryPolicy, ConfigError> {
    let max_attempts = u32::try_from(raw.max_attempts)
        .ok()
        .filter(|attempts| *attempts > 0)
        .ok_or_else(|| {
            ConfigError::invalid(
                DATA_SOURCES_FILE,
                "extraction.retry.max_attempts must be a positive integer",
            )
        })?;
    let checks = [
        ("initial_delay", raw.initial_delay, 0.0),
        ("max_delay", raw.max_delay, 0.0),
        ("exponential_base", raw.exponential_base, 1.0),
    ];
    for (field, value, minimum) in checks {
        if !value.is_finite() || value < minimum {
            return Err(ConfigError::invalid(
                DATA_SOURCES_FILE,
                format!("extraction.retry.{field} must be at least {minimum}"),
            ));
        }
    }

    Ok(RetryPolicy {
        max_attempts,
        initial_delay: seconds("extraction.retry.initial_delay", raw.initial_delay)?,
        max_delay: seconds("extraction.retry.max_delay", raw.max_delay)?,
        backoff_base: raw.exponential_base,
        jitter: raw.jitter,
    })
}

fn resolve_rate_limit(raw: &RawRateLimit) -> Result<RateLimitConfig, ConfigError> {
    let requests_per_minute = u32::try_from(raw.requests_per_minute)
        .ok()
        .filter(|rpm| *rpm > 0)
        .ok_or_else(|| {
            ConfigError::invalid(
                DATA_SOURCES_FILE,
                "extraction.rate_limiting.requests_per_minute must be a positive integer",
            )
        })?;
    if !raw.delay_between_requests.is_finite() || raw.delay_between_requests < 0.0 {
        return Err(ConfigError::invalid(
            DATA_SOURCES_FILE,
            "extraction.rate_limiting.delay_between_requests must not be negative",
        ));
    }

    Ok(RateLimitConfig {
        enabled: raw.enabled,
        requests_per_minute,
        delay_between_requests: seconds(
            "extraction.rate_limiting.delay_between_requests",
            raw.delay_between_requests,
        )?,
    })
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::invalid(
            DATA_SOURCES_FILE,
            format!("{field} is not a representable number of seconds"),
        )
    })
}

fn resolve_leagues(raw: Vec<RawLeague>) -> Result<Vec<LeagueConfig>, ConfigError> {
    let mut seen = BTreeSet::new();
    let mut leagues = Vec::with_capacity(raw.len());

    for league in raw {
        let name = league.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::invalid(LEAGUES_FILE, "league name must not be empty"));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::invalid(
                LEAGUES_FILE,
                format!("league '{name}' is defined more than once"),
            ));
        }

        let season_start_month = league.season_start_month.unwrap_or(DEFAULT_START_MONTH);
        let season_end_month = league.season_end_month.unwrap_or(DEFAULT_END_MONTH);
        for month in [season_start_month, season_end_month] {
            if !(1..=12).contains(&month) {
                return Err(ConfigError::invalid(
                    LEAGUES_FILE,
                    format!("league '{name}': {}", ValidationError::InvalidMonth { value: month }),
                ));
            }
        }

        let mut ids = BTreeMap::new();
        for (source, id) in league.ids {
            let source = source.parse::<SourceId>().map_err(|error| {
                ConfigError::invalid(LEAGUES_FILE, format!("league '{name}': {error}"))
            })?;
            ids.insert(source, id.filter(|id| !id.trim().is_empty()));
        }

        leagues.push(LeagueConfig {
            name,
            soccerdata_id: league.soccerdata_id,
            enabled: league.enabled,
            season_start_month,
            season_end_month,
            ids,
        });
    }

    Ok(leagues)
}
