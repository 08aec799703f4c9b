//! Adapter for the scraper export service.
//!
//! The service exposes one endpoint per source table:
//! `GET {base_url}/{source}/{table}?league={id}&season={season}` answering
//! with a JSON array of row objects.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::adapters::{catalog, normalize_identifier};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::ScraperConfig;
use crate::http_client::{HttpClient, HttpRequest};
use crate::throttling::RateLimiter;
use crate::{
    ExtractedTables, FetchError, FetchRequest, Row, Season, SourceAdapter, SourceId, TableSpec,
};

#[derive(Clone)]
pub struct ScraperAdapter {
    source: SourceId,
    tables: Vec<TableSpec>,
    base_url: String,
    timeout_ms: u64,
    http_client: Arc<dyn HttpClient>,
    rate_limiter: RateLimiter,
    /// One breaker per (table, league, season) endpoint, so a broken
    /// endpoint only short-circuits its own retries.
    circuit_breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl ScraperAdapter {
    pub fn new(
        source: SourceId,
        config: &ScraperConfig,
        rate_limiter: RateLimiter,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            source,
            tables: catalog::tables_for(source),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_ms,
            http_client,
            rate_limiter,
            circuit_breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn circuit_breaker(
        &self,
        table: &str,
        league_id: &str,
        season: &Season,
    ) -> Arc<CircuitBreaker> {
        let name = format!("{}/{table}/{league_id}/{season}", self.source);
        let mut breakers = self
            .circuit_breakers
            .lock()
            .expect("scraper circuit breaker mutex poisoned");
        Arc::clone(breakers.entry(name.clone()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(name, CircuitBreakerConfig::default()))
        }))
    }

    async fn fetch_table(
        &self,
        table: &TableSpec,
        league: &str,
        league_id: &str,
        season: &Season,
    ) -> Result<Vec<Row>, FetchError> {
        let circuit_breaker = self.circuit_breaker(&table.name, league_id, season);
        if !circuit_breaker.allow_request() {
            return Err(FetchError::transient(format!(
                "circuit open for {} table '{}' ({league_id} {season})",
                self.source, table.name
            )));
        }

        self.rate_limiter.acquire().await;

        let request = HttpRequest::get(format!("{}/{}/{}", self.base_url, self.source, table.name))
            .query("league", league_id)
            .query("season", season.as_str())
            .timeout_ms(self.timeout_ms);
        tracing::debug!(url = %request.full_url(), "requesting scraper export");

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                circuit_breaker.record_failure();
                return Err(if error.retryable() {
                    FetchError::transient(format!("{} transport error: {error}", self.source))
                } else {
                    FetchError::permanent(format!("{} transport error: {error}", self.source))
                });
            }
        };

        if !response.is_success() {
            let message = format!(
                "{} returned status {} for table '{}'",
                self.source, response.status, table.name
            );
            return Err(if is_transient_status(response.status) {
                circuit_breaker.record_failure();
                FetchError::transient(message)
            } else {
                circuit_breaker.record_success();
                FetchError::permanent(message)
            });
        }
        circuit_breaker.record_success();

        let payload: Value = serde_json::from_str(&response.body).map_err(|error| {
            FetchError::permanent(format!(
                "{} returned malformed JSON for table '{}': {error}",
                self.source, table.name
            ))
        })?;
        let Value::Array(items) = payload else {
            return Err(FetchError::permanent(format!(
                "{} returned a non-array payload for table '{}'",
                self.source, table.name
            )));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(raw) => Ok(normalize_row(raw, league, season, self.source)),
                other => Err(FetchError::permanent(format!(
                    "{} returned a non-object row for table '{}': {other}",
                    self.source, table.name
                ))),
            })
            .collect()
    }
}

impl SourceAdapter for ScraperAdapter {
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
        Box::pin(async move {
            let league_id = request.league_id.as_deref().ok_or_else(|| {
                FetchError::permanent(format!(
                    "league '{}' is not available from {}",
                    request.league, self.source
                ))
            })?;

            let mut selected = Vec::new();
            if request.tables.is_empty() {
                selected.extend(self.tables.iter());
            } else {
                for name in &request.tables {
                    let table = self.table(name).ok_or_else(|| {
                        FetchError::permanent(format!(
                            "table '{name}' is not produced by {}",
                            self.source
                        ))
                    })?;
                    selected.push(table);
                }
            }

            let mut extracted = ExtractedTables::new();
            for table in selected {
                let rows = self
                    .fetch_table(table, &request.league, league_id, &request.season)
                    .await?;
                extracted.insert(table.name.clone(), rows);
            }
            Ok(extracted)
        })
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500..=599)
}

/// Normalize column names and stamp the load metadata columns.
fn normalize_row(
    raw: serde_json::Map<String, Value>,
    league: &str,
    season: &Season,
    source: SourceId,
) -> Row {
    let mut row = Row::new();
    for (column, value) in raw {
        let normalized = normalize_identifier(&column);
        if !row.contains_key(&normalized) {
            row.insert(normalized, value);
            continue;
        }

        let renamed = (2..)
            .map(|suffix| format!("{normalized}_{suffix}"))
            .find(|candidate| !row.contains_key(candidate))
            .unwrap_or_default();
        tracing::warn!(
            %source,
            column = column.as_str(),
            normalized = normalized.as_str(),
            renamed = renamed.as_str(),
            "normalized column name collides with an earlier column"
        );
        row.insert(renamed, value);
    }
    row.insert(String::from("league"), Value::from(league));
    row.insert(String::from("season"), Value::from(season.as_str()));
    row.insert(String::from("data_source"), Value::from(source.as_str()));
    row
}
