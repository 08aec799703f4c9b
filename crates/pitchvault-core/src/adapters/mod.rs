pub mod catalog;
pub mod scraper;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use scraper::ScraperAdapter;

use crate::config::ResolvedConfig;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::throttling::RateLimiter;
use crate::{SourceAdapter, SourceId};

/// Lower-case snake_case column or table name: every character outside
/// `[a-z0-9]` becomes `_`, runs collapse, edges are trimmed and a leading
/// digit gets a `c_` prefix.
pub fn normalize_identifier(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            output.push(ch);
        } else if !output.ends_with('_') {
            output.push('_');
        }
    }

    let trimmed = output.trim_matches('_');
    if trimmed.is_empty() {
        return String::from("unnamed");
    }
    if trimmed.starts_with(|ch: char| ch.is_ascii_digit()) {
        return format!("c_{trimmed}");
    }
    trimmed.to_string()
}

/// Adapters by source, shared by the orchestrator for a run.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One scraper adapter per known source, all drawing on one rate budget
    /// and one HTTP client.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::from_config_with_client(config, Arc::new(ReqwestHttpClient::default()))
    }

    /// Same as [`AdapterRegistry::from_config`] over a custom transport.
    pub fn from_config_with_client(
        config: &ResolvedConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(&config.rate_limit);
        let mut registry = Self::new();
        for source in SourceId::ALL {
            registry.register(Arc::new(ScraperAdapter::new(
                source,
                &config.scraper,
                rate_limiter.clone(),
                Arc::clone(&http_client),
            )));
        }
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, source: SourceId) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source).cloned()
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.keys().copied().collect()
    }
}
