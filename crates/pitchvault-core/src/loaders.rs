//! Historical backfill and daily refresh on top of the orchestrator.

use std::collections::BTreeMap;

use time::Date;

use crate::config::{LeagueConfig, ResolvedConfig};
use crate::orchestrator::{Orchestrator, RunRequest, RunSummary};
use crate::{OrchestratorError, Season, ValidationError};

pub const DEFAULT_START_YEAR: i32 = 2020;
pub const DEFAULT_END_YEAR: i32 = 2024;

/// Backfill every season starting in `[start_year, end_year]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalPlan {
    pub start_year: i32,
    pub end_year: i32,
    pub sources: Vec<String>,
    pub leagues: Vec<String>,
    pub skip_completed: bool,
}

impl Default for HistoricalPlan {
    fn default() -> Self {
        Self {
            start_year: DEFAULT_START_YEAR,
            end_year: DEFAULT_END_YEAR,
            sources: Vec::new(),
            leagues: Vec::new(),
            skip_completed: true,
        }
    }
}

impl HistoricalPlan {
    pub fn request(&self, config: &ResolvedConfig) -> Result<RunRequest, ValidationError> {
        let seasons = Season::historical_range(self.start_year, self.end_year)?;
        RunRequest::from_selection(
            config,
            "historical",
            &self.sources,
            &self.leagues,
            seasons,
            self.skip_completed,
        )
    }
}

/// Refresh the current season of each league. Always re-fetches completed
/// units.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DailyPlan {
    /// Season to refresh; derived per league from today's date when absent.
    pub season: Option<Season>,
    pub sources: Vec<String>,
    pub leagues: Vec<String>,
}

impl DailyPlan {
    /// One request per distinct season, leagues that share a season
    /// grouped together.
    pub fn requests(
        &self,
        config: &ResolvedConfig,
        today: Date,
    ) -> Result<Vec<RunRequest>, ValidationError> {
        let sources = config.select_sources(&self.sources)?;
        let leagues = config.select_leagues(&self.leagues)?;

        let mut by_season: BTreeMap<Season, Vec<LeagueConfig>> = BTreeMap::new();
        for league in leagues {
            let season = match &self.season {
                Some(season) => season.clone(),
                None => Season::current_for(
                    today,
                    league.season_start_month,
                    league.season_end_month,
                )?,
            };
            by_season.entry(season).or_default().push(league);
        }

        Ok(by_season
            .into_iter()
            .map(|(season, leagues)| RunRequest {
                command: String::from("daily"),
                sources: sources.clone(),
                leagues,
                seasons: vec![season],
                skip_completed: false,
            })
            .collect())
    }
}

pub struct HistoricalLoader<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> HistoricalLoader<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn run(
        &self,
        config: &ResolvedConfig,
        plan: &HistoricalPlan,
    ) -> Result<RunSummary, OrchestratorError> {
        let request = plan.request(config)?;
        tracing::info!(
            start_year = plan.start_year,
            end_year = plan.end_year,
            seasons = request.seasons.len(),
            "starting historical load"
        );
        self.orchestrator.run(&request).await
    }
}

pub struct DailyUpdater<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> DailyUpdater<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Run one pass per current season, in season order.
    pub async fn run(
        &self,
        config: &ResolvedConfig,
        plan: &DailyPlan,
        today: Date,
    ) -> Result<Vec<RunSummary>, OrchestratorError> {
        let requests = plan.requests(config, today)?;
        let mut summaries = Vec::with_capacity(requests.len());
        for request in &requests {
            tracing::info!(
                season = ?request.seasons.first(),
                leagues = request.leagues.len(),
                "starting daily update"
            );
            summaries.push(self.orchestrator.run(request).await?);
        }
        Ok(summaries)
    }
}
