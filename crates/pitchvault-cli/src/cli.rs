//! CLI argument definitions for pitchvault.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `orchestrate` | One pass over sources x leagues x seasons |
//! | `historical` | Backfill a range of seasons |
//! | `daily` | Refresh the current season |
//! | `status` | Inspect load-status rows |
//! | `reset` | Move status rows back to pending |
//!
//! # Examples
//!
//! ```bash
//! pitchvault orchestrate --sources understat --leagues "ENG-Premier League" --seasons 2324
//! pitchvault historical --start-year 2019 --end-year 2023 --pretty
//! pitchvault status --state failed
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Football statistics warehouse loader.
#[derive(Debug, Parser)]
#[command(
    name = "pitchvault",
    author,
    version,
    about = "Load football statistics from many sources into a local DuckDB warehouse"
)]
pub struct Cli {
    /// Directory holding data_sources.yaml, leagues.yaml and logging.yaml.
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,

    /// Directory for log files, overriding logging.yaml.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Warehouse database file. Defaults to $PITCHVAULT_HOME/warehouse.duckdb.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Exit with code 5 when any work unit failed.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one pass over the given sources, leagues and seasons.
    ///
    /// # Examples
    ///
    ///   pitchvault orchestrate --seasons 2324
    ///   pitchvault orchestrate --sources fbref understat --seasons 2223 2324
    Orchestrate(OrchestrateArgs),

    /// Backfill every season starting between two years.
    Historical(HistoricalArgs),

    /// Refresh the current season of each league.
    Daily(DailyArgs),

    /// Show load-status rows or per-table progress.
    Status(StatusArgs),

    /// Move matching load-status rows back to pending.
    Reset(ResetArgs),
}

impl Command {
    pub const fn needs_config(&self) -> bool {
        matches!(
            self,
            Self::Orchestrate(_) | Self::Historical(_) | Self::Daily(_)
        )
    }
}

#[derive(Debug, Clone, Args)]
pub struct SelectionArgs {
    /// Sources to run; all enabled sources when omitted.
    #[arg(long, num_args = 1..)]
    pub sources: Vec<String>,

    /// League names to run; all enabled leagues when omitted.
    #[arg(long, num_args = 1..)]
    pub leagues: Vec<String>,
}

#[derive(Debug, Args)]
pub struct OrchestrateArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Season identifiers, e.g. 2324 or a start year such as 2023.
    #[arg(long, required = true, num_args = 1..)]
    pub seasons: Vec<String>,

    /// Re-run units that are already completed.
    #[arg(long, default_value_t = false)]
    pub no_skip_completed: bool,
}

#[derive(Debug, Args)]
pub struct HistoricalArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long, default_value_t = 2020)]
    pub start_year: i32,

    #[arg(long, default_value_t = 2024)]
    pub end_year: i32,

    /// Re-run units that are already completed.
    #[arg(long, default_value_t = false)]
    pub no_skip_completed: bool,
}

#[derive(Debug, Args)]
pub struct DailyArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Season to refresh; detected per league from today's date when omitted.
    #[arg(long)]
    pub season: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct StatusFilterArgs {
    #[arg(long)]
    pub source: Option<String>,

    #[arg(long)]
    pub table: Option<String>,

    #[arg(long)]
    pub league: Option<String>,

    #[arg(long)]
    pub season: Option<String>,

    /// One of pending, in_progress, completed, failed.
    #[arg(long)]
    pub state: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub filter: StatusFilterArgs,

    /// Show per-table progress counts instead of individual rows.
    #[arg(long, default_value_t = false)]
    pub summary: bool,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    #[command(flatten)]
    pub filter: StatusFilterArgs,

    /// Allow a reset without any filter.
    #[arg(long, default_value_t = false)]
    pub all: bool,
}
