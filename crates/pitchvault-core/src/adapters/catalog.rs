//! Tables each source produces and the business key of every table.

use crate::adapters::normalize_identifier;
use crate::{SourceId, TableSpec};

const SEASON_STAT_TYPES: [&str; 11] = [
    "standard",
    "keeper",
    "keeper_adv",
    "shooting",
    "passing",
    "passing_types",
    "goal_shot_creation",
    "defense",
    "possession",
    "playing_time",
    "misc",
];

const FBREF_TEAM_MATCH_STATS: [&str; 9] = [
    "schedule",
    "keeper",
    "shooting",
    "passing",
    "passing_types",
    "goal_shot_creation",
    "defense",
    "possession",
    "misc",
];

const FBREF_PLAYER_MATCH_STATS: [&str; 7] = [
    "summary",
    "keepers",
    "passing",
    "passing_types",
    "defense",
    "possession",
    "misc",
];

const FOTMOB_MATCH_STATS: [&str; 7] = [
    "Top stats",
    "Shots",
    "Expected goals (xG)",
    "Passes",
    "Defence",
    "Duels",
    "Discipline",
];

const LEAGUE: &[&str] = &["league"];
const SEASON: &[&str] = &["league", "season"];
const SEASON_TEAM: &[&str] = &["league", "season", "team"];
const SEASON_TEAM_PLAYER: &[&str] = &["league", "season", "team", "player"];
const GAME: &[&str] = &["league", "season", "game"];
const GAME_TEAM: &[&str] = &["league", "season", "game", "team"];
const GAME_TEAM_PLAYER: &[&str] = &["league", "season", "game", "team", "player"];

/// Declared tables for `source`, in load order.
pub fn tables_for(source: SourceId) -> Vec<TableSpec> {
    match source {
        SourceId::Fbref => fbref(),
        SourceId::Fotmob => fotmob(),
        SourceId::Understat => vec![
            TableSpec::new("understat_leagues", LEAGUE),
            TableSpec::new("understat_seasons", SEASON),
            schedule("understat_schedule"),
            TableSpec::new("understat_team_match_stats", GAME_TEAM),
            TableSpec::new("understat_player_season_stats", SEASON_TEAM_PLAYER),
            TableSpec::new("understat_player_match_stats", GAME_TEAM_PLAYER),
            TableSpec::new("understat_shot_events", &["league", "season", "game", "shot_id"]),
        ],
        SourceId::Whoscored => vec![
            TableSpec::new("whoscored_leagues", LEAGUE),
            TableSpec::new("whoscored_seasons", SEASON),
            schedule("whoscored_schedule"),
            TableSpec::new("whoscored_events", &["league", "season", "game", "event_id"]),
        ],
        SourceId::Sofascore => vec![
            TableSpec::new("sofascore_leagues", LEAGUE),
            TableSpec::new("sofascore_seasons", SEASON),
            TableSpec::new("sofascore_league_table", SEASON_TEAM),
            schedule("sofascore_schedule"),
        ],
        SourceId::Espn => vec![
            schedule("espn_schedule"),
            TableSpec::new("espn_matchsheet", GAME_TEAM),
            TableSpec::new("espn_lineup", GAME_TEAM_PLAYER),
        ],
        SourceId::Clubelo => vec![
            TableSpec::new("clubelo_ratings_by_date", &["team", "date"]),
            TableSpec::new("clubelo_team_history", &["team", "date"]),
        ],
        SourceId::Matchhistory => vec![TableSpec::new("matchhistory_odds", GAME)],
        SourceId::Sofifa => vec![
            TableSpec::new("sofifa_leagues", LEAGUE),
            TableSpec::new("sofifa_versions", &["version_id"]),
            TableSpec::new("sofifa_teams", &["league", "team"]),
            TableSpec::new("sofifa_players", &["league", "team", "player"]),
            TableSpec::new("sofifa_team_ratings", &["league", "team", "version_id"]),
            TableSpec::new(
                "sofifa_player_ratings",
                &["league", "team", "player", "version_id"],
            ),
        ],
    }
}

fn schedule(name: &str) -> TableSpec {
    TableSpec::new(name, GAME).requiring("date")
}

fn fbref() -> Vec<TableSpec> {
    let mut tables = vec![
        TableSpec::new("fbref_leagues", LEAGUE),
        TableSpec::new("fbref_seasons", SEASON),
    ];

    tables.extend(
        SEASON_STAT_TYPES
            .iter()
            .map(|stat| TableSpec::new(format!("fbref_team_season_{stat}"), SEASON_TEAM)),
    );
    tables.extend(
        FBREF_TEAM_MATCH_STATS
            .iter()
            .map(|stat| TableSpec::new(format!("fbref_team_match_{stat}"), GAME_TEAM)),
    );
    tables.extend(
        SEASON_STAT_TYPES
            .iter()
            .map(|stat| TableSpec::new(format!("fbref_player_season_{stat}"), SEASON_TEAM_PLAYER)),
    );
    tables.extend(
        FBREF_PLAYER_MATCH_STATS
            .iter()
            .map(|stat| TableSpec::new(format!("fbref_player_match_{stat}"), GAME_TEAM_PLAYER)),
    );

    tables.push(schedule("fbref_schedule"));
    tables.push(TableSpec::new("fbref_lineups", GAME_TEAM_PLAYER));
    tables.push(TableSpec::new(
        "fbref_events",
        &["league", "season", "game", "minute", "event_id"],
    ));
    tables.push(TableSpec::new(
        "fbref_shot_events",
        &["league", "season", "game", "minute", "player"],
    ));
    tables
}

fn fotmob() -> Vec<TableSpec> {
    let mut tables = vec![
        TableSpec::new("fotmob_leagues", LEAGUE),
        TableSpec::new("fotmob_seasons", SEASON),
        TableSpec::new("fotmob_league_table", SEASON_TEAM),
        schedule("fotmob_schedule"),
    ];
    tables.extend(FOTMOB_MATCH_STATS.iter().map(|stat| {
        TableSpec::new(
            format!("fotmob_team_match_{}", normalize_identifier(stat)),
            GAME_TEAM,
        )
    }));
    tables
}
