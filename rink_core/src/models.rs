//! Canonical domain types for the ingestion pipeline.
//!
//! Upstream feeds come in several shapes; everything is normalized into the
//! `GameDoc` / `TeamDoc` documents defined here before it touches the store.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Game lifecycle status. Ordered: a game never moves backward through
/// this sequence, and `Final` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameStatus {
    Scheduled,
    Pregame,
    Live,
    Final,
}

impl GameStatus {
    /// Position in the SCHEDULED -> PREGAME -> LIVE -> FINAL sequence.
    pub fn rank(&self) -> u8 {
        match self {
            GameStatus::Scheduled => 0,
            GameStatus::Pregame => 1,
            GameStatus::Live => 2,
            GameStatus::Final => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Final)
    }

    /// Apply an upstream-reported status without ever regressing.
    pub fn advance_to(self, reported: GameStatus) -> GameStatus {
        if reported.rank() > self.rank() {
            reported
        } else {
            self
        }
    }

    /// Map a live-feed status string, including the upstream synonyms
    /// CRIT -> LIVE and OFF -> FINAL. Unknown strings map to SCHEDULED.
    pub fn from_feed_state(state: &str) -> GameStatus {
        match state.to_uppercase().as_str() {
            "PRE" | "PREGAME" => GameStatus::Pregame,
            "LIVE" | "CRIT" => GameStatus::Live,
            "FINAL" | "OFF" => GameStatus::Final,
            _ => GameStatus::Scheduled,
        }
    }

    /// Map a legacy bulk-feed numeric status code. Unmapped codes default
    /// to SCHEDULED.
    pub fn from_bulk_code(code: i64) -> GameStatus {
        match code {
            1 => GameStatus::Scheduled,
            2 => GameStatus::Pregame,
            3 | 4 => GameStatus::Live,
            5 | 6 | 7 => GameStatus::Final,
            _ => GameStatus::Scheduled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "SCHEDULED",
            GameStatus::Pregame => "PREGAME",
            GameStatus::Live => "LIVE",
            GameStatus::Final => "FINAL",
        }
    }
}

/// Which side of a game a team occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

/// One side of a game: team identity plus its current score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSide {
    pub abbreviation: String,
    pub name: String,
    pub score: u16,
    /// Franchise lineage id; -1 when the registry has no entry.
    pub franchise_id: i64,
}

/// A single scoring event, embedded in its game document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub scorer: String,
    pub goalie: String,
    pub primary_assist: Option<String>,
    pub secondary_assist: Option<String>,
    pub period: u8,
    /// MM:SS within the period.
    pub time_in_period: String,
    /// MM:SS across the whole game, at a fixed 20-minute period length.
    pub cumulative_time: String,
    pub scored_by_home: bool,
}

impl Goal {
    /// Per-goal map key: `P<period>-<MM:SS>`. Assumed unique within a game.
    pub fn key(period: u8, time_in_period: &str) -> String {
        format!("P{}-{}", period, time_in_period)
    }
}

/// Canonical game document, keyed by the externally supplied game id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameDoc {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub status: GameStatus,
    pub home: GameSide,
    pub away: GameSide,
    /// Set only by the live refresh path.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Advisory mutex flag; true only while one refresh is in flight.
    pub locked: bool,
    /// Goal key -> goal record. Empty until goal extraction runs.
    #[serde(default)]
    pub goals: BTreeMap<String, Goal>,
    /// Opaque upstream payload retained for audit/debug.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl GameDoc {
    pub fn side_score(&self, side: Side) -> u16 {
        match side {
            Side::Home => self.home.score,
            Side::Away => self.away.score,
        }
    }
}

/// Team reference document. At most one per abbreviation; insert-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamDoc {
    /// Generated id (uuid v4).
    pub id: String,
    pub abbreviation: String,
    pub display_name: String,
    pub franchise_id: i64,
    pub logo_url: String,
    /// Cached aggregate statistics; absent until first computed.
    #[serde(default)]
    pub stats: Option<TeamStatsCache>,
}

/// Derived per-team aggregates, fully recomputable from game documents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamStatsCache {
    /// 8-digit season identifier, e.g. "20242025".
    pub season: String,
    pub season_games_played: u32,
    pub season_wins: u32,
    pub season_losses: u32,
    pub season_total_goals: u32,
    pub all_time_games_played: u32,
    pub all_time_wins: u32,
    pub all_time_losses: u32,
    pub all_time_total_goals: u32,
    /// Game ids, most recent first, at most 5.
    pub recent_games: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

/// Where a boundary operation's result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Database,
    Cache,
    Api,
}

/// Result wrapper tagging every boundary operation with its source, so
/// callers can distinguish free reads from upstream-triggered work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tagged<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Tagged<T> {
    pub fn database(value: T) -> Self {
        Self {
            value,
            source: DataSource::Database,
        }
    }

    pub fn cache(value: T) -> Self {
        Self {
            value,
            source: DataSource::Cache,
        }
    }

    pub fn api(value: T) -> Self {
        Self {
            value,
            source: DataSource::Api,
        }
    }
}

/// Counters produced by one ingest run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub teams_added: u32,
    pub games_created: u32,
    pub games_updated: u32,
    pub games_skipped: u32,
    /// Games that errored during the run; logged and left for re-ingestion.
    pub games_failed: u32,
}

impl IngestSummary {
    pub fn merge(&mut self, other: IngestSummary) {
        self.teams_added += other.teams_added;
        self.games_created += other.games_created;
        self.games_updated += other.games_updated;
        self.games_skipped += other.games_skipped;
        self.games_failed += other.games_failed;
    }
}

/// Season identifier for a calendar date. October through December belong
/// to `<year><year+1>`; January through September to `<year-1><year>`.
pub fn season_id(date: NaiveDate) -> String {
    let year = date.year();
    if date.month() >= 10 {
        format!("{}{}", year, year + 1)
    } else {
        format!("{}{}", year - 1, year)
    }
}

/// Parse a "MM:SS" clock string into seconds. Malformed input parses as 0.
pub fn parse_clock(clock: &str) -> u32 {
    let parts: Vec<&str> = clock.split(':').collect();
    match parts.len() {
        2 => {
            let mins = parts[0].parse::<u32>().unwrap_or(0);
            let secs = parts[1].parse::<u32>().unwrap_or(0);
            mins * 60 + secs
        }
        1 => parts[0].parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}

/// Format seconds into a "MM:SS" clock string.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
