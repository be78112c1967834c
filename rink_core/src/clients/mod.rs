//! Upstream feed abstractions.
//!
//! `ScheduleFeed` is the seam between the pipeline and the outside world:
//! the production implementation talks to the NHL web API, tests plug in a
//! scripted fake. All fields are mapped defensively with fallback defaults,
//! so a partially malformed upstream payload degrades instead of failing.

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub mod nhl;

pub use nhl::NhlApiClient;

/// Read-only view of the upstream feeds consumed by the pipeline.
#[async_trait]
pub trait ScheduleFeed: Send + Sync {
    /// Bulk team roster feed: every franchise with abbreviation and name.
    async fn teams(&self) -> Result<Vec<FeedTeam>>;

    /// Schedule-by-date feed: games for one date with embedded team info.
    async fn schedule_by_date(&self, date: NaiveDate) -> Result<Vec<FeedScheduleGame>>;

    /// Current-scores feed: in-progress/recent games with live score and
    /// status. Never retried; the per-game throttle governs pacing.
    async fn current_scores(&self) -> Result<Vec<FeedScore>>;

    /// Bulk historical game feed for one season, legacy numeric-id shape.
    async fn season_games(&self, season: &str) -> Result<Vec<FeedBulkGame>>;

    /// Ordered play-by-play event list plus roster for one game.
    async fn play_by_play(&self, game_id: &str) -> Result<FeedPlayByPlay>;

    /// Feed name for logging.
    fn feed_name(&self) -> &str;
}

/// One franchise from the bulk roster feed.
#[derive(Clone, Debug)]
pub struct FeedTeam {
    /// Upstream numeric team id, referenced by the bulk game shape.
    pub upstream_id: i64,
    pub abbreviation: String,
    pub full_name: String,
    pub franchise_id: i64,
    pub logo_url: String,
}

/// One game from the schedule-by-date feed (abbreviation-keyed shape).
#[derive(Clone, Debug)]
pub struct FeedScheduleGame {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub home_abbr: String,
    pub home_name: String,
    pub away_abbr: String,
    pub away_name: String,
    pub raw: serde_json::Value,
}

/// One game from the current-scores feed.
#[derive(Clone, Debug)]
pub struct FeedScore {
    pub id: String,
    pub home_score: u16,
    pub away_score: u16,
    /// Raw upstream state string (FUT/PRE/LIVE/CRIT/FINAL/OFF).
    pub state: String,
    pub raw: serde_json::Value,
}

/// One game from the bulk historical feed (numeric-id shape).
#[derive(Clone, Debug)]
pub struct FeedBulkGame {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: u16,
    pub away_score: u16,
    /// Legacy numeric status code.
    pub status_code: i64,
    pub raw: serde_json::Value,
}

/// One play from the play-by-play feed.
#[derive(Clone, Debug)]
pub struct FeedPlay {
    /// Upstream event type key; goals carry "goal".
    pub type_key: String,
    pub period: u8,
    /// MM:SS elapsed within the period.
    pub time_in_period: String,
    /// Running score after this play.
    pub home_score: u16,
    pub away_score: u16,
    pub scorer_id: Option<i64>,
    pub goalie_id: Option<i64>,
    pub assist1_id: Option<i64>,
    pub assist2_id: Option<i64>,
}

impl FeedPlay {
    pub fn is_goal(&self) -> bool {
        self.type_key == "goal"
    }
}

/// Roster entry used to resolve player ids to display names.
#[derive(Clone, Debug)]
pub struct FeedRosterEntry {
    pub player_id: i64,
    pub full_name: String,
}

/// Play-by-play payload for one game.
#[derive(Clone, Debug, Default)]
pub struct FeedPlayByPlay {
    pub plays: Vec<FeedPlay>,
    pub roster: Vec<FeedRosterEntry>,
}
