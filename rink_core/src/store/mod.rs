//! Document store abstraction.
//!
//! The persistent store is the pipeline's sole synchronization point, so it
//! is injected behind a trait: production uses the Postgres implementation,
//! tests substitute the in-memory one.
//!
//! The refresh-lock primitives deserve a note: `begin_refresh` performs the
//! throttle check, the `locked` check, and the lock write as one atomic
//! step inside the store, because doing any of them outside would reopen
//! the check-then-act race the lock exists to close. There is no TTL on the
//! lock; a crash between `begin_refresh` and `commit_refresh`/`abort_refresh`
//! leaves the game locked (known limitation of the field-based design).

use crate::errors::Result;
use crate::models::{GameDoc, GameStatus, Goal, Side, TeamDoc, TeamStatsCache};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Fields written atomically when a live refresh commits.
#[derive(Clone, Debug)]
pub struct RefreshUpdate {
    pub home_score: u16,
    pub away_score: u16,
    pub status: GameStatus,
    pub last_refreshed_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// Persistence boundary for the two top-level collections, `games` (keyed
/// by external game id) and `teams` (generated id, queried by
/// abbreviation).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_game(&self, id: &str) -> Result<Option<GameDoc>>;

    /// Insert or fully replace one game document.
    async fn put_game(&self, game: &GameDoc) -> Result<()>;

    /// Write a batch of game documents in one atomic commit. Callers bound
    /// batches to the store's atomicity limit (500 documents).
    async fn put_games_batch(&self, games: &[GameDoc]) -> Result<()>;

    /// Persist a game's full goals map in one write.
    async fn set_goals(&self, game_id: &str, goals: &BTreeMap<String, Goal>) -> Result<()>;

    async fn get_team_by_abbreviation(&self, abbr: &str) -> Result<Option<TeamDoc>>;

    /// Insert a new team. The registry is insert-only.
    async fn insert_team(&self, team: &TeamDoc) -> Result<()>;

    /// Persist recomputed cache fields onto a team record.
    async fn update_team_stats(&self, team_id: &str, stats: &TeamStatsCache) -> Result<()>;

    /// FINAL games where the franchise appears on the given side, ordered
    /// by start time descending. Two calls express the OR the store's
    /// query model cannot.
    async fn final_games_for_franchise(
        &self,
        franchise_id: i64,
        side: Side,
    ) -> Result<Vec<GameDoc>>;

    /// Staleness proxy: does any FINAL game start after the cutoff?
    async fn has_final_game_after(&self, cutoff: DateTime<Utc>) -> Result<bool>;

    /// Atomically: fail with `NotFound` if the game is absent,
    /// `TooFrequent` if it was refreshed within `min_interval`, `Conflict`
    /// if `locked` is already set or the game reached FINAL since the
    /// caller's read; otherwise set `locked = true` and return the
    /// document snapshot.
    async fn begin_refresh(
        &self,
        game_id: &str,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<GameDoc>;

    /// Write scores/status/raw, stamp `last_refreshed_at`, and clear the
    /// lock in one atomic write.
    async fn commit_refresh(&self, game_id: &str, update: RefreshUpdate) -> Result<()>;

    /// Clear the lock without touching anything else. Called on every
    /// failure path after `begin_refresh` succeeded.
    async fn abort_refresh(&self, game_id: &str) -> Result<()>;
}
