//! In-memory document store.
//!
//! Backs tests and offline runs. A single write lock per collection makes
//! every trait operation atomic, which is exactly the isolation the
//! Postgres implementation gets from its transactions.

use crate::errors::{PipelineError, Result};
use crate::store::{DocumentStore, RefreshUpdate};
use crate::models::{GameDoc, Goal, Side, TeamDoc, TeamStatsCache};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
pub struct MemoryStore {
    games: RwLock<HashMap<String, GameDoc>>,
    teams: RwLock<HashMap<String, TeamDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_game(&self, id: &str) -> Result<Option<GameDoc>> {
        Ok(self.games.read().get(id).cloned())
    }

    async fn put_game(&self, game: &GameDoc) -> Result<()> {
        self.games.write().insert(game.id.clone(), game.clone());
        Ok(())
    }

    async fn put_games_batch(&self, games: &[GameDoc]) -> Result<()> {
        let mut guard = self.games.write();
        for game in games {
            guard.insert(game.id.clone(), game.clone());
        }
        Ok(())
    }

    async fn set_goals(&self, game_id: &str, goals: &BTreeMap<String, Goal>) -> Result<()> {
        let mut guard = self.games.write();
        let game = guard
            .get_mut(game_id)
            .ok_or_else(|| PipelineError::NotFound(format!("game {}", game_id)))?;
        game.goals = goals.clone();
        Ok(())
    }

    async fn get_team_by_abbreviation(&self, abbr: &str) -> Result<Option<TeamDoc>> {
        Ok(self
            .teams
            .read()
            .values()
            .find(|t| t.abbreviation == abbr)
            .cloned())
    }

    async fn insert_team(&self, team: &TeamDoc) -> Result<()> {
        self.teams.write().insert(team.id.clone(), team.clone());
        Ok(())
    }

    async fn update_team_stats(&self, team_id: &str, stats: &TeamStatsCache) -> Result<()> {
        let mut guard = self.teams.write();
        let team = guard
            .get_mut(team_id)
            .ok_or_else(|| PipelineError::NotFound(format!("team {}", team_id)))?;
        team.stats = Some(stats.clone());
        Ok(())
    }

    async fn final_games_for_franchise(
        &self,
        franchise_id: i64,
        side: Side,
    ) -> Result<Vec<GameDoc>> {
        let guard = self.games.read();
        let mut games: Vec<GameDoc> = guard
            .values()
            .filter(|g| g.status.is_terminal())
            .filter(|g| match side {
                Side::Home => g.home.franchise_id == franchise_id,
                Side::Away => g.away.franchise_id == franchise_id,
            })
            .cloned()
            .collect();
        games.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(games)
    }

    async fn has_final_game_after(&self, cutoff: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .games
            .read()
            .values()
            .any(|g| g.status.is_terminal() && g.start_time > cutoff))
    }

    async fn begin_refresh(
        &self,
        game_id: &str,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<GameDoc> {
        let mut guard = self.games.write();
        let game = guard
            .get_mut(game_id)
            .ok_or_else(|| PipelineError::NotFound(format!("game {}", game_id)))?;

        // The game may have been finalized since the caller's read.
        if game.status.is_terminal() {
            return Err(PipelineError::Conflict {
                game_id: game_id.to_string(),
            });
        }
        if let Some(last) = game.last_refreshed_at {
            if now - last < min_interval {
                return Err(PipelineError::TooFrequent {
                    game_id: game_id.to_string(),
                });
            }
        }
        if game.locked {
            return Err(PipelineError::Conflict {
                game_id: game_id.to_string(),
            });
        }
        game.locked = true;
        Ok(game.clone())
    }

    async fn commit_refresh(&self, game_id: &str, update: RefreshUpdate) -> Result<()> {
        let mut guard = self.games.write();
        let game = guard
            .get_mut(game_id)
            .ok_or_else(|| PipelineError::NotFound(format!("game {}", game_id)))?;
        game.home.score = update.home_score;
        game.away.score = update.away_score;
        game.status = update.status;
        game.last_refreshed_at = Some(update.last_refreshed_at);
        game.raw = update.raw;
        game.locked = false;
        Ok(())
    }

    async fn abort_refresh(&self, game_id: &str) -> Result<()> {
        if let Some(game) = self.games.write().get_mut(game_id) {
            game.locked = false;
        }
        Ok(())
    }
}
