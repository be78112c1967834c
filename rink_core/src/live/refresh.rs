//! Live score refresh with document-level locking.
//!
//! The store's `begin_refresh` performs the throttle check, the lock check,
//! and the lock write atomically; this module owns the rest of the state
//! machine: the terminal short-circuit, the upstream lookup, and the
//! guarantee that every failure path after lock acquisition clears it.

use crate::clients::ScheduleFeed;
use crate::errors::{PipelineError, Result};
use crate::models::{GameStatus, Tagged};
use crate::store::{DocumentStore, RefreshUpdate};
use crate::sync::PipelineConfig;
use chrono::Utc;
use tracing::{debug, warn};

/// Score/status view returned by a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreSnapshot {
    pub home_score: u16,
    pub away_score: u16,
    pub status: GameStatus,
}

/// Refresh one game's score from the current-scores feed.
///
/// FINAL games return the stored document immediately (`source=database`)
/// with no upstream call and no lock. Otherwise the refresh runs under the
/// document lock and the per-game throttle; the result is tagged
/// `source=api`.
pub async fn refresh_game(
    store: &dyn DocumentStore,
    feed: &dyn ScheduleFeed,
    game_id: &str,
    config: &PipelineConfig,
) -> Result<Tagged<ScoreSnapshot>> {
    let game = store
        .get_game(game_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("game {}", game_id)))?;

    if game.status.is_terminal() {
        debug!("Game {} is FINAL, serving stored score", game_id);
        return Ok(Tagged::database(ScoreSnapshot {
            home_score: game.home.score,
            away_score: game.away.score,
            status: game.status,
        }));
    }

    let now = Utc::now();
    let locked_doc = store
        .begin_refresh(game_id, now, config.refresh_min_interval)
        .await?;

    // Lock is held from here on; every exit below must release it.
    let scores = match feed.current_scores().await {
        Ok(scores) => scores,
        Err(e) => {
            release_lock(store, game_id).await;
            return Err(e);
        }
    };

    let Some(score) = scores.iter().find(|s| s.id == game_id) else {
        release_lock(store, game_id).await;
        return Err(PipelineError::NotFound(format!(
            "game {} not in current-scores feed",
            game_id
        )));
    };

    let status = locked_doc
        .status
        .advance_to(GameStatus::from_feed_state(&score.state));
    let update = RefreshUpdate {
        home_score: score.home_score,
        away_score: score.away_score,
        status,
        last_refreshed_at: now,
        raw: score.raw.clone(),
    };
    if let Err(e) = store.commit_refresh(game_id, update).await {
        release_lock(store, game_id).await;
        return Err(e);
    }

    debug!(
        "Refreshed game {}: {}-{} {:?}",
        game_id, score.home_score, score.away_score, status
    );
    Ok(Tagged::api(ScoreSnapshot {
        home_score: score.home_score,
        away_score: score.away_score,
        status,
    }))
}

async fn release_lock(store: &dyn DocumentStore, game_id: &str) {
    if let Err(e) = store.abort_refresh(game_id).await {
        warn!("Failed to release refresh lock on {}: {}", game_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        FeedBulkGame, FeedPlayByPlay, FeedScheduleGame, FeedScore, FeedTeam,
    };
    use crate::models::{GameDoc, GameSide};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Feed returning a fixed current-scores payload, counting calls.
    struct ScoresOnlyFeed {
        scores: Vec<FeedScore>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScheduleFeed for ScoresOnlyFeed {
        async fn teams(&self) -> Result<Vec<FeedTeam>> {
            Ok(Vec::new())
        }
        async fn schedule_by_date(&self, _: NaiveDate) -> Result<Vec<FeedScheduleGame>> {
            Ok(Vec::new())
        }
        async fn current_scores(&self) -> Result<Vec<FeedScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
        async fn season_games(&self, _: &str) -> Result<Vec<FeedBulkGame>> {
            Ok(Vec::new())
        }
        async fn play_by_play(&self, _: &str) -> Result<FeedPlayByPlay> {
            Ok(FeedPlayByPlay::default())
        }
        fn feed_name(&self) -> &str {
            "scores-only"
        }
    }

    fn live_game(id: &str) -> GameDoc {
        GameDoc {
            id: id.to_string(),
            start_time: Utc::now() - chrono::Duration::hours(1),
            status: GameStatus::Live,
            home: GameSide {
                abbreviation: "TOR".to_string(),
                name: "Toronto Maple Leafs".to_string(),
                score: 1,
                franchise_id: 5,
            },
            away: GameSide {
                abbreviation: "MTL".to_string(),
                name: "Montreal Canadiens".to_string(),
                score: 0,
                franchise_id: 1,
            },
            last_refreshed_at: None,
            locked: false,
            goals: BTreeMap::new(),
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_missing_upstream_game_clears_lock() {
        let store = MemoryStore::new();
        store.put_game(&live_game("g1")).await.unwrap();
        let feed = ScoresOnlyFeed {
            scores: Vec::new(),
            calls: AtomicU32::new(0),
        };
        let config = PipelineConfig::default();

        let err = refresh_game(&store, &feed, "g1", &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        // The failed refresh must not leave the game locked.
        assert!(!store.get_game("g1").await.unwrap().unwrap().locked);
    }

    #[tokio::test]
    async fn test_refresh_applies_score_and_monotonic_status() {
        let store = MemoryStore::new();
        store.put_game(&live_game("g1")).await.unwrap();
        let feed = ScoresOnlyFeed {
            scores: vec![FeedScore {
                id: "g1".to_string(),
                home_score: 2,
                away_score: 1,
                // Upstream regression to PRE is ignored.
                state: "PRE".to_string(),
                raw: serde_json::Value::Null,
            }],
            calls: AtomicU32::new(0),
        };
        let config = PipelineConfig::default();

        let result = refresh_game(&store, &feed, "g1", &config).await.unwrap();
        assert_eq!(result.source, crate::models::DataSource::Api);
        assert_eq!(result.value.home_score, 2);
        assert_eq!(result.value.status, GameStatus::Live);

        let stored = store.get_game("g1").await.unwrap().unwrap();
        assert!(!stored.locked);
        assert!(stored.last_refreshed_at.is_some());
        assert_eq!(stored.status, GameStatus::Live);
    }
}
