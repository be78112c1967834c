//! End-to-end pipeline tests against the in-memory store and a scripted
//! feed.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rinkline_core::clients::{
    FeedBulkGame, FeedPlay, FeedPlayByPlay, FeedRosterEntry, FeedScheduleGame, FeedScore,
    FeedTeam, ScheduleFeed,
};
use rinkline_core::models::{DataSource, GameDoc, GameSide, GameStatus, TeamDoc};
use rinkline_core::store::{DocumentStore, MemoryStore};
use rinkline_core::{
    extract_goals, get_team_stats, ingest, refresh_game, IngestOptions, PipelineConfig,
    PipelineError, Result,
};
use std::sync::atomic::{AtomicU32, Ordering};

/// Feed fake returning fixed payloads and counting upstream calls.
#[derive(Default)]
struct ScriptedFeed {
    teams: Vec<FeedTeam>,
    schedule: Vec<FeedScheduleGame>,
    scores: Vec<FeedScore>,
    season: Vec<FeedBulkGame>,
    pbp: FeedPlayByPlay,
    score_calls: AtomicU32,
    pbp_calls: AtomicU32,
}

#[async_trait]
impl ScheduleFeed for ScriptedFeed {
    async fn teams(&self) -> Result<Vec<FeedTeam>> {
        Ok(self.teams.clone())
    }
    async fn schedule_by_date(&self, _date: NaiveDate) -> Result<Vec<FeedScheduleGame>> {
        Ok(self.schedule.clone())
    }
    async fn current_scores(&self) -> Result<Vec<FeedScore>> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }
    async fn season_games(&self, _season: &str) -> Result<Vec<FeedBulkGame>> {
        Ok(self.season.clone())
    }
    async fn play_by_play(&self, _game_id: &str) -> Result<FeedPlayByPlay> {
        self.pbp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pbp.clone())
    }
    fn feed_name(&self) -> &str {
        "scripted"
    }
}

fn team(upstream_id: i64, abbr: &str, name: &str, franchise_id: i64) -> FeedTeam {
    FeedTeam {
        upstream_id,
        abbreviation: abbr.to_string(),
        full_name: name.to_string(),
        franchise_id,
        logo_url: format!("https://assets.nhle.com/logos/{}.svg", abbr),
    }
}

fn schedule_game(id: &str, hours_from_now: i64, home: &str, away: &str) -> FeedScheduleGame {
    FeedScheduleGame {
        id: id.to_string(),
        start_time: Utc::now() + Duration::hours(hours_from_now),
        home_abbr: home.to_string(),
        home_name: format!("{} Hockey Club", home),
        away_abbr: away.to_string(),
        away_name: format!("{} Hockey Club", away),
        raw: serde_json::Value::Null,
    }
}

fn score(id: &str, home: u16, away: u16, state: &str) -> FeedScore {
    FeedScore {
        id: id.to_string(),
        home_score: home,
        away_score: away,
        state: state.to_string(),
        raw: serde_json::Value::Null,
    }
}

fn stored_game(
    id: &str,
    days_ago: i64,
    status: GameStatus,
    home_fid: i64,
    away_fid: i64,
    home_score: u16,
    away_score: u16,
) -> GameDoc {
    GameDoc {
        id: id.to_string(),
        start_time: Utc::now() - Duration::days(days_ago),
        status,
        home: GameSide {
            abbreviation: "TOR".to_string(),
            name: "Toronto Maple Leafs".to_string(),
            score: home_score,
            franchise_id: home_fid,
        },
        away: GameSide {
            abbreviation: "MTL".to_string(),
            name: "Montreal Canadiens".to_string(),
            score: away_score,
            franchise_id: away_fid,
        },
        last_refreshed_at: None,
        locked: false,
        goals: Default::default(),
        raw: serde_json::Value::Null,
    }
}

fn registry_team(abbr: &str, franchise_id: i64) -> TeamDoc {
    TeamDoc {
        id: format!("team-{}", abbr),
        abbreviation: abbr.to_string(),
        display_name: format!("{} Hockey Club", abbr),
        franchise_id,
        logo_url: String::new(),
        stats: None,
    }
}

#[tokio::test]
async fn test_double_ingest_is_idempotent() {
    let store = MemoryStore::new();
    let feed = ScriptedFeed {
        teams: vec![
            team(10, "TOR", "Toronto Maple Leafs", 5),
            team(8, "MTL", "Montreal Canadiens", 1),
        ],
        schedule: vec![
            schedule_game("final-1", -3, "TOR", "MTL"),
            schedule_game("sched-1", 6, "MTL", "TOR"),
        ],
        scores: vec![score("final-1", 3, 2, "OFF")],
        ..Default::default()
    };
    let config = PipelineConfig::default();

    let first = ingest(&store, &feed, IngestOptions::default(), &config)
        .await
        .unwrap();
    assert_eq!(first.source, DataSource::Api);
    assert_eq!(first.value.teams_added, 2);
    assert_eq!(first.value.games_created, 2);
    assert_eq!(first.value.games_updated, 0);

    let second = ingest(&store, &feed, IngestOptions::default(), &config)
        .await
        .unwrap();
    assert_eq!(second.value.teams_added, 0);
    assert_eq!(second.value.games_created, 0);
    assert_eq!(second.value.games_updated, 0);
    assert_eq!(second.value.games_skipped, 2);

    let final_game = store.get_game("final-1").await.unwrap().unwrap();
    assert_eq!(final_game.status, GameStatus::Final);
    assert_eq!(final_game.home.score, 3);
}

#[tokio::test]
async fn test_final_game_is_immutable_across_ingests() {
    let store = MemoryStore::new();
    store
        .put_game(&stored_game("g1", 1, GameStatus::Final, 5, 1, 3, 2))
        .await
        .unwrap();

    // Upstream now claims a different score for the same game.
    let feed = ScriptedFeed {
        schedule: vec![schedule_game("g1", -24, "TOR", "MTL")],
        scores: vec![score("g1", 9, 9, "LIVE")],
        ..Default::default()
    };
    let summary = ingest(
        &store,
        &feed,
        IngestOptions::default(),
        &PipelineConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(summary.value.games_skipped, 1);

    let stored = store.get_game("g1").await.unwrap().unwrap();
    assert_eq!(stored.home.score, 3);
    assert_eq!(stored.status, GameStatus::Final);
}

#[tokio::test]
async fn test_refresh_of_final_game_serves_database_without_upstream_call() {
    let store = MemoryStore::new();
    store
        .put_game(&stored_game("g1", 1, GameStatus::Final, 5, 1, 4, 1))
        .await
        .unwrap();
    let feed = ScriptedFeed::default();

    let result = refresh_game(&store, &feed, "g1", &PipelineConfig::default())
        .await
        .unwrap();
    assert_eq!(result.source, DataSource::Database);
    assert_eq!(result.value.home_score, 4);
    assert_eq!(result.value.status, GameStatus::Final);
    assert_eq!(feed.score_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_refreshes_admit_exactly_one() {
    let store = MemoryStore::new();
    store
        .put_game(&stored_game("g1", 0, GameStatus::Live, 5, 1, 1, 0))
        .await
        .unwrap();
    let feed = ScriptedFeed {
        scores: vec![score("g1", 2, 0, "LIVE")],
        ..Default::default()
    };
    let config = PipelineConfig::default();

    let (a, b) = tokio::join!(
        refresh_game(&store, &feed, "g1", &config),
        refresh_game(&store, &feed, "g1", &config),
    );

    let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(oks, 1);
    let err = if a.is_err() {
        a.unwrap_err()
    } else {
        b.unwrap_err()
    };
    assert!(matches!(
        err,
        PipelineError::Conflict { .. } | PipelineError::TooFrequent { .. }
    ));

    let stored = store.get_game("g1").await.unwrap().unwrap();
    assert!(!stored.locked);
    assert_eq!(stored.home.score, 2);
}

#[tokio::test]
async fn test_second_refresh_within_interval_is_too_frequent() {
    let store = MemoryStore::new();
    store
        .put_game(&stored_game("g1", 0, GameStatus::Live, 5, 1, 1, 0))
        .await
        .unwrap();
    let feed = ScriptedFeed {
        scores: vec![score("g1", 2, 0, "LIVE")],
        ..Default::default()
    };
    let config = PipelineConfig::default();

    refresh_game(&store, &feed, "g1", &config).await.unwrap();
    let err = refresh_game(&store, &feed, "g1", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::TooFrequent { .. }));
    assert_eq!(feed.score_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_goal_extraction_caches_after_first_fetch() {
    let store = MemoryStore::new();
    store
        .put_game(&stored_game("g1", 0, GameStatus::Live, 5, 1, 2, 1))
        .await
        .unwrap();
    let feed = ScriptedFeed {
        pbp: FeedPlayByPlay {
            plays: vec![
                FeedPlay {
                    type_key: "goal".to_string(),
                    period: 1,
                    time_in_period: "15:30".to_string(),
                    home_score: 1,
                    away_score: 0,
                    scorer_id: Some(8),
                    goalie_id: Some(30),
                    assist1_id: None,
                    assist2_id: None,
                },
                FeedPlay {
                    type_key: "goal".to_string(),
                    period: 2,
                    time_in_period: "01:00".to_string(),
                    home_score: 1,
                    away_score: 1,
                    scorer_id: None,
                    goalie_id: None,
                    assist1_id: None,
                    assist2_id: None,
                },
                FeedPlay {
                    type_key: "goal".to_string(),
                    period: 3,
                    time_in_period: "04:17".to_string(),
                    home_score: 2,
                    away_score: 1,
                    scorer_id: Some(8),
                    goalie_id: Some(30),
                    assist1_id: None,
                    assist2_id: None,
                },
            ],
            roster: vec![FeedRosterEntry {
                player_id: 8,
                full_name: "Auston Matthews".to_string(),
            }],
        },
        ..Default::default()
    };

    let first = extract_goals(&store, &feed, "g1").await.unwrap();
    assert_eq!(first.source, DataSource::Api);
    assert_eq!(first.value.len(), 3);

    // Key order tracks game order: periods ascend, cumulative time ascends.
    let cumulative: Vec<&str> = first
        .value
        .values()
        .map(|g| g.cumulative_time.as_str())
        .collect();
    assert_eq!(cumulative, vec!["15:30", "21:00", "44:17"]);
    assert!(!first.value.get("P2-01:00").unwrap().scored_by_home);
    assert_eq!(first.value.get("P1-15:30").unwrap().scorer, "Auston Matthews");
    assert_eq!(first.value.get("P2-01:00").unwrap().scorer, "Unknown");

    let second = extract_goals(&store, &feed, "g1").await.unwrap();
    assert_eq!(second.source, DataSource::Database);
    assert_eq!(second.value.len(), 3);
    assert_eq!(feed.pbp_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_team_stats_compute_cache_and_invalidation() {
    let store = MemoryStore::new();
    store.insert_team(&registry_team("TOR", 5)).await.unwrap();

    // 10 FINAL games for franchise 5: six wins and four losses, 25 goals.
    for i in 0..6 {
        store
            .put_game(&stored_game(
                &format!("w{}", i),
                10 - i,
                GameStatus::Final,
                5,
                1,
                3,
                1,
            ))
            .await
            .unwrap();
    }
    for i in 0..3 {
        store
            .put_game(&stored_game(
                &format!("l{}", i),
                20 + i,
                GameStatus::Final,
                5,
                1,
                1,
                2,
            ))
            .await
            .unwrap();
    }
    store
        .put_game(&stored_game("l3", 30, GameStatus::Final, 5, 1, 4, 5))
        .await
        .unwrap();
    // A LIVE game must not count.
    store
        .put_game(&stored_game("live-1", 0, GameStatus::Live, 5, 1, 2, 2))
        .await
        .unwrap();

    let first = get_team_stats(&store, "TOR").await.unwrap();
    assert_eq!(first.source, DataSource::Api);
    assert_eq!(first.value.all_time_games_played, 10);
    assert_eq!(first.value.all_time_wins, 6);
    assert_eq!(first.value.all_time_losses, 4);
    assert_eq!(
        first.value.all_time_wins + first.value.all_time_losses,
        first.value.all_time_games_played
    );
    assert_eq!(first.value.all_time_total_goals, 25);
    // Most recent five: w5 (5 days ago) back through w1 (9 days ago).
    assert_eq!(
        first.value.recent_games,
        vec!["w5", "w4", "w3", "w2", "w1"]
    );

    // Second read is a cache hit with no recompute.
    let second = get_team_stats(&store, "TOR").await.unwrap();
    assert_eq!(second.source, DataSource::Cache);
    assert_eq!(second.value, first.value);

    // A newly completed game invalidates the cache.
    let mut fresh = stored_game("w6", 0, GameStatus::Final, 5, 1, 2, 0);
    fresh.start_time = Utc::now() + Duration::seconds(5);
    store.put_game(&fresh).await.unwrap();

    let third = get_team_stats(&store, "TOR").await.unwrap();
    assert_eq!(third.source, DataSource::Api);
    assert_eq!(third.value.all_time_games_played, 11);
    assert_eq!(third.value.all_time_wins, 7);
    assert_eq!(third.value.recent_games[0], "w6");
}

#[tokio::test]
async fn test_stats_for_unknown_team_is_not_found() {
    let store = MemoryStore::new();
    let err = get_team_stats(&store, "XXX").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_season_backfill_creates_games_in_bulk() {
    let store = MemoryStore::new();
    let feed = ScriptedFeed {
        teams: vec![
            team(10, "TOR", "Toronto Maple Leafs", 5),
            team(8, "MTL", "Montreal Canadiens", 1),
        ],
        season: vec![
            FeedBulkGame {
                id: "2023020001".to_string(),
                start_time: Utc::now() - Duration::days(300),
                home_team_id: 10,
                away_team_id: 8,
                home_score: 4,
                away_score: 2,
                status_code: 7,
                raw: serde_json::Value::Null,
            },
            FeedBulkGame {
                id: "2023020002".to_string(),
                start_time: Utc::now() - Duration::days(299),
                home_team_id: 8,
                away_team_id: 10,
                home_score: 1,
                away_score: 0,
                status_code: 6,
                raw: serde_json::Value::Null,
            },
        ],
        ..Default::default()
    };

    let summary = rinkline_core::sync::backfill_season(
        &store,
        &feed,
        "20232024",
        &PipelineConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(summary.games_created, 2);

    let g = store.get_game("2023020001").await.unwrap().unwrap();
    assert_eq!(g.status, GameStatus::Final);
    assert_eq!(g.home.abbreviation, "TOR");
    assert_eq!(g.home.franchise_id, 5);
}
