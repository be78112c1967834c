//! Game upsert engine.
//!
//! Heterogeneous upstream event shapes are resolved into the tagged
//! `ExternalGame` variant at the boundary, each variant normalized into the
//! canonical `GameDoc` by its own mapping function. The write policy then
//! decides created / updated / skipped against the persisted state, so
//! re-ingesting unchanged data is a no-op.

use crate::clients::{FeedBulkGame, FeedScheduleGame, FeedScore, FeedTeam, ScheduleFeed};
use crate::errors::Result;
use crate::models::{GameDoc, GameSide, GameStatus, IngestSummary};
use crate::store::DocumentStore;
use crate::sync::PipelineConfig;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Sentinel franchise id when the registry has no entry for a side.
pub const UNKNOWN_FRANCHISE: i64 = -1;

/// The two upstream event shapes, resolved once at the boundary.
pub enum ExternalGame {
    /// Bulk/historical shape: numeric team ids, embedded score/status.
    Bulk(FeedBulkGame),
    /// Daily-schedule shape: abbreviation-keyed teams, score joined from
    /// the current-scores feed by game id.
    Daily {
        game: FeedScheduleGame,
        score: Option<FeedScore>,
    },
}

/// Outcome of one write decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteDecision {
    Created,
    Updated,
    Skipped,
}

/// Map the bulk shape into a canonical game. Unknown team ids fall back to
/// placeholder identity with the unknown-franchise sentinel.
pub fn normalize_bulk(game: &FeedBulkGame, teams: &HashMap<i64, FeedTeam>) -> GameDoc {
    let side = |team_id: i64, score: u16| -> GameSide {
        match teams.get(&team_id) {
            Some(team) => GameSide {
                abbreviation: team.abbreviation.clone(),
                name: team.full_name.clone(),
                score,
                franchise_id: team.franchise_id,
            },
            None => GameSide {
                abbreviation: format!("T{}", team_id),
                name: "Unknown".to_string(),
                score,
                franchise_id: UNKNOWN_FRANCHISE,
            },
        }
    };

    GameDoc {
        id: game.id.clone(),
        start_time: game.start_time,
        status: GameStatus::from_bulk_code(game.status_code),
        home: side(game.home_team_id, game.home_score),
        away: side(game.away_team_id, game.away_score),
        last_refreshed_at: None,
        locked: false,
        goals: BTreeMap::new(),
        raw: game.raw.clone(),
    }
}

/// Map the daily-schedule shape into a canonical game, joining the score
/// entry matched by game id and resolving franchise ids through the team
/// registry (unknown abbreviations get the -1 sentinel).
pub async fn normalize_daily(
    game: &FeedScheduleGame,
    score: Option<&FeedScore>,
    store: &dyn DocumentStore,
) -> Result<GameDoc> {
    let franchise_of = |team: Option<crate::models::TeamDoc>| {
        team.map(|t| t.franchise_id).unwrap_or(UNKNOWN_FRANCHISE)
    };
    let home_franchise = franchise_of(store.get_team_by_abbreviation(&game.home_abbr).await?);
    let away_franchise = franchise_of(store.get_team_by_abbreviation(&game.away_abbr).await?);

    let status = score
        .map(|s| GameStatus::from_feed_state(&s.state))
        .unwrap_or(GameStatus::Scheduled);

    Ok(GameDoc {
        id: game.id.clone(),
        start_time: game.start_time,
        status,
        home: GameSide {
            abbreviation: game.home_abbr.clone(),
            name: game.home_name.clone(),
            score: score.map(|s| s.home_score).unwrap_or(0),
            franchise_id: home_franchise,
        },
        away: GameSide {
            abbreviation: game.away_abbr.clone(),
            name: game.away_name.clone(),
            score: score.map(|s| s.away_score).unwrap_or(0),
            franchise_id: away_franchise,
        },
        last_refreshed_at: None,
        locked: false,
        goals: BTreeMap::new(),
        raw: game.raw.clone(),
    })
}

/// Write policy: insert when absent; never touch a FINAL document; update
/// a non-terminal document only when status or either score changed, and
/// (daily path only) the scheduled start time has already passed.
pub fn decide_write(
    existing: Option<&GameDoc>,
    candidate: &GameDoc,
    now: DateTime<Utc>,
    daily: bool,
) -> WriteDecision {
    let Some(existing) = existing else {
        return WriteDecision::Created;
    };
    if existing.status.is_terminal() {
        return WriteDecision::Skipped;
    }

    let next_status = existing.status.advance_to(candidate.status);
    let changed = next_status != existing.status
        || existing.home.score != candidate.home.score
        || existing.away.score != candidate.away.score;
    if !changed {
        return WriteDecision::Skipped;
    }
    if daily && candidate.start_time > now {
        return WriteDecision::Skipped;
    }
    WriteDecision::Updated
}

/// Build the document actually written on an update: candidate fields, but
/// status applied monotonically and refresh/goal state carried over from
/// the persisted document.
fn merge_for_update(existing: &GameDoc, candidate: &GameDoc) -> GameDoc {
    let mut merged = candidate.clone();
    merged.status = existing.status.advance_to(candidate.status);
    merged.goals = existing.goals.clone();
    merged.last_refreshed_at = existing.last_refreshed_at;
    merged.locked = existing.locked;
    merged
}

/// One read-check-write cycle for a single external event. Used by the
/// sequential daily path; the batch path shares the decision logic but
/// groups its writes.
pub async fn upsert_game(
    store: &dyn DocumentStore,
    external: ExternalGame,
    teams: &HashMap<i64, FeedTeam>,
    now: DateTime<Utc>,
) -> Result<WriteDecision> {
    let (candidate, daily) = match &external {
        ExternalGame::Bulk(game) => (normalize_bulk(game, teams), false),
        ExternalGame::Daily { game, score } => {
            (normalize_daily(game, score.as_ref(), store).await?, true)
        }
    };

    let existing = store.get_game(&candidate.id).await?;
    let decision = decide_write(existing.as_ref(), &candidate, now, daily);
    match (decision, existing) {
        (WriteDecision::Created, _) => store.put_game(&candidate).await?,
        (WriteDecision::Updated, Some(existing)) => {
            store.put_game(&merge_for_update(&existing, &candidate)).await?;
        }
        _ => {}
    }
    debug!("upsert {}: {:?}", candidate.id, decision);
    Ok(decision)
}

/// Historical backfill for one season: bulk shape, batched writes. Writes
/// are grouped into atomic batches of at most `config.batch_size`
/// documents with a fixed pause between batches; a failure normalizing or
/// reading one game is logged and skipped rather than aborting the run.
pub async fn backfill_season(
    store: &dyn DocumentStore,
    feed: &dyn ScheduleFeed,
    season: &str,
    config: &PipelineConfig,
) -> Result<IngestSummary> {
    let teams: HashMap<i64, FeedTeam> = feed
        .teams()
        .await?
        .into_iter()
        .map(|t| (t.upstream_id, t))
        .collect();
    let games = feed.season_games(season).await?;
    info!("Backfilling season {}: {} upstream games", season, games.len());

    let mut summary = IngestSummary::default();
    let mut pending: Vec<GameDoc> = Vec::new();
    let now = Utc::now();

    for game in &games {
        let candidate = normalize_bulk(game, &teams);
        let existing = match store.get_game(&candidate.id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Skipping game {} during backfill: {}", candidate.id, e);
                summary.games_failed += 1;
                continue;
            }
        };
        match (decide_write(existing.as_ref(), &candidate, now, false), existing) {
            (WriteDecision::Created, _) => {
                summary.games_created += 1;
                pending.push(candidate);
            }
            (WriteDecision::Updated, Some(existing)) => {
                summary.games_updated += 1;
                pending.push(merge_for_update(&existing, &candidate));
            }
            _ => summary.games_skipped += 1,
        }
    }

    let mut batches = pending.chunks(config.batch_size).peekable();
    while let Some(batch) = batches.next() {
        store.put_games_batch(batch).await?;
        debug!("Committed batch of {} games for season {}", batch.len(), season);
        if batches.peek().is_some() {
            tokio::time::sleep(config.batch_pause).await;
        }
    }

    info!(
        "Season {} backfill: created={}, updated={}, skipped={}",
        season, summary.games_created, summary.games_updated, summary.games_skipped
    );
    Ok(summary)
}

/// Sequential ingest of one date's schedule: daily shape, one
/// read-check-write cycle per game, scores joined from the current-scores
/// feed.
pub async fn sync_daily_schedule(
    store: &dyn DocumentStore,
    feed: &dyn ScheduleFeed,
    date: chrono::NaiveDate,
    now: DateTime<Utc>,
) -> Result<IngestSummary> {
    let schedule = feed.schedule_by_date(date).await?;
    let scores = feed.current_scores().await?;
    let mut summary = IngestSummary::default();
    let no_teams = HashMap::new();

    for game in schedule {
        let score = scores.iter().find(|s| s.id == game.id).cloned();
        let external = ExternalGame::Daily { game, score };
        match upsert_game(store, external, &no_teams, now).await {
            Ok(WriteDecision::Created) => summary.games_created += 1,
            Ok(WriteDecision::Updated) => summary.games_updated += 1,
            Ok(WriteDecision::Skipped) => summary.games_skipped += 1,
            Err(e) => {
                warn!("Daily upsert failed: {}", e);
                summary.games_failed += 1;
            }
        }
    }

    info!(
        "Daily schedule {}: created={}, updated={}, skipped={}, failed={}",
        date,
        summary.games_created,
        summary.games_updated,
        summary.games_skipped,
        summary.games_failed
    );
    Ok(summary)
}
