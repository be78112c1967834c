//! Team statistics cache.
//!
//! Aggregates are derived entirely from FINAL game documents and cached on
//! the team record. Staleness proxy: the cache is recomputed whenever any
//! FINAL game has a start time newer than `cached_at`. That is coarser
//! than a per-team dependency tracker, but it never serves a result that
//! misses a completed game.

use crate::errors::{PipelineError, Result};
use crate::models::{season_id, GameDoc, Side, Tagged, TeamStatsCache};
use crate::store::DocumentStore;
use chrono::Utc;
use tracing::{debug, info};

/// Return the team's aggregate statistics, recomputing when stale.
///
/// A fresh cache is returned with `source=cache` and zero additional game
/// reads; a recompute persists the new snapshot and returns `source=api`.
pub async fn get_team_stats(
    store: &dyn DocumentStore,
    abbreviation: &str,
) -> Result<Tagged<TeamStatsCache>> {
    let team = store
        .get_team_by_abbreviation(abbreviation)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("team {}", abbreviation)))?;

    if let Some(stats) = &team.stats {
        if !store.has_final_game_after(stats.cached_at).await? {
            debug!("Stats cache hit for {}", abbreviation);
            return Ok(Tagged::cache(stats.clone()));
        }
    }

    // Two equality-filtered queries; the store's query model cannot express
    // the OR across the two nested side fields.
    let home = store
        .final_games_for_franchise(team.franchise_id, Side::Home)
        .await?;
    let away = store
        .final_games_for_franchise(team.franchise_id, Side::Away)
        .await?;
    let stats = compute_stats(&home, &away, Utc::now());

    store.update_team_stats(&team.id, &stats).await?;
    info!(
        "Recomputed stats for {}: {} games all-time ({}-{})",
        abbreviation, stats.all_time_games_played, stats.all_time_wins, stats.all_time_losses
    );
    Ok(Tagged::api(stats))
}

/// Pure aggregation over a franchise's FINAL games. Goals count only the
/// queried side; a win is strictly greater own score, everything else
/// (ties included) counts as a loss.
fn compute_stats(
    home: &[GameDoc],
    away: &[GameDoc],
    now: chrono::DateTime<Utc>,
) -> TeamStatsCache {
    let mut merged: Vec<(&GameDoc, Side)> = home
        .iter()
        .map(|g| (g, Side::Home))
        .chain(away.iter().map(|g| (g, Side::Away)))
        .collect();
    merged.sort_by(|a, b| b.0.start_time.cmp(&a.0.start_time));

    let recent_games: Vec<String> = merged.iter().take(5).map(|(g, _)| g.id.clone()).collect();
    let current_season = season_id(now.date_naive());

    let mut stats = TeamStatsCache {
        season: current_season.clone(),
        season_games_played: 0,
        season_wins: 0,
        season_losses: 0,
        season_total_goals: 0,
        all_time_games_played: 0,
        all_time_wins: 0,
        all_time_losses: 0,
        all_time_total_goals: 0,
        recent_games,
        cached_at: now,
    };

    for (game, side) in &merged {
        let own = game.side_score(*side);
        let opponent = match side {
            Side::Home => game.away.score,
            Side::Away => game.home.score,
        };
        let won = own > opponent;

        stats.all_time_games_played += 1;
        stats.all_time_total_goals += own as u32;
        if won {
            stats.all_time_wins += 1;
        } else {
            stats.all_time_losses += 1;
        }

        if season_id(game.start_time.date_naive()) == current_season {
            stats.season_games_played += 1;
            stats.season_total_goals += own as u32;
            if won {
                stats.season_wins += 1;
            } else {
                stats.season_losses += 1;
            }
        }
    }
    stats
}
