//! Ingestion orchestration.
//!
//! `ingest` is the boundary operation tying the pieces together: team
//! registry sync, optional historical backfill (bulk shape, batched
//! writes), then today's schedule (daily shape, sequential writes).

use crate::clients::ScheduleFeed;
use crate::errors::Result;
use crate::models::{season_id, IngestSummary, Tagged};
use crate::store::DocumentStore;
use chrono::{Datelike, Utc};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

pub mod games;
pub mod teams;

pub use games::{
    backfill_season, sync_daily_schedule, upsert_game, ExternalGame, WriteDecision,
};
pub use teams::sync_teams;

/// Pipeline tuning knobs, env-overridable.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Minimum interval between live refreshes of one game.
    pub refresh_min_interval: chrono::Duration,
    /// Maximum documents per atomic batch commit.
    pub batch_size: usize,
    /// Pause between batch commits during a backfill.
    pub batch_pause: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            refresh_min_interval: chrono::Duration::seconds(2),
            batch_size: 500,
            batch_pause: Duration::from_millis(500),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables with fallback to defaults.
    pub fn from_env() -> Self {
        Self {
            refresh_min_interval: chrono::Duration::seconds(
                env::var("REFRESH_MIN_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            batch_size: env::var("INGEST_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            batch_pause: Duration::from_millis(
                env::var("INGEST_BATCH_PAUSE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
            ),
        }
    }
}

/// Options for one ingest run.
#[derive(Clone, Copy, Debug, Default)]
pub struct IngestOptions {
    /// When set, backfill every season from this starting year through the
    /// current one before ingesting today's schedule.
    pub backfill_from_year: Option<i32>,
}

/// Full ingest: team sync, optional backfill, today's games. A season that
/// fails to backfill is logged and skipped so one bad season cannot lose
/// the rest of the run.
pub async fn ingest(
    store: &dyn DocumentStore,
    feed: &dyn ScheduleFeed,
    options: IngestOptions,
    config: &PipelineConfig,
) -> Result<Tagged<IngestSummary>> {
    let now = Utc::now();
    let today = now.date_naive();
    let mut summary = IngestSummary {
        teams_added: sync_teams(store, feed).await?,
        ..IngestSummary::default()
    };

    if let Some(from_year) = options.backfill_from_year {
        // First calendar year of the current season, e.g. 2024 for "20242025".
        let current_start = if today.month() >= 10 {
            today.year()
        } else {
            today.year() - 1
        };
        for year in from_year..=current_start {
            let season = format!("{}{}", year, year + 1);
            match backfill_season(store, feed, &season, config).await {
                Ok(s) => summary.merge(s),
                Err(e) => warn!("Backfill of season {} failed: {}", season, e),
            }
        }
    }

    summary.merge(sync_daily_schedule(store, feed, today, now).await?);

    info!(
        "Ingest done (season {}): teams_added={}, created={}, updated={}, skipped={}, failed={}",
        season_id(today),
        summary.teams_added,
        summary.games_created,
        summary.games_updated,
        summary.games_skipped,
        summary.games_failed
    );
    Ok(Tagged::api(summary))
}
