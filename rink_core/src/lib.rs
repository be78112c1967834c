//! Rinkline Core - NHL schedule, score, and play-by-play pipeline.
//!
//! This crate provides:
//! - Feed clients for the NHL web and stats APIs with bounded retry
//! - Team registry sync (insert-only, keyed by abbreviation)
//! - Game upsert engine for bulk season backfills and daily schedules
//! - Live score refresh with per-document locking and throttling
//! - Goal extraction from play-by-play with roster name resolution
//! - Team statistics cache with FINAL-game staleness detection
//!
//! Storage is abstracted behind [`store::DocumentStore`]; the crate ships a
//! Postgres implementation and an in-memory store used by the test suite.

pub mod clients;
pub mod errors;
pub mod live;
pub mod models;
pub mod stats;
pub mod store;
pub mod sync;

pub use clients::{NhlApiClient, ScheduleFeed};
pub use errors::{PipelineError, Result};
pub use live::{extract_goals, refresh_game, ScoreSnapshot};
pub use models::{
    season_id, DataSource, GameDoc, GameStatus, Goal, IngestSummary, Side, Tagged, TeamDoc,
    TeamStatsCache,
};
pub use stats::get_team_stats;
pub use store::{DocumentStore, MemoryStore, PgStore};
pub use sync::{ingest, IngestOptions, PipelineConfig};
