//! Postgres-backed document store.
//!
//! Each collection is a table holding the full document as jsonb, with the
//! handful of fields the fixed query shapes filter on mirrored into plain
//! columns. The refresh-lock primitives use `SELECT ... FOR UPDATE` so the
//! throttle check, the lock check, and the lock write happen inside one
//! transaction.

use crate::errors::{PipelineError, Result};
use crate::store::{DocumentStore, RefreshUpdate};
use crate::models::{GameDoc, Goal, Side, TeamDoc, TeamStatsCache};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use tracing::info;

/// Pool settings, env-tunable with sensible defaults.
#[derive(Clone, Debug)]
pub struct PgStoreConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: std::time::Duration,
}

impl PgStoreConfig {
    pub fn from_env() -> Self {
        Self {
            max_connections: std::env::var("DB_POOL_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_POOL_MIN_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            acquire_timeout: std::time::Duration::from_secs(
                std::env::var("DB_POOL_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, config: PgStoreConfig) -> Result<Self> {
        info!(
            "Connecting document store pool: max={}, min={}",
            config.max_connections, config.min_connections
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the two collections if absent.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                game_id TEXT PRIMARY KEY,
                start_time TIMESTAMPTZ NOT NULL,
                status TEXT NOT NULL,
                home_franchise_id BIGINT NOT NULL,
                away_franchise_id BIGINT NOT NULL,
                locked BOOLEAN NOT NULL DEFAULT FALSE,
                last_refreshed_at TIMESTAMPTZ,
                doc JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                team_id TEXT PRIMARY KEY,
                abbreviation TEXT NOT NULL UNIQUE,
                doc JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Connectivity health check.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn game_from_row(row: &PgRow) -> Result<GameDoc> {
    let doc: serde_json::Value = row
        .try_get("doc")
        .map_err(|e| PipelineError::Store(e.to_string()))?;
    serde_json::from_value(doc).map_err(|e| PipelineError::Store(e.to_string()))
}

fn team_from_row(row: &PgRow) -> Result<TeamDoc> {
    let doc: serde_json::Value = row
        .try_get("doc")
        .map_err(|e| PipelineError::Store(e.to_string()))?;
    serde_json::from_value(doc).map_err(|e| PipelineError::Store(e.to_string()))
}

fn to_doc<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| PipelineError::Store(e.to_string()))
}

async fn upsert_game<'e, E>(executor: E, game: &GameDoc) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO games (
            game_id, start_time, status, home_franchise_id,
            away_franchise_id, locked, last_refreshed_at, doc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (game_id) DO UPDATE SET
            start_time = EXCLUDED.start_time,
            status = EXCLUDED.status,
            home_franchise_id = EXCLUDED.home_franchise_id,
            away_franchise_id = EXCLUDED.away_franchise_id,
            locked = EXCLUDED.locked,
            last_refreshed_at = EXCLUDED.last_refreshed_at,
            doc = EXCLUDED.doc
        "#,
    )
    .bind(&game.id)
    .bind(game.start_time)
    .bind(game.status.as_str())
    .bind(game.home.franchise_id)
    .bind(game.away.franchise_id)
    .bind(game.locked)
    .bind(game.last_refreshed_at)
    .bind(to_doc(game)?)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get_game(&self, id: &str) -> Result<Option<GameDoc>> {
        let row = sqlx::query("SELECT doc FROM games WHERE game_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| game_from_row(&r)).transpose()
    }

    async fn put_game(&self, game: &GameDoc) -> Result<()> {
        upsert_game(&self.pool, game).await
    }

    async fn put_games_batch(&self, games: &[GameDoc]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for game in games {
            upsert_game(&mut *tx, game).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_goals(&self, game_id: &str, goals: &BTreeMap<String, Goal>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE games SET doc = jsonb_set(doc, '{goals}', $2) WHERE game_id = $1",
        )
        .bind(game_id)
        .bind(to_doc(goals)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("game {}", game_id)));
        }
        Ok(())
    }

    async fn get_team_by_abbreviation(&self, abbr: &str) -> Result<Option<TeamDoc>> {
        let row = sqlx::query("SELECT doc FROM teams WHERE abbreviation = $1")
            .bind(abbr)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| team_from_row(&r)).transpose()
    }

    async fn insert_team(&self, team: &TeamDoc) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO teams (team_id, abbreviation, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (abbreviation) DO NOTHING
            "#,
        )
        .bind(&team.id)
        .bind(&team.abbreviation)
        .bind(to_doc(team)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_team_stats(&self, team_id: &str, stats: &TeamStatsCache) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT doc FROM teams WHERE team_id = $1 FOR UPDATE")
            .bind(team_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("team {}", team_id)))?;
        let mut team = team_from_row(&row)?;
        team.stats = Some(stats.clone());

        sqlx::query("UPDATE teams SET doc = $2 WHERE team_id = $1")
            .bind(team_id)
            .bind(to_doc(&team)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn final_games_for_franchise(
        &self,
        franchise_id: i64,
        side: Side,
    ) -> Result<Vec<GameDoc>> {
        let sql = match side {
            Side::Home => {
                "SELECT doc FROM games WHERE status = 'FINAL' AND home_franchise_id = $1 \
                 ORDER BY start_time DESC"
            }
            Side::Away => {
                "SELECT doc FROM games WHERE status = 'FINAL' AND away_franchise_id = $1 \
                 ORDER BY start_time DESC"
            }
        };
        let rows = sqlx::query(sql)
            .bind(franchise_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(game_from_row).collect()
    }

    async fn has_final_game_after(&self, cutoff: DateTime<Utc>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM games WHERE status = 'FINAL' AND start_time > $1)",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        row.try_get::<bool, _>(0)
            .map_err(|e| PipelineError::Store(e.to_string()))
    }

    async fn begin_refresh(
        &self,
        game_id: &str,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<GameDoc> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT doc, locked, last_refreshed_at FROM games WHERE game_id = $1 FOR UPDATE",
        )
        .bind(game_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("game {}", game_id)))?;

        let mut game = game_from_row(&row)?;
        // The game may have been finalized since the caller's read.
        if game.status.is_terminal() {
            return Err(PipelineError::Conflict {
                game_id: game_id.to_string(),
            });
        }

        let last_refreshed: Option<DateTime<Utc>> = row
            .try_get("last_refreshed_at")
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        if let Some(last) = last_refreshed {
            if now - last < min_interval {
                return Err(PipelineError::TooFrequent {
                    game_id: game_id.to_string(),
                });
            }
        }
        let locked: bool = row
            .try_get("locked")
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        if locked {
            return Err(PipelineError::Conflict {
                game_id: game_id.to_string(),
            });
        }

        sqlx::query(
            "UPDATE games SET locked = TRUE, doc = jsonb_set(doc, '{locked}', 'true'::jsonb) \
             WHERE game_id = $1",
        )
        .bind(game_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        game.locked = true;
        Ok(game)
    }

    async fn commit_refresh(&self, game_id: &str, update: RefreshUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT doc FROM games WHERE game_id = $1 FOR UPDATE")
            .bind(game_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("game {}", game_id)))?;
        let mut game = game_from_row(&row)?;

        game.home.score = update.home_score;
        game.away.score = update.away_score;
        game.status = update.status;
        game.last_refreshed_at = Some(update.last_refreshed_at);
        game.raw = update.raw;
        game.locked = false;

        upsert_game(&mut *tx, &game).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn abort_refresh(&self, game_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE games SET locked = FALSE, doc = jsonb_set(doc, '{locked}', 'false'::jsonb) \
             WHERE game_id = $1",
        )
        .bind(game_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
