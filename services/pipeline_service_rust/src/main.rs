//! Pipeline Service
//!
//! Command-line entry point for the NHL data pipeline:
//! - `ingest [--from-year YYYY]` - sync teams and games, optional backfill
//! - `refresh <game_id>`         - live score refresh for one game
//! - `goals <game_id>`           - extract and store the goal list
//! - `stats <abbr>`              - cached team statistics

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use rinkline_core::store::postgres::PgStoreConfig;
use rinkline_core::{
    extract_goals, get_team_stats, ingest, refresh_game, IngestOptions, NhlApiClient,
    PgStore, PipelineConfig, ScheduleFeed,
};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("usage: pipeline_service_rust <ingest|refresh|goals|stats> [args]");
    };

    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let store = PgStore::connect(&database_url, PgStoreConfig::from_env()).await?;
    store.ensure_schema().await?;
    store.ping().await?;

    let feed = NhlApiClient::new();
    let config = PipelineConfig::from_env();
    info!("Pipeline service started, feed={}", feed.feed_name());

    match command.as_str() {
        "ingest" => {
            let from_year = match args.get(1).map(String::as_str) {
                Some("--from-year") => Some(
                    args.get(2)
                        .context("--from-year requires a year")?
                        .parse::<i32>()
                        .context("--from-year must be a calendar year")?,
                ),
                Some(other) => bail!("unknown ingest flag: {}", other),
                None => None,
            };
            let options = IngestOptions {
                backfill_from_year: from_year,
            };
            let summary = ingest(&store, &feed, options, &config).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "refresh" => {
            let game_id = args.get(1).context("refresh requires a game id")?;
            let snapshot = refresh_game(&store, &feed, game_id, &config).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "goals" => {
            let game_id = args.get(1).context("goals requires a game id")?;
            let goals = extract_goals(&store, &feed, game_id).await?;
            println!("{}", serde_json::to_string_pretty(&goals)?);
        }
        "stats" => {
            let abbr = args.get(1).context("stats requires a team abbreviation")?;
            let stats = get_team_stats(&store, abbr.to_uppercase().as_str()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        other => bail!("unknown command: {}", other),
    }

    Ok(())
}
