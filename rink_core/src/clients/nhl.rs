//! NHL web API client.
//!
//! Two upstream hosts: the gamecenter/schedule API and the legacy stats
//! REST API (bulk team and historical game feeds). Bulk endpoints back off
//! and retry on HTTP 429; per-game live calls propagate errors immediately.

use crate::clients::{
    FeedBulkGame, FeedPlay, FeedPlayByPlay, FeedRosterEntry, FeedScheduleGame, FeedScore,
    FeedTeam, ScheduleFeed,
};
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const WEB_API_BASE: &str = "https://api-web.nhle.com/v1";
const STATS_API_BASE: &str = "https://api.nhle.com/stats/rest/en";

/// Total attempts for bulk endpoints before giving up with
/// `RateLimitExceeded`.
const MAX_BULK_ATTEMPTS: u32 = 3;
/// Backoff when a 429 response carries no Retry-After header.
const DEFAULT_BACKOFF_SECS: u64 = 60;

pub struct NhlApiClient {
    client: Client,
    web_base: String,
    stats_base: String,
}

impl NhlApiClient {
    pub fn new() -> Self {
        Self::with_bases(WEB_API_BASE, STATS_API_BASE)
    }

    /// Point the client at alternate hosts (used against local stubs).
    pub fn with_bases(web_base: &str, stats_base: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            web_base: web_base.trim_end_matches('/').to_string(),
            stats_base: stats_base.trim_end_matches('/').to_string(),
        }
    }

    /// Single fetch, no retry. Non-2xx maps to `Upstream` with the
    /// Retry-After header preserved when present.
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(PipelineError::Upstream {
                status: status.as_u16(),
                retry_after,
            });
        }
        Ok(resp.json().await?)
    }

    /// Bulk fetch: 429 responses back off and retry, everything else
    /// propagates from the attempt that produced it.
    async fn fetch_json_bulk(&self, url: &str) -> Result<Value> {
        retry_on_rate_limit(url, || self.fetch_json(url)).await
    }
}

/// Retry wrapper for bulk endpoints: on 429 back off by Retry-After
/// (default 60s) and re-invoke the operation, up to `MAX_BULK_ATTEMPTS`
/// total, then give up with `RateLimitExceeded`. Non-429 errors propagate
/// immediately.
async fn retry_on_rate_limit<T, F, Fut>(url: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(PipelineError::Upstream {
                status: 429,
                retry_after,
            }) => {
                if attempt >= MAX_BULK_ATTEMPTS {
                    return Err(PipelineError::RateLimitExceeded { attempts: attempt });
                }
                let backoff = retry_after.unwrap_or(DEFAULT_BACKOFF_SECS);
                warn!(
                    "Rate limited on {} (attempt {}/{}), backing off {}s",
                    url, attempt, MAX_BULK_ATTEMPTS, backoff
                );
                tokio::time::sleep(Duration::from_secs(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

impl Default for NhlApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleFeed for NhlApiClient {
    async fn teams(&self) -> Result<Vec<FeedTeam>> {
        let url = format!("{}/team", self.stats_base);
        let data = self.fetch_json_bulk(&url).await?;

        let mut teams = Vec::new();
        if let Some(entries) = data["data"].as_array() {
            for entry in entries {
                let abbr = entry["triCode"].as_str().unwrap_or_default().to_string();
                if abbr.is_empty() {
                    continue;
                }
                teams.push(FeedTeam {
                    upstream_id: entry["id"].as_i64().unwrap_or(-1),
                    full_name: entry["fullName"].as_str().unwrap_or(&abbr).to_string(),
                    franchise_id: entry["franchiseId"].as_i64().unwrap_or(-1),
                    logo_url: format!("https://assets.nhle.com/logos/nhl/svg/{}_light.svg", abbr),
                    abbreviation: abbr,
                });
            }
        }
        Ok(teams)
    }

    async fn schedule_by_date(&self, date: NaiveDate) -> Result<Vec<FeedScheduleGame>> {
        let day = date.format("%Y-%m-%d").to_string();
        let url = format!("{}/schedule/{}", self.web_base, day);
        let data = self.fetch_json_bulk(&url).await?;

        let mut games = Vec::new();
        if let Some(week) = data["gameWeek"].as_array() {
            for game_day in week {
                if game_day["date"].as_str() != Some(day.as_str()) {
                    continue;
                }
                if let Some(day_games) = game_day["games"].as_array() {
                    for game in day_games {
                        games.push(parse_schedule_game(game));
                    }
                }
            }
        }
        Ok(games)
    }

    async fn current_scores(&self) -> Result<Vec<FeedScore>> {
        let url = format!("{}/score/now", self.web_base);
        let data = self.fetch_json(&url).await?;

        let mut scores = Vec::new();
        if let Some(entries) = data["games"].as_array() {
            for game in entries {
                scores.push(FeedScore {
                    id: json_id(&game["id"]),
                    home_score: game["homeTeam"]["score"].as_u64().unwrap_or(0) as u16,
                    away_score: game["awayTeam"]["score"].as_u64().unwrap_or(0) as u16,
                    state: game["gameState"].as_str().unwrap_or_default().to_string(),
                    raw: game.clone(),
                });
            }
        }
        Ok(scores)
    }

    async fn season_games(&self, season: &str) -> Result<Vec<FeedBulkGame>> {
        let url = format!(
            "{}/game?cayenneExp=season={}",
            self.stats_base, season
        );
        let data = self.fetch_json_bulk(&url).await?;

        let mut games = Vec::new();
        if let Some(entries) = data["data"].as_array() {
            for game in entries {
                games.push(FeedBulkGame {
                    id: json_id(&game["id"]),
                    start_time: parse_instant(
                        game["easternStartTime"]
                            .as_str()
                            .or_else(|| game["gameDate"].as_str())
                            .unwrap_or_default(),
                    ),
                    home_team_id: game["homeTeamId"].as_i64().unwrap_or(-1),
                    away_team_id: game["visitingTeamId"].as_i64().unwrap_or(-1),
                    home_score: game["homeScore"].as_u64().unwrap_or(0) as u16,
                    away_score: game["visitingScore"].as_u64().unwrap_or(0) as u16,
                    status_code: game["gameStateId"].as_i64().unwrap_or(0),
                    raw: game.clone(),
                });
            }
        }
        Ok(games)
    }

    async fn play_by_play(&self, game_id: &str) -> Result<FeedPlayByPlay> {
        let url = format!("{}/gamecenter/{}/play-by-play", self.web_base, game_id);
        let data = self.fetch_json(&url).await?;

        let mut pbp = FeedPlayByPlay::default();
        if let Some(spots) = data["rosterSpots"].as_array() {
            for spot in spots {
                let Some(player_id) = spot["playerId"].as_i64() else {
                    continue;
                };
                let first = spot["firstName"]["default"].as_str().unwrap_or_default();
                let last = spot["lastName"]["default"].as_str().unwrap_or_default();
                pbp.roster.push(FeedRosterEntry {
                    player_id,
                    full_name: format!("{} {}", first, last).trim().to_string(),
                });
            }
        }
        if let Some(plays) = data["plays"].as_array() {
            for play in plays {
                let details = &play["details"];
                pbp.plays.push(FeedPlay {
                    type_key: play["typeDescKey"].as_str().unwrap_or_default().to_string(),
                    period: play["periodDescriptor"]["number"].as_u64().unwrap_or(1) as u8,
                    time_in_period: play["timeInPeriod"].as_str().unwrap_or("00:00").to_string(),
                    home_score: details["homeScore"].as_u64().unwrap_or(0) as u16,
                    away_score: details["awayScore"].as_u64().unwrap_or(0) as u16,
                    scorer_id: details["scoringPlayerId"].as_i64(),
                    goalie_id: details["goalieInNetId"].as_i64(),
                    assist1_id: details["assist1PlayerId"].as_i64(),
                    assist2_id: details["assist2PlayerId"].as_i64(),
                });
            }
        }
        Ok(pbp)
    }

    fn feed_name(&self) -> &str {
        "nhl-web-api"
    }
}

fn parse_schedule_game(game: &Value) -> FeedScheduleGame {
    FeedScheduleGame {
        id: json_id(&game["id"]),
        start_time: parse_instant(game["startTimeUTC"].as_str().unwrap_or_default()),
        home_abbr: game["homeTeam"]["abbrev"].as_str().unwrap_or_default().to_string(),
        home_name: team_display_name(&game["homeTeam"]),
        away_abbr: game["awayTeam"]["abbrev"].as_str().unwrap_or_default().to_string(),
        away_name: team_display_name(&game["awayTeam"]),
        raw: game.clone(),
    }
}

/// "<place> <common name>", falling back to whichever part exists, then the
/// abbreviation.
fn team_display_name(team: &Value) -> String {
    let place = team["placeName"]["default"].as_str().unwrap_or_default();
    let common = team["commonName"]["default"].as_str().unwrap_or_default();
    let joined = format!("{} {}", place, common).trim().to_string();
    if joined.is_empty() {
        team["abbrev"].as_str().unwrap_or_default().to_string()
    } else {
        joined
    }
}

/// Upstream ids appear both as numbers and strings.
fn json_id(v: &Value) -> String {
    match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

/// Parse an upstream timestamp, accepting RFC 3339 or a bare local
/// datetime (legacy stats feed). Unparseable input maps to the epoch.
fn parse_instant(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::<Utc>::UNIX_EPOCH
}
