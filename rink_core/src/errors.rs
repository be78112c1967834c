//! Error taxonomy for the ingestion pipeline.
//!
//! All variants are surfaced to the direct caller; nothing here is silently
//! recovered. `TooFrequent` and `Conflict` are benign for the caller (it is
//! expected to rely on its next poll rather than retry immediately).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Non-2xx response from an upstream feed. Retryable only on the bulk
    /// endpoints, where the client backs off and re-attempts.
    #[error("upstream returned HTTP {status}")]
    Upstream {
        status: u16,
        /// Seconds to wait, taken from the Retry-After header when present.
        retry_after: Option<u64>,
    },

    /// Bulk-endpoint retries exhausted. Terminal.
    #[error("rate limit retries exhausted after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// Referenced game/team absent locally or in the upstream response.
    #[error("not found: {0}")]
    NotFound(String),

    /// Per-game refresh throttle violated (another refresh completed less
    /// than the minimum interval ago).
    #[error("refresh throttled for game {game_id}")]
    TooFrequent { game_id: String },

    /// Another refresh holds the game's lock.
    #[error("refresh already in flight for game {game_id}")]
    Conflict { game_id: String },

    /// Transport or decode failure talking to a feed.
    #[error("feed error: {0}")]
    Feed(String),

    /// Persistent store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Feed(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Feed(e.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}
