//! Live per-game operations: score refresh under lock, goal extraction.

pub mod goals;
pub mod refresh;

pub use goals::extract_goals;
pub use refresh::{refresh_game, ScoreSnapshot};
