//! Team registry sync.
//!
//! Insert-only: upstream teams not yet present (matched by abbreviation)
//! are inserted with a freshly generated id; existing entries are never
//! updated or removed. Read-then-insert is not fully race-proof, which is
//! acceptable because the team set changes rarely.

use crate::clients::ScheduleFeed;
use crate::errors::Result;
use crate::models::TeamDoc;
use crate::store::DocumentStore;
use tracing::{debug, info};
use uuid::Uuid;

/// Fetch the bulk team list and insert every unseen abbreviation.
/// Returns the number of teams added.
pub async fn sync_teams(store: &dyn DocumentStore, feed: &dyn ScheduleFeed) -> Result<u32> {
    let upstream = feed.teams().await?;
    let mut added = 0;

    for team in &upstream {
        if store
            .get_team_by_abbreviation(&team.abbreviation)
            .await?
            .is_some()
        {
            continue;
        }
        let doc = TeamDoc {
            id: Uuid::new_v4().to_string(),
            abbreviation: team.abbreviation.clone(),
            display_name: team.full_name.clone(),
            franchise_id: team.franchise_id,
            logo_url: team.logo_url.clone(),
            stats: None,
        };
        debug!("Registering team {} ({})", doc.abbreviation, doc.display_name);
        store.insert_team(&doc).await?;
        added += 1;
    }

    info!(
        "Team registry sync: {} upstream, {} added",
        upstream.len(),
        added
    );
    Ok(added)
}
