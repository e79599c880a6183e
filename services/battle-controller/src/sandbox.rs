//! Sandbox match seeding for the demo binary and tests.

use warstage_id::{MatchId, PlayerId, SlotId, TeamId};
use warstage_model::{Match, Slot, Team};
use warstage_store::StoreResult;

use crate::stores::LobbyStores;

pub const SANDBOX_TITLE: &str = "sandbox";
pub const SANDBOX_MAP: &str = "Maps/Map1.png";

/// Create a two-team match with the host seated once on each side.
pub async fn seed_sandbox(lobby: &LobbyStores, host: &PlayerId) -> StoreResult<Match> {
    let mut teams = Vec::with_capacity(2);
    for _ in 0..2 {
        let slot = lobby
            .slots
            .create(Slot {
                id: SlotId::new(),
                player_id: Some(host.clone()),
            })
            .await?;
        let team = lobby
            .teams
            .create(Team {
                id: TeamId::new(),
                slots: vec![slot.id],
            })
            .await?;
        teams.push(team.id);
    }

    lobby
        .matches
        .create(Match {
            id: MatchId::new(),
            title: SANDBOX_TITLE.to_string(),
            map: SANDBOX_MAP.to_string(),
            teams,
            started: false,
        })
        .await
}
