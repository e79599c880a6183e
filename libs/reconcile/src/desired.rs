//! Desired alliance and commander membership derived from the lobby.

use std::collections::HashSet;

use serde::Serialize;
use warstage_id::{PlayerId, TeamId};
use warstage_model::Slot;

use crate::{Fingerprint, InvariantViolation};

/// A team and its slots, both in lobby display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRoster {
    pub team_id: TeamId,
    pub slots: Vec<Slot>,
}

/// One alliance that should exist in the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredAlliance {
    pub team_id: TeamId,
    /// 1-based position in the team list.
    pub rank: u32,
    /// Occupying players in slot order. A player holding two slots appears twice.
    pub players: Vec<PlayerId>,
}

/// The full set of alliances that should exist, in rank order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredState {
    pub alliances: Vec<DesiredAlliance>,
}

/// Map team rosters to desired alliances.
///
/// Ranks follow roster order; empty slots contribute no players.
pub fn derive(rosters: &[TeamRoster]) -> DesiredState {
    let alliances = rosters
        .iter()
        .zip(1u32..)
        .map(|(roster, rank)| DesiredAlliance {
            team_id: roster.team_id,
            rank,
            players: roster
                .slots
                .iter()
                .filter_map(|slot| slot.player_id.clone())
                .collect(),
        })
        .collect();

    DesiredState { alliances }
}

impl DesiredState {
    /// Number of alliances that should exist.
    pub fn alliance_count(&self) -> u32 {
        u32::try_from(self.alliances.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.alliances.is_empty()
    }

    /// Look up the desired alliance for a team.
    pub fn get(&self, team_id: TeamId) -> Option<&DesiredAlliance> {
        self.alliances.iter().find(|a| a.team_id == team_id)
    }

    /// Check that teams are unique and ranks are dense 1..N in order.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::with_capacity(self.alliances.len());
        for (alliance, expected) in self.alliances.iter().zip(1u32..) {
            if !seen.insert(alliance.team_id) {
                return Err(InvariantViolation::DuplicateTeam(alliance.team_id));
            }
            if alliance.rank != expected {
                return Err(InvariantViolation::RankGap {
                    team_id: alliance.team_id,
                    expected,
                    actual: alliance.rank,
                });
            }
        }
        Ok(())
    }

    /// Content hash; identical snapshots always produce the same value.
    pub fn fingerprint(&self) -> Fingerprint {
        let alliances: Vec<serde_json::Value> = self
            .alliances
            .iter()
            .map(|a| {
                serde_json::json!({
                    "team_id": a.team_id.to_string(),
                    "rank": a.rank,
                    "players": a.players.iter().map(PlayerId::as_str).collect::<Vec<_>>(),
                })
            })
            .collect();
        Fingerprint::from_json(&serde_json::json!({ "alliances": alliances }))
    }
}
