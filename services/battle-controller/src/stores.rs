//! Store handles grouped by namespace.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;
use warstage_id::{SlotId, TeamId};
use warstage_model::{Alliance, Commander, DeploymentUnit, Match, Slot, Team, Unit};
use warstage_reconcile::TeamRoster;
use warstage_store::{MemoryStore, ObjectStore, StoreResult};

/// Read-only view of the lobby namespace.
#[derive(Clone)]
pub struct LobbyStores {
    pub matches: Arc<dyn ObjectStore<Match>>,
    pub teams: Arc<dyn ObjectStore<Team>>,
    pub slots: Arc<dyn ObjectStore<Slot>>,
}

impl LobbyStores {
    /// Lobby stores backed by fresh in-memory stores.
    pub fn in_memory() -> (Self, LobbyMemory) {
        let memory = LobbyMemory::default();
        (memory.stores(), memory)
    }

    /// Resolve a match's teams and slots, in display order.
    ///
    /// Teams or slots the match references but the store does not hold are
    /// skipped with a warning; the next lobby change triggers another pass.
    pub async fn rosters(&self, current: &Match) -> StoreResult<Vec<TeamRoster>> {
        let teams: HashMap<TeamId, Team> = self
            .teams
            .all()
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let slots: HashMap<SlotId, Slot> = self
            .slots
            .all()
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut rosters = Vec::with_capacity(current.teams.len());
        for team_id in &current.teams {
            let Some(team) = teams.get(team_id) else {
                warn!(match_id = %current.id, team_id = %team_id, "Match references unknown team");
                continue;
            };
            let mut members = Vec::with_capacity(team.slots.len());
            for slot_id in &team.slots {
                match slots.get(slot_id) {
                    Some(slot) => members.push(slot.clone()),
                    None => {
                        warn!(team_id = %team_id, slot_id = %slot_id, "Team references unknown slot")
                    }
                }
            }
            rosters.push(TeamRoster {
                team_id: team.id,
                slots: members,
            });
        }
        Ok(rosters)
    }
}

/// Concrete in-memory lobby stores, for seeding and failure injection.
#[derive(Clone, Default)]
pub struct LobbyMemory {
    pub matches: Arc<MemoryStore<Match>>,
    pub teams: Arc<MemoryStore<Team>>,
    pub slots: Arc<MemoryStore<Slot>>,
}

impl LobbyMemory {
    pub fn stores(&self) -> LobbyStores {
        LobbyStores {
            matches: self.matches.clone(),
            teams: self.teams.clone(),
            slots: self.slots.clone(),
        }
    }
}

/// The battle namespace, written by the controller.
#[derive(Clone)]
pub struct BattleStores {
    pub alliances: Arc<dyn ObjectStore<Alliance>>,
    pub commanders: Arc<dyn ObjectStore<Commander>>,
    pub deployment_units: Arc<dyn ObjectStore<DeploymentUnit>>,
    pub units: Arc<dyn ObjectStore<Unit>>,
}

impl BattleStores {
    /// Battle stores backed by fresh in-memory stores.
    pub fn in_memory() -> (Self, BattleMemory) {
        let memory = BattleMemory::default();
        (memory.stores(), memory)
    }
}

/// Concrete in-memory battle stores.
#[derive(Clone, Default)]
pub struct BattleMemory {
    pub alliances: Arc<MemoryStore<Alliance>>,
    pub commanders: Arc<MemoryStore<Commander>>,
    pub deployment_units: Arc<MemoryStore<DeploymentUnit>>,
    pub units: Arc<MemoryStore<Unit>>,
}

impl BattleMemory {
    /// Battle stores where every call takes at least `latency`.
    pub fn with_latency(latency: std::time::Duration) -> Self {
        Self {
            alliances: Arc::new(MemoryStore::new().with_latency(latency)),
            commanders: Arc::new(MemoryStore::new().with_latency(latency)),
            deployment_units: Arc::new(MemoryStore::new().with_latency(latency)),
            units: Arc::new(MemoryStore::new().with_latency(latency)),
        }
    }

    pub fn stores(&self) -> BattleStores {
        BattleStores {
            alliances: self.alliances.clone(),
            commanders: self.commanders.clone(),
            deployment_units: self.deployment_units.clone(),
            units: self.units.clone(),
        }
    }

    /// Total mutations issued against the structural battle stores.
    ///
    /// Units are excluded; they are only touched by the direct handlers.
    pub fn structural_mutations(&self) -> u64 {
        self.alliances.mutations().total()
            + self.commanders.mutations().total()
            + self.deployment_units.mutations().total()
    }
}
