//! Lobby records: matches, teams, and slots.

use serde::{Deserialize, Serialize};
use warstage_id::{MatchId, PlayerId, SlotId, TeamId};

use crate::{ObjectKind, Record};

/// A match being set up or played in the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub title: String,
    pub map: String,
    /// Teams in display order. Alliance ranks follow this order.
    pub teams: Vec<TeamId>,
    pub started: bool,
}

/// A team inside a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    /// Slots in display order.
    pub slots: Vec<SlotId>,
}

/// A seat in a team, optionally occupied by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub player_id: Option<PlayerId>,
}

impl Slot {
    pub fn is_occupied(&self) -> bool {
        self.player_id.is_some()
    }
}

impl Record for Match {
    type Id = MatchId;
    const KIND: ObjectKind = ObjectKind::Match;

    fn id(&self) -> MatchId {
        self.id
    }
}

impl Record for Team {
    type Id = TeamId;
    const KIND: ObjectKind = ObjectKind::Team;

    fn id(&self) -> TeamId {
        self.id
    }
}

impl Record for Slot {
    type Id = SlotId;
    const KIND: ObjectKind = ObjectKind::Slot;

    fn id(&self) -> SlotId {
        self.id
    }
}
