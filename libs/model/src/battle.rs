//! Battle records: alliances, commanders, deployment units, and units.

use serde::{Deserialize, Serialize};
use warstage_id::{AllianceId, CommanderId, DeploymentUnitId, PlayerId, TeamId, UnitId};

use crate::{ObjectKind, Record, UnitClass};

/// A point on the battlefield.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Point at `radius` and `angle` (radians) around `self`.
    pub fn polar_offset(&self, radius: f64, angle: f64) -> Self {
        Self {
            x: self.x + radius * angle.cos(),
            y: self.y + radius * angle.sin(),
        }
    }

    /// Angle (radians) of the vector from `self` towards `target`.
    pub fn angle_to(&self, target: Vec2) -> f64 {
        (target.y - self.y).atan2(target.x - self.x)
    }
}

/// Position and facing of a deployed unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    /// Facing in radians.
    pub facing: f64,
}

/// The unit type and map marker a deployment slot produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub unit_type: UnitClass,
    pub marker: String,
}

/// A team's representation inside the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alliance {
    pub id: AllianceId,
    pub team_id: TeamId,
    /// 1-based rank among the active alliances.
    pub position: u32,
}

/// A player's control handle over an alliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commander {
    pub id: CommanderId,
    pub alliance_id: AllianceId,
    pub player_id: PlayerId,
}

/// A pre-placed formation slot a player can drag onto the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    pub id: DeploymentUnitId,
    pub alliance_id: AllianceId,
    pub hosting_player_id: PlayerId,
    pub unit: UnitDescriptor,
    pub position: Vec2,
    pub reinforcement: bool,
    pub deletable: bool,
}

/// A unit on the battlefield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub alliance_id: AllianceId,
    pub commander_id: Option<CommanderId>,
    pub unit: UnitDescriptor,
    pub placement: Placement,
    pub deletable: bool,
    pub fighters: u32,
    pub deleted_by_gesture: bool,
}

impl Record for Alliance {
    type Id = AllianceId;
    const KIND: ObjectKind = ObjectKind::Alliance;

    fn id(&self) -> AllianceId {
        self.id
    }
}

impl Record for Commander {
    type Id = CommanderId;
    const KIND: ObjectKind = ObjectKind::Commander;

    fn id(&self) -> CommanderId {
        self.id
    }
}

impl Record for DeploymentUnit {
    type Id = DeploymentUnitId;
    const KIND: ObjectKind = ObjectKind::DeploymentUnit;

    fn id(&self) -> DeploymentUnitId {
        self.id
    }
}

impl Record for Unit {
    type Id = UnitId;
    const KIND: ObjectKind = ObjectKind::Unit;

    fn id(&self) -> UnitId {
        self.id
    }
}
