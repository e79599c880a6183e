//! Diff planning: what to create, update, and delete to converge.
//!
//! Planning runs in three phases because later phases need identities
//! assigned by earlier ones:
//!
//! 1. [`plan_alliances`] against the actual alliances.
//! 2. [`plan_commanders`] against the alliances that survived phase 1.
//! 3. [`plan_layouts`] against the same settled alliances.
//!
//! Each phase builds its lookup indexes once from the snapshot it is given.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use warstage_id::{AllianceId, CommanderId, DeploymentUnitId, PlayerId, TeamId};
use warstage_model::{Alliance, Commander, DeploymentUnit, UnitDescriptor};

use crate::{DesiredState, FormationSlot, Geometry};

// =============================================================================
// Policy
// =============================================================================

/// What to do with commanders whose player left a slot of a surviving team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommanderPolicy {
    /// Delete commanders that no occupied slot accounts for.
    #[default]
    Prune,
    /// Only ever add commanders; they disappear with their alliance.
    Retain,
}

impl std::fmt::Display for CommanderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommanderPolicy::Prune => write!(f, "prune"),
            CommanderPolicy::Retain => write!(f, "retain"),
        }
    }
}

impl std::str::FromStr for CommanderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prune" => Ok(CommanderPolicy::Prune),
            "retain" => Ok(CommanderPolicy::Retain),
            other => Err(format!("unknown commander policy: {other}")),
        }
    }
}

// =============================================================================
// Alliances
// =============================================================================

/// Alliance changes for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlliancePlan {
    /// New alliances, with fresh identities.
    pub create: Vec<Alliance>,
    /// Existing alliances with their new position applied.
    pub rerank: Vec<Alliance>,
    /// Alliances whose team is gone, or duplicates for one team.
    pub remove: Vec<Alliance>,
    pub unchanged: Vec<Alliance>,
}

impl AlliancePlan {
    /// Returns true if the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.rerank.is_empty() && self.remove.is_empty()
    }
}

/// Match desired alliances to actual ones by team.
///
/// An alliance whose rank changed is updated in place so its identity (and
/// every commander pointing at it) survives reordering.
pub fn plan_alliances(desired: &DesiredState, actual: &[Alliance]) -> AlliancePlan {
    let mut by_team: HashMap<TeamId, &Alliance> = HashMap::with_capacity(actual.len());
    for alliance in actual {
        by_team.entry(alliance.team_id).or_insert(alliance);
    }

    let mut plan = AlliancePlan::default();
    let mut kept: HashSet<AllianceId> = HashSet::with_capacity(desired.alliances.len());

    for wanted in &desired.alliances {
        match by_team.get(&wanted.team_id) {
            None => plan.create.push(Alliance {
                id: AllianceId::new(),
                team_id: wanted.team_id,
                position: wanted.rank,
            }),
            Some(existing) => {
                kept.insert(existing.id);
                if existing.position == wanted.rank {
                    plan.unchanged.push((*existing).clone());
                } else {
                    let mut updated = (*existing).clone();
                    updated.position = wanted.rank;
                    plan.rerank.push(updated);
                }
            }
        }
    }

    plan.remove = actual
        .iter()
        .filter(|a| !kept.contains(&a.id))
        .cloned()
        .collect();

    plan
}

/// How an alliance got into its settled state this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllianceChange {
    Created,
    Reranked,
    Unchanged,
}

/// An alliance known to exist after the alliance phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledAlliance {
    pub alliance: Alliance,
    pub change: AllianceChange,
}

// =============================================================================
// Commanders
// =============================================================================

/// Commander changes for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommanderPlan {
    pub create: Vec<Commander>,
    pub remove: Vec<Commander>,
}

impl CommanderPlan {
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.remove.is_empty()
    }
}

/// Ensure one commander per (alliance, occupied slot).
///
/// Existing commanders are matched by (alliance, player) and left untouched.
/// Commanders of alliances in `deferred` are left alone: those alliances are
/// being removed or did not settle this pass. Commanders of any other unknown
/// alliance are orphans and always removed.
pub fn plan_commanders(
    desired: &DesiredState,
    settled: &[SettledAlliance],
    deferred: &BTreeSet<AllianceId>,
    actual: &[Commander],
    policy: CommanderPolicy,
) -> CommanderPlan {
    let by_team: HashMap<TeamId, &Alliance> = settled
        .iter()
        .map(|s| (s.alliance.team_id, &s.alliance))
        .collect();
    let live: HashSet<AllianceId> = settled.iter().map(|s| s.alliance.id).collect();

    let mut plan = CommanderPlan::default();
    let mut by_alliance: HashMap<AllianceId, Vec<&Commander>> = HashMap::new();
    for commander in actual {
        if live.contains(&commander.alliance_id) {
            by_alliance
                .entry(commander.alliance_id)
                .or_default()
                .push(commander);
        } else if !deferred.contains(&commander.alliance_id) {
            plan.remove.push(commander.clone());
        }
    }

    for wanted in &desired.alliances {
        let Some(alliance) = by_team.get(&wanted.team_id) else {
            continue;
        };
        let existing = by_alliance.remove(&alliance.id).unwrap_or_default();

        let mut held: HashMap<&PlayerId, Vec<&Commander>> = HashMap::new();
        for commander in &existing {
            held.entry(&commander.player_id).or_default().push(commander);
        }

        for (player, seats) in seat_counts(&wanted.players) {
            let have = held.remove(player).unwrap_or_default();
            for _ in have.len()..seats {
                plan.create.push(Commander {
                    id: CommanderId::new(),
                    alliance_id: alliance.id,
                    player_id: player.clone(),
                });
            }
            if policy == CommanderPolicy::Prune {
                plan.remove
                    .extend(have.into_iter().skip(seats).map(|c| c.clone()));
            }
        }

        if policy == CommanderPolicy::Prune {
            plan.remove.extend(
                existing
                    .iter()
                    .filter(|c| held.contains_key(&c.player_id))
                    .map(|c| (*c).clone()),
            );
        }
    }

    plan
}

/// Occupied seat count per player, in order of first appearance.
fn seat_counts(players: &[PlayerId]) -> Vec<(&PlayerId, usize)> {
    let mut counts: Vec<(&PlayerId, usize)> = Vec::new();
    for player in players {
        match counts.iter_mut().find(|(p, _)| *p == player) {
            Some((_, n)) => *n += 1,
            None => counts.push((player, 1)),
        }
    }
    counts
}

// =============================================================================
// Deployment layouts
// =============================================================================

/// One slot of the reinforcement formation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormationEntry {
    pub slot: FormationSlot,
    pub unit: UnitDescriptor,
}

/// Ordered list of deployment slots every alliance receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormationTemplate {
    pub entries: Vec<FormationEntry>,
}

impl FormationTemplate {
    pub fn new(entries: Vec<FormationEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inputs shared by every layout decision in a pass.
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    pub template: &'a FormationTemplate,
    pub geometry: &'a Geometry,
    pub hosting_player: &'a PlayerId,
    /// Alliance count after this pass.
    pub alliance_count: u32,
    /// Alliance count observed at the start of this pass.
    pub previous_alliance_count: u32,
}

impl LayoutContext<'_> {
    /// Deployment units an alliance should own, with fresh identities.
    pub fn expected_layout(&self, alliance: &Alliance) -> Vec<DeploymentUnit> {
        self.template
            .entries
            .iter()
            .map(|entry| DeploymentUnit {
                id: DeploymentUnitId::new(),
                alliance_id: alliance.id,
                hosting_player_id: self.hosting_player.clone(),
                unit: entry.unit.clone(),
                position: self.geometry.placement(
                    entry.slot,
                    alliance.position,
                    self.alliance_count,
                ),
                reinforcement: true,
                deletable: true,
            })
            .collect()
    }
}

/// Why an alliance's deployment units are rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Created,
    Reranked,
    AllianceCountChanged,
    /// The stored set no longer matches the template layout.
    Drifted,
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildReason::Created => write!(f, "created"),
            RebuildReason::Reranked => write!(f, "reranked"),
            RebuildReason::AllianceCountChanged => write!(f, "alliance_count_changed"),
            RebuildReason::Drifted => write!(f, "drifted"),
        }
    }
}

/// Full teardown and rebuild of one alliance's deployment units.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRebuild {
    pub alliance: Alliance,
    pub reason: RebuildReason,
    pub remove: Vec<DeploymentUnit>,
    pub create: Vec<DeploymentUnit>,
}

/// Deployment unit changes for one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPlan {
    pub rebuilds: Vec<LayoutRebuild>,
    /// Deployment units whose alliance no longer exists.
    pub orphans: Vec<DeploymentUnit>,
}

impl LayoutPlan {
    pub fn is_noop(&self) -> bool {
        self.rebuilds.is_empty() && self.orphans.is_empty()
    }
}

/// Decide which alliances need their deployment units rebuilt.
///
/// `deferred` has the same meaning as in [`plan_commanders`].
pub fn plan_layouts(
    settled: &[SettledAlliance],
    deferred: &BTreeSet<AllianceId>,
    actual: &[DeploymentUnit],
    ctx: &LayoutContext<'_>,
) -> LayoutPlan {
    let live: HashSet<AllianceId> = settled.iter().map(|s| s.alliance.id).collect();

    let mut plan = LayoutPlan::default();
    let mut by_alliance: HashMap<AllianceId, Vec<DeploymentUnit>> = HashMap::new();
    for unit in actual {
        if live.contains(&unit.alliance_id) {
            by_alliance
                .entry(unit.alliance_id)
                .or_default()
                .push(unit.clone());
        } else if !deferred.contains(&unit.alliance_id) {
            plan.orphans.push(unit.clone());
        }
    }

    let count_changed = ctx.alliance_count != ctx.previous_alliance_count;

    for entry in settled {
        let current = by_alliance.remove(&entry.alliance.id).unwrap_or_default();
        let expected = ctx.expected_layout(&entry.alliance);

        let reason = match entry.change {
            AllianceChange::Created => Some(RebuildReason::Created),
            AllianceChange::Reranked => Some(RebuildReason::Reranked),
            AllianceChange::Unchanged if count_changed => Some(RebuildReason::AllianceCountChanged),
            AllianceChange::Unchanged if !same_layout(&current, &expected) => {
                Some(RebuildReason::Drifted)
            }
            AllianceChange::Unchanged => None,
        };

        if let Some(reason) = reason {
            plan.rebuilds.push(LayoutRebuild {
                alliance: entry.alliance.clone(),
                reason,
                remove: current,
                create: expected,
            });
        }
    }

    plan
}

type LayoutKey = (String, String, u64, u64, bool, bool, String);

fn layout_key(unit: &DeploymentUnit) -> LayoutKey {
    (
        unit.unit.unit_type.to_string(),
        unit.unit.marker.clone(),
        unit.position.x.to_bits(),
        unit.position.y.to_bits(),
        unit.reinforcement,
        unit.deletable,
        unit.hosting_player_id.as_str().to_string(),
    )
}

/// Compare two deployment unit sets ignoring identity and order.
fn same_layout(current: &[DeploymentUnit], expected: &[DeploymentUnit]) -> bool {
    if current.len() != expected.len() {
        return false;
    }
    let mut a: Vec<LayoutKey> = current.iter().map(layout_key).collect();
    let mut b: Vec<LayoutKey> = expected.iter().map(layout_key).collect();
    a.sort();
    b.sort();
    a == b
}
