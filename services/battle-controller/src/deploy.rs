//! Direct handlers for user actions on the battlefield.
//!
//! These run outside the reconciliation pass: a deploy creates exactly one
//! unit and a retirement deletes exactly one unit.

use thiserror::Error;
use tracing::{info, instrument, warn};
use warstage_id::UnitId;
use warstage_model::{DeployUnit, ObjectKind, Placement, Unit, Vec2};
use warstage_reconcile::InvariantViolation;
use warstage_store::StoreError;

use crate::stores::BattleStores;

/// Errors from a single deploy or retirement. Never fatal to the controller.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Invariant(#[from] InvariantViolation),
}

/// Creates and deletes battlefield units on behalf of players.
pub struct DeployHandler {
    battle: BattleStores,
    center: Vec2,
}

impl DeployHandler {
    /// `center` is the point deployed units initially face.
    pub fn new(battle: BattleStores, center: Vec2) -> Self {
        Self { battle, center }
    }

    /// Create a unit from a dropped deployment unit.
    ///
    /// The unit faces the battlefield center, is commanded by the first
    /// commander of the alliance, and starts at its class's default size.
    #[instrument(skip_all, fields(deployment_unit_id = %event.deployment_unit))]
    pub async fn deploy(&self, event: &DeployUnit) -> Result<Unit, HandlerError> {
        let deployment_unit = self
            .battle
            .deployment_units
            .get(event.deployment_unit)
            .await?
            .ok_or_else(|| InvariantViolation::MissingReference {
                kind: ObjectKind::DeploymentUnit,
                id: event.deployment_unit.to_string(),
            })?;

        let alliance = self
            .battle
            .alliances
            .get(deployment_unit.alliance_id)
            .await?
            .ok_or_else(|| InvariantViolation::MissingOwner {
                kind: ObjectKind::DeploymentUnit,
                id: deployment_unit.id.to_string(),
                owner: ObjectKind::Alliance,
            })?;

        let commander = self
            .battle
            .commanders
            .all()
            .await?
            .into_iter()
            .find(|c| c.alliance_id == alliance.id);
        if commander.is_none() {
            warn!(alliance_id = %alliance.id, "Alliance has no commander, deploying without one");
        }

        let unit = Unit {
            id: UnitId::new(),
            alliance_id: alliance.id,
            commander_id: commander.map(|c| c.id),
            unit: deployment_unit.unit.clone(),
            placement: Placement {
                x: event.position.x,
                y: event.position.y,
                facing: event.position.angle_to(self.center),
            },
            deletable: true,
            fighters: deployment_unit.unit.unit_type.default_size(),
            deleted_by_gesture: false,
        };

        let unit = self.battle.units.create(unit).await?;
        info!(
            unit_id = %unit.id,
            alliance_id = %unit.alliance_id,
            unit_type = %unit.unit.unit_type,
            fighters = unit.fighters,
            "Unit deployed"
        );
        Ok(unit)
    }

    /// Delete a unit that was wiped out or removed by gesture.
    #[instrument(skip_all, fields(unit_id = %unit.id))]
    pub async fn retire(&self, unit: &Unit) -> Result<(), HandlerError> {
        self.battle.units.delete(unit.id).await?;
        info!(
            fighters = unit.fighters,
            deleted_by_gesture = unit.deleted_by_gesture,
            "Unit retired"
        );
        Ok(())
    }

    /// Units that should already have been retired: wiped out or deleted by
    /// gesture. Used to catch up after change notifications were lost.
    pub async fn casualties(&self) -> Result<Vec<Unit>, HandlerError> {
        let units = self.battle.units.all().await?;
        Ok(units.into_iter().filter(is_casualty).collect())
    }
}

fn is_casualty(unit: &Unit) -> bool {
    unit.fighters == 0 || unit.deleted_by_gesture
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::BattleMemory;
    use std::f64::consts::{FRAC_PI_2, PI};
    use warstage_id::{AllianceId, CommanderId, DeploymentUnitId, PlayerId, TeamId};
    use warstage_model::{Alliance, Commander, DeploymentUnit, Platform, UnitClass, UnitDescriptor, Weapon};
    use warstage_store::ObjectStore;

    const CENTER: Vec2 = Vec2::new(512.0, 512.0);

    async fn seed(memory: &BattleMemory, weapon: Weapon, with_commander: bool) -> DeploymentUnit {
        let alliance = Alliance {
            id: AllianceId::new(),
            team_id: TeamId::new(),
            position: 1,
        };
        memory.alliances.create(alliance.clone()).await.unwrap();
        if with_commander {
            for player in ["p1", "p2"] {
                memory
                    .commanders
                    .create(Commander {
                        id: CommanderId::new(),
                        alliance_id: alliance.id,
                        player_id: PlayerId::new(player).unwrap(),
                    })
                    .await
                    .unwrap();
            }
        }
        let deployment_unit = DeploymentUnit {
            id: DeploymentUnitId::new(),
            alliance_id: alliance.id,
            hosting_player_id: PlayerId::new("host").unwrap(),
            unit: UnitDescriptor {
                unit_type: UnitClass::new(Platform::Ashigaru, weapon),
                marker: "ash".to_string(),
            },
            position: Vec2::new(512.0, 1054.0),
            reinforcement: true,
            deletable: true,
        };
        memory
            .deployment_units
            .create(deployment_unit.clone())
            .await
            .unwrap();
        deployment_unit
    }

    fn drop_at(deployment_unit: &DeploymentUnit, position: Vec2) -> DeployUnit {
        DeployUnit {
            deployment_unit: deployment_unit.id,
            position,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn test_deploy_creates_unit_facing_center() {
        let memory = BattleMemory::default();
        let handler = DeployHandler::new(memory.stores(), CENTER);
        let deployment_unit = seed(&memory, Weapon::Yari, true).await;

        let unit = handler
            .deploy(&drop_at(&deployment_unit, Vec2::new(512.0, 712.0)))
            .await
            .unwrap();

        assert_eq!(unit.alliance_id, deployment_unit.alliance_id);
        assert_eq!(unit.unit, deployment_unit.unit);
        assert_eq!(unit.fighters, 80);
        assert!(unit.deletable);
        assert!((unit.placement.facing + FRAC_PI_2).abs() < 1e-9);
        assert_eq!(unit.placement.y, 712.0);

        let commanders = memory.commanders.all().await.unwrap();
        assert_eq!(unit.commander_id, Some(commanders[0].id));
        assert_eq!(memory.units.len().await, 1);
        // The deployment unit stays in place for the next drag.
        assert_eq!(memory.deployment_units.len().await, 1);
    }

    #[tokio::test]
    async fn test_cannon_starts_small_and_commander_optional() {
        let memory = BattleMemory::default();
        let handler = DeployHandler::new(memory.stores(), CENTER);
        let deployment_unit = seed(&memory, Weapon::Cannon, false).await;

        let unit = handler
            .deploy(&drop_at(&deployment_unit, Vec2::new(712.0, 512.0)))
            .await
            .unwrap();

        assert_eq!(unit.fighters, 12);
        assert_eq!(unit.commander_id, None);
        assert!((unit.placement.facing.abs() - PI).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_deploy_unknown_deployment_unit() {
        let memory = BattleMemory::default();
        let handler = DeployHandler::new(memory.stores(), CENTER);

        let err = handler
            .deploy(&DeployUnit {
                deployment_unit: DeploymentUnitId::new(),
                position: CENTER,
                deleted: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Invariant(InvariantViolation::MissingReference { .. })
        ));
        assert_eq!(memory.units.len().await, 0);
    }

    #[tokio::test]
    async fn test_deploy_without_alliance() {
        let memory = BattleMemory::default();
        let handler = DeployHandler::new(memory.stores(), CENTER);
        let deployment_unit = seed(&memory, Weapon::Bow, false).await;
        memory
            .alliances
            .delete(deployment_unit.alliance_id)
            .await
            .unwrap();

        let err = handler
            .deploy(&drop_at(&deployment_unit, CENTER))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Invariant(InvariantViolation::MissingOwner { .. })
        ));
    }

    #[tokio::test]
    async fn test_retire_deletes_unit() {
        let memory = BattleMemory::default();
        let handler = DeployHandler::new(memory.stores(), CENTER);
        let deployment_unit = seed(&memory, Weapon::Bow, true).await;
        let unit = handler
            .deploy(&drop_at(&deployment_unit, CENTER))
            .await
            .unwrap();

        handler.retire(&unit).await.unwrap();
        assert!(memory.units.is_empty().await);
        assert_eq!(memory.units.mutations().deletes, 1);
    }

    #[tokio::test]
    async fn test_casualties_lists_dead_and_gestured_units() {
        let memory = BattleMemory::default();
        let handler = DeployHandler::new(memory.stores(), CENTER);
        let deployment_unit = seed(&memory, Weapon::Katana, true).await;

        let mut units = Vec::new();
        for _ in 0..3 {
            units.push(
                handler
                    .deploy(&drop_at(&deployment_unit, CENTER))
                    .await
                    .unwrap(),
            );
        }
        let mut dead = units[0].clone();
        dead.fighters = 0;
        memory.units.update(dead.clone()).await.unwrap();
        let mut gestured = units[1].clone();
        gestured.deleted_by_gesture = true;
        memory.units.update(gestured.clone()).await.unwrap();

        let ids: Vec<UnitId> = handler
            .casualties()
            .await
            .unwrap()
            .iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![dead.id, gestured.id]);
    }
}
