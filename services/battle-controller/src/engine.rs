//! Reconciliation engine.
//!
//! A pass re-reads the battle namespace, plans against the desired state,
//! and applies the plan in four batches:
//!
//! 1. **Alliances**: create missing, re-rank in place
//! 2. **Removals**: cascade-delete alliances whose team is gone
//! 3. **Commanders**: add missing, prune per policy, drop orphans
//! 4. **Layouts**: rebuild stale deployment unit sets, drop orphans
//!
//! A failing store call aborts the rest of its batch only. Later batches
//! still run against whatever settled, and the pass reports
//! [`EngineError::Incomplete`]. Running the next pass finishes the job.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, field, info, instrument, warn, Span};
use warstage_id::{AllianceId, PlayerId};
use warstage_model::{Alliance, ObjectKind};
use warstage_reconcile::{
    plan_alliances, plan_commanders, plan_layouts, AllianceChange, CommanderPlan,
    CommanderPolicy, DesiredState, Fingerprint, FormationTemplate, Geometry, InvariantViolation,
    LayoutContext, LayoutPlan, SettledAlliance,
};
use warstage_store::{StoreError, StoreResult};

use crate::stores::BattleStores;

/// Errors from a reconciliation pass.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read battle state: {0}")]
    Store(#[from] StoreError),

    #[error("inconsistent desired state: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("pass incomplete after {} failed batch(es)", .0.failures.len())]
    Incomplete(Box<PassReport>),
}

/// Batches of a pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Alliances,
    Removals,
    Commanders,
    Layouts,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Alliances => write!(f, "alliances"),
            Phase::Removals => write!(f, "removals"),
            Phase::Commanders => write!(f, "commanders"),
            Phase::Layouts => write!(f, "layouts"),
        }
    }
}

/// What a pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub fingerprint: Fingerprint,
    pub alliances_created: usize,
    pub alliances_reranked: usize,
    pub alliances_removed: usize,
    pub commanders_created: usize,
    pub commanders_removed: usize,
    pub deployment_units_created: usize,
    pub deployment_units_removed: usize,
    pub layouts_rebuilt: usize,
    pub violations: Vec<InvariantViolation>,
    pub failures: Vec<(Phase, StoreError)>,
}

impl PassReport {
    fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            alliances_created: 0,
            alliances_reranked: 0,
            alliances_removed: 0,
            commanders_created: 0,
            commanders_removed: 0,
            deployment_units_created: 0,
            deployment_units_removed: 0,
            layouts_rebuilt: 0,
            violations: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Successful mutations issued by the pass.
    pub fn mutations(&self) -> usize {
        self.alliances_created
            + self.alliances_reranked
            + self.alliances_removed
            + self.commanders_created
            + self.commanders_removed
            + self.deployment_units_created
            + self.deployment_units_removed
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, phase: Phase, result: StoreResult<()>) {
        if let Err(error) = result {
            warn!(phase = %phase, error = %error, "Batch aborted");
            self.failures.push((phase, error));
        }
    }
}

/// Outcome of deleting an alliance and everything it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cascade {
    Deleted {
        deployment_units: usize,
        commanders: usize,
    },
    /// The alliance was already gone; nothing was touched.
    OwnerMissing(InvariantViolation),
}

/// Fixed inputs of every pass.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub template: FormationTemplate,
    pub geometry: Geometry,
    pub host_player: PlayerId,
    pub commander_policy: CommanderPolicy,
}

/// Converges the battle namespace to a desired state.
pub struct Engine {
    battle: BattleStores,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(battle: BattleStores, settings: EngineSettings) -> Self {
        Self { battle, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one reconciliation pass.
    #[instrument(skip_all, fields(fingerprint = field::Empty, alliances = desired.alliances.len()))]
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<PassReport, EngineError> {
        desired.validate()?;

        let fingerprint = desired.fingerprint();
        Span::current().record("fingerprint", field::display(&fingerprint));
        let mut report = PassReport::new(fingerprint);

        let alliances = self.battle.alliances.all().await?;
        let commanders = self.battle.commanders.all().await?;
        let deployment_units = self.battle.deployment_units.all().await?;
        debug!(
            alliances = alliances.len(),
            commanders = commanders.len(),
            deployment_units = deployment_units.len(),
            "Battle state loaded"
        );

        // Phase 1: alliances.
        let plan = plan_alliances(desired, &alliances);
        let mut settled: Vec<SettledAlliance> = plan
            .unchanged
            .into_iter()
            .map(|alliance| SettledAlliance {
                alliance,
                change: AllianceChange::Unchanged,
            })
            .collect();

        // Dependents of these alliances are left alone this pass. Re-ranked
        // alliances leave the set once their update lands.
        let mut deferred: BTreeSet<AllianceId> = plan
            .remove
            .iter()
            .chain(plan.rerank.iter())
            .map(|a| a.id)
            .collect();

        let result = self
            .apply_alliances(
                plan.create,
                plan.rerank,
                &mut settled,
                &mut deferred,
                &mut report,
            )
            .await;
        report.record(Phase::Alliances, result);
        settled.sort_by_key(|s| s.alliance.position);

        // Phase 2: removals.
        let result = self.apply_removals(&plan.remove, &mut report).await;
        report.record(Phase::Removals, result);

        // Phase 3: commanders.
        let commander_plan = plan_commanders(
            desired,
            &settled,
            &deferred,
            &commanders,
            self.settings.commander_policy,
        );
        let result = self.apply_commanders(commander_plan, &mut report).await;
        report.record(Phase::Commanders, result);

        // Phase 4: deployment unit layouts.
        let ctx = LayoutContext {
            template: &self.settings.template,
            geometry: &self.settings.geometry,
            hosting_player: &self.settings.host_player,
            alliance_count: desired.alliance_count(),
            previous_alliance_count: u32::try_from(alliances.len()).unwrap_or(u32::MAX),
        };
        let layout_plan = plan_layouts(&settled, &deferred, &deployment_units, &ctx);
        let result = self.apply_layouts(layout_plan, &mut report).await;
        report.record(Phase::Layouts, result);

        info!(
            alliances_created = report.alliances_created,
            alliances_reranked = report.alliances_reranked,
            alliances_removed = report.alliances_removed,
            commanders_created = report.commanders_created,
            commanders_removed = report.commanders_removed,
            layouts_rebuilt = report.layouts_rebuilt,
            deployment_units_created = report.deployment_units_created,
            deployment_units_removed = report.deployment_units_removed,
            failures = report.failures.len(),
            "Reconciliation pass complete"
        );

        if report.is_complete() {
            Ok(report)
        } else {
            Err(EngineError::Incomplete(Box::new(report)))
        }
    }

    async fn apply_alliances(
        &self,
        create: Vec<Alliance>,
        rerank: Vec<Alliance>,
        settled: &mut Vec<SettledAlliance>,
        deferred: &mut BTreeSet<AllianceId>,
        report: &mut PassReport,
    ) -> StoreResult<()> {
        for alliance in create {
            let alliance = self.battle.alliances.create(alliance).await?;
            info!(
                alliance_id = %alliance.id,
                team_id = %alliance.team_id,
                position = alliance.position,
                "Alliance created"
            );
            report.alliances_created += 1;
            settled.push(SettledAlliance {
                alliance,
                change: AllianceChange::Created,
            });
        }

        for alliance in rerank {
            let alliance = self.battle.alliances.update(alliance).await?;
            info!(
                alliance_id = %alliance.id,
                team_id = %alliance.team_id,
                position = alliance.position,
                "Alliance re-ranked"
            );
            report.alliances_reranked += 1;
            deferred.remove(&alliance.id);
            settled.push(SettledAlliance {
                alliance,
                change: AllianceChange::Reranked,
            });
        }

        Ok(())
    }

    async fn apply_removals(&self, remove: &[Alliance], report: &mut PassReport) -> StoreResult<()> {
        for alliance in remove {
            match self.delete_alliance(alliance.id).await? {
                Cascade::Deleted {
                    deployment_units,
                    commanders,
                } => {
                    report.alliances_removed += 1;
                    report.deployment_units_removed += deployment_units;
                    report.commanders_removed += commanders;
                }
                Cascade::OwnerMissing(violation) => report.violations.push(violation),
            }
        }
        Ok(())
    }

    async fn apply_commanders(&self, plan: CommanderPlan, report: &mut PassReport) -> StoreResult<()> {
        for commander in plan.create {
            let commander = self.battle.commanders.create(commander).await?;
            debug!(
                commander_id = %commander.id,
                alliance_id = %commander.alliance_id,
                player_id = %commander.player_id,
                "Commander created"
            );
            report.commanders_created += 1;
        }

        for commander in plan.remove {
            self.battle.commanders.delete(commander.id).await?;
            debug!(
                commander_id = %commander.id,
                alliance_id = %commander.alliance_id,
                player_id = %commander.player_id,
                "Commander removed"
            );
            report.commanders_removed += 1;
        }

        Ok(())
    }

    async fn apply_layouts(&self, plan: LayoutPlan, report: &mut PassReport) -> StoreResult<()> {
        for unit in plan.orphans {
            self.battle.deployment_units.delete(unit.id).await?;
            debug!(
                deployment_unit_id = %unit.id,
                alliance_id = %unit.alliance_id,
                "Orphan deployment unit removed"
            );
            report.deployment_units_removed += 1;
        }

        for rebuild in plan.rebuilds {
            info!(
                alliance_id = %rebuild.alliance.id,
                position = rebuild.alliance.position,
                reason = %rebuild.reason,
                removing = rebuild.remove.len(),
                creating = rebuild.create.len(),
                "Rebuilding deployment units"
            );
            for unit in rebuild.remove {
                self.battle.deployment_units.delete(unit.id).await?;
                report.deployment_units_removed += 1;
            }
            for unit in rebuild.create {
                self.battle.deployment_units.create(unit).await?;
                report.deployment_units_created += 1;
            }
            report.layouts_rebuilt += 1;
        }

        Ok(())
    }

    /// Delete an alliance's deployment units, then its commanders, then the
    /// alliance itself.
    #[instrument(skip_all, fields(alliance_id = %alliance_id))]
    pub async fn delete_alliance(&self, alliance_id: AllianceId) -> StoreResult<Cascade> {
        if self.battle.alliances.get(alliance_id).await?.is_none() {
            let violation = InvariantViolation::MissingReference {
                kind: ObjectKind::Alliance,
                id: alliance_id.to_string(),
            };
            warn!(error = %violation, "Cascade delete skipped");
            return Ok(Cascade::OwnerMissing(violation));
        }

        let mut deployment_units = 0;
        for unit in self.battle.deployment_units.all().await? {
            if unit.alliance_id == alliance_id {
                self.battle.deployment_units.delete(unit.id).await?;
                deployment_units += 1;
            }
        }

        let mut commanders = 0;
        for commander in self.battle.commanders.all().await? {
            if commander.alliance_id == alliance_id {
                self.battle.commanders.delete(commander.id).await?;
                commanders += 1;
            }
        }

        self.battle.alliances.delete(alliance_id).await?;
        info!(deployment_units, commanders, "Alliance removed");

        Ok(Cascade::Deleted {
            deployment_units,
            commanders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::BattleMemory;
    use crate::template::{parse_formation, DEFAULT_FORMATION};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use warstage_id::{AllianceId, SlotId, TeamId};
    use warstage_model::Slot;
    use warstage_reconcile::{derive, TeamRoster};
    use warstage_store::ObjectStore;

    fn player(id: &str) -> PlayerId {
        PlayerId::new(id).unwrap()
    }

    fn roster(team_id: TeamId, players: &[&str]) -> TeamRoster {
        TeamRoster {
            team_id,
            slots: players
                .iter()
                .map(|p| Slot {
                    id: SlotId::new(),
                    player_id: Some(player(p)),
                })
                .collect(),
        }
    }

    fn engine(memory: &BattleMemory, policy: CommanderPolicy) -> Engine {
        Engine::new(
            memory.stores(),
            EngineSettings {
                template: parse_formation(DEFAULT_FORMATION).unwrap(),
                geometry: Geometry::default(),
                host_player: player("host"),
                commander_policy: policy,
            },
        )
    }

    #[tokio::test]
    async fn test_first_pass_builds_everything() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        let desired = derive(&[
            roster(TeamId::new(), &["p1", "p2"]),
            roster(TeamId::new(), &["p3"]),
        ]);

        let report = engine.reconcile(&desired).await.unwrap();

        assert_eq!(report.alliances_created, 2);
        assert_eq!(report.commanders_created, 3);
        assert_eq!(report.deployment_units_created, 32);
        assert_eq!(report.layouts_rebuilt, 2);
        assert_eq!(memory.deployment_units.len().await, 32);
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        let desired = derive(&[roster(TeamId::new(), &["p1"]), roster(TeamId::new(), &[])]);

        engine.reconcile(&desired).await.unwrap();
        let before = memory.structural_mutations();

        let report = engine.reconcile(&desired).await.unwrap();
        assert_eq!(report.mutations(), 0);
        assert_eq!(memory.structural_mutations(), before);
    }

    #[tokio::test]
    async fn test_reorder_keeps_identity_and_rebuilds() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        let (a, b) = (TeamId::new(), TeamId::new());

        engine
            .reconcile(&derive(&[roster(a, &["p1"]), roster(b, &["p2"])]))
            .await
            .unwrap();
        let ids_before: BTreeSet<AllianceId> =
            memory.alliances.all().await.unwrap().iter().map(|x| x.id).collect();

        let report = engine
            .reconcile(&derive(&[roster(b, &["p2"]), roster(a, &["p1"])]))
            .await
            .unwrap();

        let alliances = memory.alliances.all().await.unwrap();
        let ids_after: BTreeSet<AllianceId> = alliances.iter().map(|x| x.id).collect();
        assert_eq!(ids_before, ids_after);
        assert_eq!(report.alliances_reranked, 2);
        assert_eq!(report.commanders_created, 0);
        assert_eq!(report.layouts_rebuilt, 2);
        let b_alliance = alliances.iter().find(|x| x.team_id == b).unwrap();
        assert_eq!(b_alliance.position, 1);
    }

    #[tokio::test]
    async fn test_removed_team_cascades() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        let (a, b) = (TeamId::new(), TeamId::new());

        engine
            .reconcile(&derive(&[roster(a, &["p1"]), roster(b, &["p2", "p3"])]))
            .await
            .unwrap();
        let report = engine.reconcile(&derive(&[roster(a, &["p1"])])).await.unwrap();

        assert_eq!(report.alliances_removed, 1);
        assert_eq!(report.commanders_removed, 2);
        // B's 16 deployment units, plus A's 16 rebuilt for the new count.
        assert_eq!(report.deployment_units_removed, 32);
        assert_eq!(memory.alliances.len().await, 1);
        assert_eq!(memory.commanders.len().await, 1);
        assert_eq!(memory.deployment_units.len().await, 16);
    }

    #[tokio::test]
    async fn test_delete_missing_alliance_is_violation() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);

        let outcome = engine.delete_alliance(AllianceId::new()).await.unwrap();
        assert!(matches!(
            outcome,
            Cascade::OwnerMissing(InvariantViolation::MissingReference {
                kind: ObjectKind::Alliance,
                ..
            })
        ));
        assert_eq!(memory.structural_mutations(), 0);
    }

    #[tokio::test]
    async fn test_failure_aborts_batch_then_heals() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        let desired = derive(&[roster(TeamId::new(), &["p1"]), roster(TeamId::new(), &["p2"])]);

        memory.deployment_units.inject_failures(1);
        let err = engine.reconcile(&desired).await.unwrap_err();
        let EngineError::Incomplete(report) = err else {
            panic!("expected incomplete pass");
        };
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, Phase::Layouts);
        // Earlier batches still completed.
        assert_eq!(report.alliances_created, 2);
        assert_eq!(report.commanders_created, 2);

        let report = engine.reconcile(&desired).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(memory.deployment_units.len().await, 32);
        assert_eq!(
            engine.reconcile(&desired).await.unwrap().mutations(),
            0
        );
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_fast() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        memory.commanders.set_available(false);

        let err = engine.reconcile(&derive(&[])).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Unavailable { .. })));
        assert_eq!(memory.structural_mutations(), 0);
    }

    #[tokio::test]
    async fn test_invalid_desired_state_rejected() {
        let memory = BattleMemory::default();
        let engine = engine(&memory, CommanderPolicy::Prune);
        let team = roster(TeamId::new(), &[]);

        let err = engine.reconcile(&derive(&[team.clone(), team])).await.unwrap_err();
        assert!(matches!(err, EngineError::Invariant(InvariantViolation::DuplicateTeam(_))));
    }

    fn lineup() -> impl Strategy<Value = Vec<usize>> {
        proptest::sample::subsequence((0..6).collect::<Vec<_>>(), 0..=6).prop_shuffle()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Across any sequence of reorderings, insertions and removals, an
        /// alliance keeps its identity while its team stays, and a repeated
        /// pass changes nothing.
        #[test]
        fn alliances_are_stable_across_lobby_edits(steps in prop::collection::vec(lineup(), 1..6)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let memory = BattleMemory::default();
                let engine = engine(&memory, CommanderPolicy::Prune);
                let pool: Vec<TeamId> = (0..6).map(|_| TeamId::new()).collect();
                let names: Vec<String> = (0..6).map(|i| format!("p{i}")).collect();
                let mut previous: HashMap<TeamId, AllianceId> = HashMap::new();

                for lineup in steps {
                    let rosters: Vec<TeamRoster> = lineup
                        .iter()
                        .map(|&i| roster(pool[i], &[names[i].as_str()]))
                        .collect();
                    let desired = derive(&rosters);
                    engine.reconcile(&desired).await.unwrap();

                    let alliances = memory.alliances.all().await.unwrap();
                    assert_eq!(alliances.len(), lineup.len());
                    let current: HashMap<TeamId, AllianceId> =
                        alliances.iter().map(|a| (a.team_id, a.id)).collect();
                    for (rank, &i) in lineup.iter().enumerate() {
                        let alliance = alliances.iter().find(|a| a.team_id == pool[i]).unwrap();
                        assert_eq!(alliance.position as usize, rank + 1);
                        if let Some(before) = previous.get(&pool[i]) {
                            assert_eq!(current[&pool[i]], *before);
                        }
                    }
                    assert_eq!(memory.deployment_units.len().await, 16 * lineup.len());

                    let mutations = memory.structural_mutations();
                    let report = engine.reconcile(&desired).await.unwrap();
                    assert_eq!(report.mutations(), 0);
                    assert_eq!(memory.structural_mutations(), mutations);

                    previous = current;
                }
            });
        }
    }
}
