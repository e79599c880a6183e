//! The battle controller.
//!
//! One task owns the engine, the pass gate, and the event queue. Events are
//! handled strictly one at a time; a reconciliation pass runs inline, and
//! whatever arrived meanwhile is drained once it completes. Direct handlers
//! and passes therefore never overlap, and triggers that pile up during a
//! pass collapse into a single follow-up pass.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warstage_id::{MatchId, PlayerId, UnitId};
use warstage_model::{DeployUnit, Match, Unit};
use warstage_reconcile::{
    derive, BackoffPolicy, CommanderPolicy, FormationTemplate, Geometry, PassGate, RetryBudget,
};
use warstage_store::{EventBus, StoreError};

use crate::config::Config;
use crate::deploy::DeployHandler;
use crate::engine::{Engine, EngineError, EngineSettings};
use crate::router::{route, ControllerEvent, EventRouter, Route};
use crate::stores::{BattleStores, LobbyStores};

/// Errors that prevent the controller from starting.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Counters published after every handled event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub passes: u64,
    pub failed_passes: u64,
    pub coalesced_triggers: u64,
    pub units_deployed: u64,
    pub units_retired: u64,
    pub handler_failures: u64,
}

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub host_player: PlayerId,
    pub template: FormationTemplate,
    pub geometry: Geometry,
    pub commander_policy: CommanderPolicy,
    pub backoff: BackoffPolicy,
    pub max_retries: u32,
    pub retry_window: Duration,
    pub queue_capacity: usize,
}

impl ControllerSettings {
    pub fn from_config(config: &Config, template: FormationTemplate) -> Self {
        Self {
            host_player: config.host_player_id.clone(),
            template,
            geometry: Geometry::default(),
            commander_policy: config.commander_policy,
            backoff: BackoffPolicy {
                base: config.retry_base,
                ..BackoffPolicy::default()
            },
            max_retries: config.max_retries,
            retry_window: warstage_reconcile::retry::DEFAULT_RETRY_WINDOW,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Unstarted controller.
pub struct Controller {
    lobby: LobbyStores,
    battle: BattleStores,
    settings: ControllerSettings,
}

impl Controller {
    pub fn new(lobby: LobbyStores, battle: BattleStores, settings: ControllerSettings) -> Self {
        Self {
            lobby,
            battle,
            settings,
        }
    }

    /// Load the match, subscribe to every feed, run the initial pass, and
    /// start the event loop.
    ///
    /// Subscriptions are taken before the initial pass so that no change
    /// made during it is missed.
    pub async fn start(
        self,
        match_id: MatchId,
        deploys: &EventBus<DeployUnit>,
    ) -> Result<ControllerHandle, ControllerError> {
        let current = self
            .lobby
            .matches
            .get(match_id)
            .await?
            .ok_or(ControllerError::MatchNotFound(match_id))?;

        let (tx, rx) = mpsc::channel(self.settings.queue_capacity);
        let router = EventRouter::start(&self.lobby, &self.battle, deploys, tx.clone())?;

        let engine = Engine::new(
            self.battle.clone(),
            EngineSettings {
                template: self.settings.template.clone(),
                geometry: self.settings.geometry,
                host_player: self.settings.host_player.clone(),
                commander_policy: self.settings.commander_policy,
            },
        );
        let handler = DeployHandler::new(self.battle.clone(), self.settings.geometry.center);
        let (stats_tx, stats_rx) = watch::channel(ControllerStats::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut event_loop = EventLoop {
            lobby: self.lobby,
            engine,
            handler,
            current,
            gate: PassGate::new(),
            retry: RetryBudget::new(self.settings.max_retries, self.settings.retry_window),
            backoff: self.settings.backoff,
            retry_timer: None,
            retired: HashSet::new(),
            stats: ControllerStats::default(),
            stats_tx,
            events: rx,
            retry_tx: tx,
            _router: router,
        };

        info!(
            match_id = %match_id,
            title = %event_loop.current.title,
            teams = event_loop.current.teams.len(),
            commander_policy = %self.settings.commander_policy,
            "Starting battle controller"
        );

        // Initial forced pass.
        event_loop.gate.trigger();
        event_loop.run_pending_passes().await;

        let task = tokio::spawn(event_loop.run(shutdown_rx));

        Ok(ControllerHandle {
            stats: stats_rx,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle to a running controller.
pub struct ControllerHandle {
    stats: watch::Receiver<ControllerStats>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Subscribe to statistics updates.
    pub fn stats(&self) -> watch::Receiver<ControllerStats> {
        self.stats.clone()
    }

    /// Latest statistics.
    pub fn current_stats(&self) -> ControllerStats {
        *self.stats.borrow()
    }

    /// Signal shutdown and wait for the event loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Controller task panicked");
        }
    }
}

struct EventLoop {
    lobby: LobbyStores,
    engine: Engine,
    handler: DeployHandler,
    current: Match,
    gate: PassGate,
    retry: RetryBudget,
    backoff: BackoffPolicy,
    retry_timer: Option<JoinHandle<()>>,
    /// Units whose deletion has been issued.
    retired: HashSet<UnitId>,
    stats: ControllerStats,
    stats_tx: watch::Sender<ControllerStats>,
    events: mpsc::Receiver<ControllerEvent>,
    retry_tx: mpsc::Sender<ControllerEvent>,
    _router: EventRouter,
}

impl EventLoop {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Controller idle, waiting for changes");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Controller shutting down");
                        break;
                    }
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        warn!("Event queue closed");
                        break;
                    };
                    self.handle(event).await;
                    self.drain().await;
                    self.run_pending_passes().await;
                }
            }
        }

        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    /// Handle every event already queued, without waiting.
    async fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: ControllerEvent) {
        match route(event, self.current.id) {
            Route::Trigger => self.trigger(),
            Route::ReplaceMatch(updated) => {
                debug!(match_id = %updated.id, teams = updated.teams.len(), "Match updated");
                self.current = updated;
                self.trigger();
            }
            Route::Deploy(event) => self.deploy(&event).await,
            Route::Retire(unit) => self.retire(unit).await,
            Route::Forget(unit_id) => {
                self.retired.remove(&unit_id);
            }
            Route::Resync => {
                warn!("Change feed lagged, resynchronizing");
                self.trigger();
                self.sweep_casualties().await;
            }
            Route::Ignore => {}
        }
        self.publish_stats();
    }

    fn trigger(&mut self) {
        self.gate.trigger();
        self.stats.coalesced_triggers = self.gate.coalesced();
    }

    /// Run passes until no trigger is pending.
    async fn run_pending_passes(&mut self) {
        while self.gate.begin() {
            self.run_pass().await;
            self.drain().await;
            self.gate.complete();
        }
        self.publish_stats();
    }

    async fn run_pass(&mut self) {
        self.stats.passes += 1;

        let result = match self.lobby.rosters(&self.current).await {
            Ok(rosters) => self.engine.reconcile(&derive(&rosters)).await,
            Err(e) => Err(EngineError::Store(e)),
        };

        match result {
            Ok(report) => {
                debug!(
                    fingerprint = %report.fingerprint,
                    mutations = report.mutations(),
                    "Pass converged"
                );
                self.retry.reset();
                if let Some(timer) = self.retry_timer.take() {
                    timer.abort();
                }
            }
            Err(EngineError::Invariant(violation)) => {
                // Only a lobby change can fix this; the next trigger will.
                self.stats.failed_passes += 1;
                error!(error = %violation, "Desired state rejected, skipping pass");
            }
            Err(e) => {
                self.stats.failed_passes += 1;
                warn!(error = %e, "Reconciliation pass failed");
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        let Some(attempt) = self.retry.record_failure() else {
            error!(
                failures = self.retry.failures(),
                "Retry budget exhausted, waiting for the next lobby change"
            );
            return;
        };

        let delay = self.backoff.delay(attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling retry");

        if let Some(previous) = self.retry_timer.take() {
            previous.abort();
        }
        let tx = self.retry_tx.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ControllerEvent::Retry).await;
        }));
    }

    async fn deploy(&mut self, event: &DeployUnit) {
        match self.handler.deploy(event).await {
            Ok(_) => self.stats.units_deployed += 1,
            Err(e) => {
                self.stats.handler_failures += 1;
                warn!(deployment_unit_id = %event.deployment_unit, error = %e, "Deploy failed");
            }
        }
    }

    async fn retire(&mut self, unit: Unit) {
        if !self.retired.insert(unit.id) {
            debug!(unit_id = %unit.id, "Unit already retired");
            return;
        }
        match self.handler.retire(&unit).await {
            Ok(()) => self.stats.units_retired += 1,
            Err(e) => {
                // Let a later change retry.
                self.retired.remove(&unit.id);
                self.stats.handler_failures += 1;
                warn!(unit_id = %unit.id, error = %e, "Unit retirement failed");
            }
        }
    }

    /// Retire every unit whose retirement notification may have been lost.
    async fn sweep_casualties(&mut self) {
        match self.handler.casualties().await {
            Ok(casualties) => {
                debug!(count = casualties.len(), "Swept units");
                for unit in casualties {
                    self.retire(unit).await;
                }
            }
            Err(e) => {
                self.stats.handler_failures += 1;
                warn!(error = %e, "Unit sweep failed");
            }
        }
    }

    fn publish_stats(&self) {
        self.stats_tx.send_if_modified(|current| {
            if *current == self.stats {
                false
            } else {
                *current = self.stats;
                true
            }
        });
    }
}
