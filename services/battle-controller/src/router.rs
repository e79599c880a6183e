//! Event routing.
//!
//! Every store subscription and the deploy event stream are forwarded into
//! one bounded queue by a small task per feed. The controller drains that
//! queue on a single task and uses [`route`] to decide what each event means.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use warstage_id::{MatchId, UnitId};
use warstage_model::{Change, DeployUnit, Match, ObjectKind, Record, Slot, Team, Unit};
use warstage_store::{EventBus, EventStream, Notification, StoreResult, Subscription};

use crate::stores::{BattleStores, LobbyStores};

/// Everything the controller reacts to.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Match(Change<Match>),
    Team(Change<Team>),
    Slot(Change<Slot>),
    Unit(Change<Unit>),
    Deploy(DeployUnit),
    /// A change feed fell behind and dropped notifications.
    Lagged(ObjectKind),
    /// Self-scheduled retry after a failed pass.
    Retry,
}

/// What the controller should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Request a reconciliation pass.
    Trigger,
    /// The current match changed: replace the held copy, then reconcile.
    ReplaceMatch(Match),
    Deploy(DeployUnit),
    Retire(Unit),
    /// A unit is gone; stop tracking it.
    Forget(UnitId),
    /// Notifications were lost: reconcile and re-check every unit.
    Resync,
    Ignore,
}

/// Classify an event.
pub fn route(event: ControllerEvent, current_match: MatchId) -> Route {
    match event {
        ControllerEvent::Match(change) => {
            if change.current.id != current_match || change.is_deleted() {
                Route::Ignore
            } else {
                Route::ReplaceMatch(change.current)
            }
        }
        ControllerEvent::Team(_) | ControllerEvent::Slot(_) | ControllerEvent::Retry => {
            Route::Trigger
        }
        ControllerEvent::Unit(change) => {
            if change.is_deleted() {
                Route::Forget(change.current.id)
            } else if should_retire(&change) {
                Route::Retire(change.current)
            } else {
                Route::Ignore
            }
        }
        ControllerEvent::Lagged(_) => Route::Resync,
        ControllerEvent::Deploy(event) if event.deleted => Route::Ignore,
        ControllerEvent::Deploy(event) => Route::Deploy(event),
    }
}

/// A unit is retired when its last fighter falls or a player deletes it.
pub fn should_retire(change: &Change<Unit>) -> bool {
    if change.is_deleted() {
        return false;
    }
    let unit = &change.current;
    unit.deleted_by_gesture || (unit.fighters == 0 && change.field_changed(|u| u.fighters))
}

/// Forwarding tasks feeding the controller queue. Aborted on drop.
pub struct EventRouter {
    tasks: Vec<JoinHandle<()>>,
}

impl EventRouter {
    /// Subscribe to every feed and start forwarding into `tx`.
    ///
    /// All subscriptions are taken before any task starts, so a failure
    /// leaves nothing running.
    pub fn start(
        lobby: &LobbyStores,
        battle: &BattleStores,
        deploys: &EventBus<DeployUnit>,
        tx: mpsc::Sender<ControllerEvent>,
    ) -> StoreResult<Self> {
        let matches = lobby.matches.subscribe()?;
        let teams = lobby.teams.subscribe()?;
        let slots = lobby.slots.subscribe()?;
        let units = battle.units.subscribe()?;
        let deploy_events = deploys.subscribe();

        let tasks = vec![
            forward_changes(matches, tx.clone(), ControllerEvent::Match),
            forward_changes(teams, tx.clone(), ControllerEvent::Team),
            forward_changes(slots, tx.clone(), ControllerEvent::Slot),
            forward_changes(units, tx.clone(), ControllerEvent::Unit),
            forward_events(deploy_events, tx),
        ];
        debug!(feeds = tasks.len(), "Event router started");

        Ok(Self { tasks })
    }

    /// Returns true while every feed is still being forwarded.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().all(|t| !t.is_finished())
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn forward_changes<T: Record>(
    mut subscription: Subscription<T>,
    tx: mpsc::Sender<ControllerEvent>,
    wrap: fn(Change<T>) -> ControllerEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = subscription.next().await {
            let event = match notification {
                Notification::Change(change) => wrap(change),
                Notification::Lagged { .. } => ControllerEvent::Lagged(T::KIND),
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        debug!(kind = %T::KIND, "Change feed closed");
    })
}

fn forward_events(
    mut stream: EventStream<DeployUnit>,
    tx: mpsc::Sender<ControllerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if tx.send(ControllerEvent::Deploy(event)).await.is_err() {
                break;
            }
        }
        debug!("Deploy event stream closed");
    })
}
