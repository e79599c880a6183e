//! End-to-end sandbox session.
//!
//! Plays through a short session the way the demo binary runs it:
//!
//! 1. Seed the sandbox match (host seated on both teams)
//! 2. Start the controller and check the battlefield it builds
//! 3. Deploy a unit for each side
//! 4. A second player joins; a commander appears for them
//! 5. One unit is wiped out, the other deleted by gesture
//! 6. Shut down
//!
//! ## Running
//!
//! ```bash
//! cargo test -p warstage-e2e --test sandbox
//! ```

use std::time::Duration;

use tracing::info;
use warstage_battle_controller::sandbox::{seed_sandbox, SANDBOX_MAP, SANDBOX_TITLE};
use warstage_battle_controller::template::load_formation;
use warstage_battle_controller::{
    BattleMemory, Config, Controller, ControllerHandle, ControllerSettings, ControllerStats,
    LobbyMemory,
};
use warstage_id::{PlayerId, SlotId};
use warstage_model::{event_types, DeployUnit, Slot};
use warstage_store::{EventBus, ObjectStore};

const TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warstage_battle_controller=debug")
        .with_test_writer()
        .try_init();
}

async fn wait_for(handle: &ControllerHandle, condition: impl Fn(&ControllerStats) -> bool) {
    let mut rx = handle.stats();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|s| condition(s)))
        .await
        .expect("timed out waiting for controller")
        .expect("controller stopped");
}

async fn settle<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("battlefield did not settle within {TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_sandbox_session() {
    init_tracing();

    let config = Config::from_lookup(|_| None).unwrap();
    let host = config.host_player_id.clone();
    let template = load_formation(config.formation_path.as_deref()).unwrap();

    let lobby = LobbyMemory::default();
    let battle = BattleMemory::default();
    let deploys: EventBus<DeployUnit> = EventBus::new(event_types::DEPLOY_UNIT);

    // 1. Seed
    let sandbox = seed_sandbox(&lobby.stores(), &host).await.unwrap();
    assert_eq!(sandbox.title, SANDBOX_TITLE);
    assert_eq!(sandbox.map, SANDBOX_MAP);

    // 2. Start
    let handle = Controller::new(
        lobby.stores(),
        battle.stores(),
        ControllerSettings::from_config(&config, template),
    )
    .start(sandbox.id, &deploys)
    .await
    .unwrap();

    let alliances = battle.alliances.all().await.unwrap();
    assert_eq!(alliances.len(), 2);
    let commanders = battle.commanders.all().await.unwrap();
    assert_eq!(commanders.len(), 2);
    assert!(commanders.iter().all(|c| c.player_id == host));
    assert_eq!(battle.deployment_units.len().await, 32);
    info!("Battlefield built");

    // 3. Deploy one unit per side
    let deployment_units = battle.deployment_units.all().await.unwrap();
    for alliance in &alliances {
        let source = deployment_units
            .iter()
            .find(|u| u.alliance_id == alliance.id)
            .unwrap();
        deploys.publish(DeployUnit {
            deployment_unit: source.id,
            position: source.position,
            deleted: false,
        });
    }
    wait_for(&handle, |s| s.units_deployed == 2).await;
    let units = battle.units.all().await.unwrap();
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|u| u.fighters > 0 && u.commander_id.is_some()));

    // 4. A second player takes a new seat on the second team
    let guest = PlayerId::new("guest").unwrap();
    let seat = Slot {
        id: SlotId::new(),
        player_id: Some(guest.clone()),
    };
    lobby.slots.create(seat.clone()).await.unwrap();
    let mut team = lobby.teams.get(sandbox.teams[1]).await.unwrap().unwrap();
    team.slots.push(seat.id);
    lobby.teams.update(team).await.unwrap();

    settle(|| async { battle.commanders.len().await == 3 }).await;
    let guest_commander = battle
        .commanders
        .all()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.player_id == guest)
        .unwrap();
    let second = alliances.iter().find(|a| a.team_id == sandbox.teams[1]).unwrap();
    assert_eq!(guest_commander.alliance_id, second.id);
    // Membership changes never move the formation.
    assert_eq!(battle.deployment_units.len().await, 32);

    // 5. Wipe out one unit, gesture-delete the other
    let mut wiped = units[0].clone();
    wiped.fighters = 0;
    battle.units.update(wiped).await.unwrap();
    let mut gestured = units[1].clone();
    gestured.deleted_by_gesture = true;
    battle.units.update(gestured).await.unwrap();

    wait_for(&handle, |s| s.units_retired == 2).await;
    settle(|| async { battle.units.is_empty().await }).await;
    assert_eq!(battle.units.mutations().deletes, 2);

    // 6. Shut down
    let stats = handle.current_stats();
    assert_eq!(stats.failed_passes, 0);
    assert_eq!(stats.handler_failures, 0);
    handle.shutdown().await;
}
