//! Warstage battle controller, sandbox mode.
//!
//! Wires in-memory lobby and battle stores, seeds a two-team sandbox match
//! with the host player on both sides, and keeps the battle namespace
//! reconciled until Ctrl-C.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warstage_model::{event_types, DeployUnit};
use warstage_store::EventBus;

use warstage_battle_controller::sandbox::seed_sandbox;
use warstage_battle_controller::template::load_formation;
use warstage_battle_controller::{BattleStores, Config, Controller, ControllerSettings, LobbyStores};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting warstage battle controller");
    info!(
        host_player_id = %config.host_player_id,
        commander_policy = %config.commander_policy,
        formation = ?config.formation_path,
        "Configuration loaded"
    );

    let template = load_formation(config.formation_path.as_deref())?;

    let (lobby, _lobby_memory) = LobbyStores::in_memory();
    let (battle, _battle_memory) = BattleStores::in_memory();
    let deploys: EventBus<DeployUnit> = EventBus::new(event_types::DEPLOY_UNIT);

    let sandbox = seed_sandbox(&lobby, &config.host_player_id)
        .await
        .context("failed to seed sandbox match")?;
    info!(match_id = %sandbox.id, map = %sandbox.map, "Sandbox match seeded");

    let controller = Controller::new(
        lobby,
        battle,
        ControllerSettings::from_config(&config, template),
    );
    let handle = controller.start(sandbox.id, &deploys).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    let stats = handle.current_stats();
    handle.shutdown().await;

    info!(
        passes = stats.passes,
        failed_passes = stats.failed_passes,
        coalesced_triggers = stats.coalesced_triggers,
        units_deployed = stats.units_deployed,
        units_retired = stats.units_retired,
        "Battle controller shutdown complete"
    );
    Ok(())
}
