//! Warstage battle controller.
//!
//! Watches the lobby namespace (matches, teams, slots) and keeps the battle
//! namespace in line with it: one alliance per team, one commander per
//! occupied slot, and a full reinforcement formation of deployment units per
//! alliance. It also turns player drops into units and removes units that
//! were wiped out or deleted by gesture.
//!
//! ## Architecture
//!
//! - **Event Router** ([`router`]): forwards store changes and deploy events
//!   into one queue
//! - **Controller** ([`controller`]): single event loop, serializes passes
//!   and coalesces triggers
//! - **Engine** ([`engine`]): one reconciliation pass against the battle store
//! - **Deploy handler** ([`deploy`]): direct per-unit actions outside passes

pub mod config;
pub mod controller;
pub mod deploy;
pub mod engine;
pub mod router;
pub mod sandbox;
pub mod stores;
pub mod template;

pub use config::{Config, ConfigError};
pub use controller::{Controller, ControllerError, ControllerHandle, ControllerSettings, ControllerStats};
pub use deploy::{DeployHandler, HandlerError};
pub use engine::{Cascade, Engine, EngineError, EngineSettings, PassReport, Phase};
pub use stores::{BattleMemory, BattleStores, LobbyMemory, LobbyStores};
