//! # warstage-model
//!
//! Record types replicated through the lobby and battle object stores.
//!
//! ## Namespaces
//!
//! - **Lobby** (`Match`, `Team`, `Slot`): owned by the lobby service. The
//!   battle controller only reads these.
//! - **Battle** (`Alliance`, `Commander`, `DeploymentUnit`, `Unit`): derived
//!   and maintained by the battle controller. `Unit` is additionally mutated
//!   by the simulation (`fighters`, `deleted_by_gesture`).
//!
//! Every record implements [`Record`], which gives the store a typed
//! identity and an [`ObjectKind`] for logging and routing.
//!
//! Changes to records are delivered as [`Change`] envelopes carrying both
//! the previous and the current value, so consumers can detect field
//! transitions such as `fighters` dropping to zero.

mod battle;
mod change;
mod error;
mod events;
mod lobby;
mod unit_class;

pub use battle::*;
pub use change::*;
pub use error::ModelError;
pub use events::*;
pub use lobby::*;
pub use unit_class::*;

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A record stored in an object store.
pub trait Record: Clone + Debug + Send + Sync + 'static {
    /// Identity type of the record.
    type Id: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static;

    /// Object kind, used for routing and logging.
    const KIND: ObjectKind;

    /// Returns the record identity.
    fn id(&self) -> Self::Id;
}

/// Store namespace an object kind lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Lobby,
    Battle,
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Lobby => write!(f, "lobby"),
            Namespace::Battle => write!(f, "battle"),
        }
    }
}

/// Kind of a replicated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Match,
    Team,
    Slot,
    Alliance,
    Commander,
    DeploymentUnit,
    Unit,
}

impl ObjectKind {
    /// Returns the namespace objects of this kind are stored in.
    pub fn namespace(&self) -> Namespace {
        match self {
            ObjectKind::Match | ObjectKind::Team | ObjectKind::Slot => Namespace::Lobby,
            ObjectKind::Alliance
            | ObjectKind::Commander
            | ObjectKind::DeploymentUnit
            | ObjectKind::Unit => Namespace::Battle,
        }
    }
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Match => "match",
            ObjectKind::Team => "team",
            ObjectKind::Slot => "slot",
            ObjectKind::Alliance => "alliance",
            ObjectKind::Commander => "commander",
            ObjectKind::DeploymentUnit => "deployment_unit",
            ObjectKind::Unit => "unit",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_namespace() {
        assert_eq!(ObjectKind::Slot.namespace(), Namespace::Lobby);
        assert_eq!(ObjectKind::DeploymentUnit.namespace(), Namespace::Battle);
    }

    #[test]
    fn test_object_kind_display_matches_serde() {
        let json = serde_json::to_string(&ObjectKind::DeploymentUnit).unwrap();
        assert_eq!(json, format!("\"{}\"", ObjectKind::DeploymentUnit));
    }
}
