//! Reconciliation primitives for the battle controller.
//!
//! Everything in this crate is pure: no I/O, no clocks except in
//! [`RetryBudget`]. The controller feeds it snapshots read from the stores
//! and executes the returned plans.
//!
//! - **Desired state**: alliances and commanders implied by the lobby
//!   ([`desired::derive`]).
//! - **Actual state**: alliances, commanders, and deployment units currently
//!   in the battle store.
//! - **Plans**: the minimal creates, updates, and deletes that converge
//!   actual to desired ([`plan`]).
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - Applying a plan and planning again against the result yields an empty plan
//! - Alliance identity is keyed by team, never by rank

pub mod desired;
pub mod gate;
pub mod geometry;
pub mod plan;
pub mod retry;

pub use desired::{derive, DesiredAlliance, DesiredState, TeamRoster};
pub use gate::{PassGate, PassState};
pub use geometry::{FormationSlot, Geometry};
pub use plan::{
    plan_alliances, plan_commanders, plan_layouts, AllianceChange, AlliancePlan, CommanderPlan,
    CommanderPolicy, FormationEntry, FormationTemplate, LayoutContext, LayoutPlan, LayoutRebuild,
    RebuildReason, SettledAlliance,
};
pub use retry::{BackoffPolicy, RetryBudget};

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use warstage_id::TeamId;
use warstage_model::ObjectKind;

/// A state that must never occur. Reported, logged, and skipped; never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The same team appears twice in the desired state.
    #[error("team {0} appears more than once")]
    DuplicateTeam(TeamId),

    /// Ranks are not the dense sequence 1..N.
    #[error("team {team_id} has rank {actual}, expected {expected}")]
    RankGap {
        team_id: TeamId,
        expected: u32,
        actual: u32,
    },

    /// An object refers to an owner that does not exist.
    #[error("{kind} {id} has no owning {owner}")]
    MissingOwner {
        kind: ObjectKind,
        id: String,
        owner: ObjectKind,
    },

    /// A referenced object does not exist.
    #[error("{kind} {id} referenced but not found")]
    MissingReference { kind: ObjectKind, id: String },
}

/// Content hash of a desired state, used to correlate passes in logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash a JSON value in canonical form (sorted keys, compact).
    pub fn from_json(value: &Value) -> Self {
        let canonical = canonicalize(value).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        Self(format!("sha256:{}", hex::encode(&digest[..12])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild objects with keys inserted in sorted order, so the output does not
/// depend on whether serde_json preserves insertion order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = serde_json::json!({"b": 2, "a": {"y": 1, "x": [1, 2]}});
        let b = serde_json::json!({"a": {"x": [1, 2], "y": 1}, "b": 2});
        assert_eq!(Fingerprint::from_json(&a), Fingerprint::from_json(&b));
    }

    #[test]
    fn test_fingerprint_sensitive_to_array_order() {
        let a = serde_json::json!([1, 2]);
        let b = serde_json::json!([2, 1]);
        assert_ne!(Fingerprint::from_json(&a), Fingerprint::from_json(&b));
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = Fingerprint::from_json(&serde_json::json!(null));
        assert!(fp.as_str().starts_with("sha256:"));
        assert_eq!(fp.as_str().len(), "sha256:".len() + 24);
    }
}
