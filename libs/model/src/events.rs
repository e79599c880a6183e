//! User-facing events observed on the battle namespace.

use serde::{Deserialize, Serialize};
use warstage_id::DeploymentUnitId;

use crate::Vec2;

/// Event type names as published on the battle event bus.
pub mod event_types {
    pub const DEPLOY_UNIT: &str = "DeployUnit";
}

/// A player dropped (or cancelled dragging) a deployment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployUnit {
    pub deployment_unit: DeploymentUnitId,
    pub position: Vec2,
    /// The drag was cancelled; nothing should be deployed.
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_unit_wire_names() {
        let event = DeployUnit {
            deployment_unit: DeploymentUnitId::new(),
            position: Vec2::new(1.0, 2.0),
            deleted: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("deploymentUnit").is_some());
        assert_eq!(json["position"]["y"], 2.0);
    }
}
