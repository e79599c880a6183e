//! Typed ID definitions for lobby and battle objects.

use crate::{define_id, IdError};

// =============================================================================
// Lobby
// =============================================================================

define_id!(MatchId, "match");
define_id!(TeamId, "team");
define_id!(SlotId, "slot");

// =============================================================================
// Battle
// =============================================================================

define_id!(AllianceId, "ally");
define_id!(CommanderId, "cmdr");
define_id!(DeploymentUnitId, "dpl");
define_id!(UnitId, "unit");

// =============================================================================
// Players
// =============================================================================

/// Identifier of a human player.
///
/// Player IDs are issued by the lobby service, not by this platform, so they
/// are opaque strings. The only requirements are that they are non-empty and
/// contain no control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(String);

impl PlayerId {
    /// Validates and wraps a player identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.chars().any(char::is_control) {
            return Err(IdError::InvalidPlayer(id));
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for PlayerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PlayerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_team_id_roundtrip() {
        let id = TeamId::new();
        let parsed: TeamId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_alliance_id_prefix() {
        let id = AllianceId::new();
        assert!(id.to_string().starts_with("ally_"));
    }

    #[test]
    fn test_alliance_id_rejects_team_prefix() {
        let team = TeamId::new().to_string();
        let result: Result<AllianceId, _> = team.parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidPrefix {
                expected: "ally",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<UnitId, _> = "unit01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(result.unwrap_err(), IdError::MissingSeparator));
    }

    #[test]
    fn test_empty() {
        let result: Result<SlotId, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_invalid_ulid() {
        let result: Result<CommanderId, _> = "cmdr_invalid".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_json_uses_prefixed_form() {
        let id = DeploymentUnitId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: DeploymentUnitId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_player_id_validation() {
        assert!(PlayerId::new("p1").is_ok());
        assert!(PlayerId::new("").unwrap_err().is_empty());
        assert!(matches!(
            PlayerId::new("p\n1").unwrap_err(),
            IdError::InvalidPlayer(_)
        ));
    }

    #[test]
    fn test_player_id_json_rejects_empty() {
        let result: Result<PlayerId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_all_id_prefixes_unique() {
        let prefixes = [
            MatchId::PREFIX,
            TeamId::PREFIX,
            SlotId::PREFIX,
            AllianceId::PREFIX,
            CommanderId::PREFIX,
            DeploymentUnitId::PREFIX,
            UnitId::PREFIX,
        ];

        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn parse_never_panics(s in ".*") {
            let _ = TeamId::parse(&s);
            let _ = PlayerId::new(s);
        }
    }
}
