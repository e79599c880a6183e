//! Unit classes: the `PLATFORM-WEAPON` codes used by the samurai ruleset.

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// What a unit rides or marches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Cavalry,
    General,
    Ashigaru,
    Samurai,
}

impl Platform {
    /// Returns the three-letter code for this platform.
    pub fn code(&self) -> &'static str {
        match self {
            Platform::Cavalry => "CAV",
            Platform::General => "GEN",
            Platform::Ashigaru => "ASH",
            Platform::Samurai => "SAM",
        }
    }

    fn from_code(code: &str) -> Result<Self, ModelError> {
        match code {
            "CAV" => Ok(Platform::Cavalry),
            "GEN" => Ok(Platform::General),
            "ASH" => Ok(Platform::Ashigaru),
            "SAM" => Ok(Platform::Samurai),
            other => Err(ModelError::UnknownPlatform(other.to_string())),
        }
    }
}

/// What a unit fights with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weapon {
    Yari,
    Katana,
    Naginata,
    Bow,
    Arq,
    Cannon,
}

impl Weapon {
    /// Returns the code for this weapon.
    pub fn code(&self) -> &'static str {
        match self {
            Weapon::Yari => "YARI",
            Weapon::Katana => "KATA",
            Weapon::Naginata => "NAGI",
            Weapon::Bow => "BOW",
            Weapon::Arq => "ARQ",
            Weapon::Cannon => "CAN",
        }
    }

    fn from_code(code: &str) -> Result<Self, ModelError> {
        match code {
            "YARI" => Ok(Weapon::Yari),
            "KATA" => Ok(Weapon::Katana),
            "NAGI" => Ok(Weapon::Naginata),
            "BOW" => Ok(Weapon::Bow),
            "ARQ" => Ok(Weapon::Arq),
            "CAN" => Ok(Weapon::Cannon),
            other => Err(ModelError::UnknownWeapon(other.to_string())),
        }
    }
}

/// A unit class such as `SAM-ARQ` or `CAV-YARI`.
///
/// Serialized as its code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitClass {
    pub platform: Platform,
    pub weapon: Weapon,
}

impl UnitClass {
    pub const fn new(platform: Platform, weapon: Weapon) -> Self {
        Self { platform, weapon }
    }

    /// Number of fighters a freshly deployed unit of this class starts with.
    pub fn default_size(&self) -> u32 {
        if self.weapon == Weapon::Cannon {
            return 12;
        }
        match self.platform {
            Platform::Cavalry | Platform::General => 40,
            Platform::Ashigaru | Platform::Samurai => 80,
        }
    }
}

impl std::fmt::Display for UnitClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.platform.code(), self.weapon.code())
    }
}

impl std::str::FromStr for UnitClass {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((platform, weapon)) = s.split_once('-') else {
            return Err(ModelError::MalformedUnitClass(s.to_string()));
        };
        Ok(Self {
            platform: Platform::from_code(platform)?,
            weapon: Weapon::from_code(weapon)?,
        })
    }
}

impl Serialize for UnitClass {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnitClass {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("SAM-ARQ", Platform::Samurai, Weapon::Arq, 80)]
    #[case("ASH-CAN", Platform::Ashigaru, Weapon::Cannon, 12)]
    #[case("CAV-NAGI", Platform::Cavalry, Weapon::Naginata, 40)]
    #[case("GEN-KATA", Platform::General, Weapon::Katana, 40)]
    #[case("ASH-YARI", Platform::Ashigaru, Weapon::Yari, 80)]
    fn test_parse_and_default_size(
        #[case] code: &str,
        #[case] platform: Platform,
        #[case] weapon: Weapon,
        #[case] size: u32,
    ) {
        let class: UnitClass = code.parse().unwrap();
        assert_eq!(class, UnitClass::new(platform, weapon));
        assert_eq!(class.default_size(), size);
        assert_eq!(class.to_string(), code);
    }

    #[rstest]
    #[case("SAMARQ")]
    #[case("XYZ-ARQ")]
    #[case("SAM-SPEAR")]
    #[case("")]
    fn test_rejects_malformed(#[case] code: &str) {
        assert!(code.parse::<UnitClass>().is_err());
    }

    #[test]
    fn test_unknown_weapon_reports_code() {
        let err = "CAV-LANCE".parse::<UnitClass>().unwrap_err();
        assert_eq!(err, ModelError::UnknownWeapon("LANCE".to_string()));
    }
}
