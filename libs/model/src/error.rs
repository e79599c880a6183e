//! Error types for model parsing.

use thiserror::Error;

/// Errors that can occur when parsing model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The unit class platform code is unknown.
    #[error("unknown unit platform: {0}")]
    UnknownPlatform(String),

    /// The unit class weapon code is unknown.
    #[error("unknown unit weapon: {0}")]
    UnknownWeapon(String),

    /// The unit class is not in `PLATFORM-WEAPON` form.
    #[error("malformed unit class: {0:?}")]
    MalformedUnitClass(String),
}
