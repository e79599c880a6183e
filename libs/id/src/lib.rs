//! # warstage-id
//!
//! Typed identifiers for the objects the battle controller reads and writes.
//!
//! Every object replicated through the lobby or battle store carries a
//! prefixed ULID identity: `{prefix}_{ulid}`.
//!
//! Examples:
//! - `team_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `ally_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `unit_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! The prefix keeps an alliance id from ever being passed where a team id is
//! expected. Player identifiers come from outside the platform and are kept
//! as validated opaque strings ([`PlayerId`]).

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
