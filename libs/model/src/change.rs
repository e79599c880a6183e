//! Change notifications delivered by object store subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single change to an object, in store order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    /// Store-wide sequence number. Strictly increasing per store.
    pub seq: u64,

    pub kind: ChangeKind,

    /// Value before the change. `None` for creations.
    pub previous: Option<T>,

    /// Value after the change. For deletions, the last known value.
    pub current: T,

    pub observed_at: DateTime<Utc>,
}

impl<T> Change<T> {
    pub fn created(seq: u64, current: T) -> Self {
        Self {
            seq,
            kind: ChangeKind::Created,
            previous: None,
            current,
            observed_at: Utc::now(),
        }
    }

    pub fn updated(seq: u64, previous: T, current: T) -> Self {
        Self {
            seq,
            kind: ChangeKind::Updated,
            previous: Some(previous),
            current,
            observed_at: Utc::now(),
        }
    }

    pub fn deleted(seq: u64, last: T) -> Self {
        Self {
            seq,
            kind: ChangeKind::Deleted,
            previous: None,
            current: last,
            observed_at: Utc::now(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }

    /// Returns true if the projected field differs between the previous and
    /// current value. Creations count as a change.
    pub fn field_changed<F, V>(&self, field: F) -> bool
    where
        F: Fn(&T) -> V,
        V: PartialEq,
    {
        match &self.previous {
            Some(previous) => field(previous) != field(&self.current),
            None => self.kind == ChangeKind::Created,
        }
    }
}
