//! Object store capability used by the battle controller.
//!
//! The replicated object database (the "federation") is an external
//! collaborator. This crate defines the slice of it the controller needs:
//!
//! - [`ObjectStore`]: create/get/enumerate/update/delete records of one type
//!   and subscribe to their changes.
//! - [`EventBus`]: publish/observe named user events such as `DeployUnit`.
//!
//! [`MemoryStore`] is an in-process implementation used by tests and the
//! demo binary. It supports injected failures and artificial latency so
//! that failure and coalescing behavior can be exercised.

mod bus;
mod memory;

pub use bus::{EventBus, EventStream};
pub use memory::{MemoryStore, MutationCounts};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;
use warstage_model::{Change, ObjectKind, Record};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by an object store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing connection is unavailable.
    #[error("{kind} store unavailable: {reason}")]
    Unavailable { kind: ObjectKind, reason: String },

    /// The object does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: ObjectKind, id: String },

    /// An object with the same identity already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: ObjectKind, id: String },
}

impl StoreError {
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Access to all records of one type in one namespace.
#[async_trait]
pub trait ObjectStore<T: Record>: Send + Sync {
    /// Store a new record and return the stored value.
    async fn create(&self, object: T) -> StoreResult<T>;

    /// Fetch a record by identity.
    async fn get(&self, id: T::Id) -> StoreResult<Option<T>>;

    /// Enumerate the latest state of every record, in store order.
    async fn all(&self) -> StoreResult<Vec<T>>;

    /// Replace a previously retrieved record with a mutated copy.
    async fn update(&self, object: T) -> StoreResult<T>;

    /// Delete a record. Deleting a missing record is a no-op.
    async fn delete(&self, id: T::Id) -> StoreResult<()>;

    /// Subscribe to creations, updates, and deletions of records.
    fn subscribe(&self) -> StoreResult<Subscription<T>>;
}

/// What a subscription yields.
#[derive(Debug, Clone)]
pub enum Notification<T> {
    Change(Change<T>),
    /// The subscriber fell behind and `skipped` changes were dropped. Any
    /// state derived from the feed must be re-read from the store.
    Lagged { skipped: u64 },
}

/// A live feed of changes to one record type.
///
/// Dropping the subscription releases it.
pub struct Subscription<T: Record> {
    rx: broadcast::Receiver<Change<T>>,
}

impl<T: Record> Subscription<T> {
    pub fn new(rx: broadcast::Receiver<Change<T>>) -> Self {
        Self { rx }
    }

    /// Wait for the next notification. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Notification<T>> {
        match self.rx.recv().await {
            Ok(change) => Some(Notification::Change(change)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(feed = T::KIND.as_str(), skipped, "Subscriber lagged, changes dropped");
                Some(Notification::Lagged { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
