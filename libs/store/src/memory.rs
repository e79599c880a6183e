//! In-memory object store.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use warstage_model::{Change, Record};

use crate::{ObjectStore, StoreError, StoreResult, Subscription};

const CHANGE_FEED_CAPACITY: usize = 1024;

/// Number of mutating calls a store has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCounts {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
}

impl MutationCounts {
    pub fn total(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

/// Object store backed by a vector in process memory.
///
/// Records keep insertion order. Every successful mutation is published to
/// subscribers with a store-wide sequence number.
pub struct MemoryStore<T: Record> {
    objects: RwLock<Vec<T>>,
    seq: AtomicU64,
    changes: broadcast::Sender<Change<T>>,
    available: AtomicBool,
    injected_failures: AtomicUsize,
    latency: Duration,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl<T: Record> MemoryStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            objects: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            changes,
            available: AtomicBool::new(true),
            injected_failures: AtomicUsize::new(0),
            latency: Duration::ZERO,
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Delay every call by `latency`, simulating a remote round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Keep at most `capacity` undelivered changes per subscriber.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        self.changes = changes;
        self
    }

    /// Make every call fail with [`StoreError::Unavailable`] until restored.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail the next `count` mutating calls.
    pub fn inject_failures(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Mutating calls served so far, including failed and no-op ones.
    pub fn mutations(&self) -> MutationCounts {
        MutationCounts {
            creates: self.creates.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn round_trip(&self) -> StoreResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(self.unavailable("connection unavailable"));
        }
        Ok(())
    }

    async fn mutation(&self, counter: &AtomicU64) -> StoreResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(self.unavailable("injected failure"));
        }
        Ok(())
    }

    fn unavailable(&self, reason: &str) -> StoreError {
        StoreError::Unavailable {
            kind: T::KIND,
            reason: reason.to_string(),
        }
    }

    fn publish(&self, change: Change<T>) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> ObjectStore<T> for MemoryStore<T> {
    async fn create(&self, object: T) -> StoreResult<T> {
        self.mutation(&self.creates).await?;

        let mut objects = self.objects.write().await;
        let id = object.id();
        if objects.iter().any(|o| o.id() == id) {
            return Err(StoreError::AlreadyExists {
                kind: T::KIND,
                id: id.to_string(),
            });
        }
        objects.push(object.clone());
        self.publish(Change::created(self.next_seq(), object.clone()));

        debug!(kind = %T::KIND, id = %id, "[MEMORY] Created");
        Ok(object)
    }

    async fn get(&self, id: T::Id) -> StoreResult<Option<T>> {
        self.round_trip().await?;
        let objects = self.objects.read().await;
        Ok(objects.iter().find(|o| o.id() == id).cloned())
    }

    async fn all(&self) -> StoreResult<Vec<T>> {
        self.round_trip().await?;
        Ok(self.objects.read().await.clone())
    }

    async fn update(&self, object: T) -> StoreResult<T> {
        self.mutation(&self.updates).await?;

        let mut objects = self.objects.write().await;
        let id = object.id();
        let Some(slot) = objects.iter_mut().find(|o| o.id() == id) else {
            return Err(StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            });
        };
        let previous = std::mem::replace(slot, object.clone());
        self.publish(Change::updated(self.next_seq(), previous, object.clone()));

        debug!(kind = %T::KIND, id = %id, "[MEMORY] Updated");
        Ok(object)
    }

    async fn delete(&self, id: T::Id) -> StoreResult<()> {
        self.mutation(&self.deletes).await?;

        let mut objects = self.objects.write().await;
        let Some(index) = objects.iter().position(|o| o.id() == id) else {
            return Ok(());
        };
        let removed = objects.remove(index);
        self.publish(Change::deleted(self.next_seq(), removed));

        debug!(kind = %T::KIND, id = %id, "[MEMORY] Deleted");
        Ok(())
    }

    fn subscribe(&self) -> StoreResult<Subscription<T>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(self.unavailable("cannot subscribe"));
        }
        Ok(Subscription::new(self.changes.subscribe()))
    }
}
