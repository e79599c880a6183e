//! Named user event streams.

use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_BUS_CAPACITY: usize = 256;

/// Publish/observe channel for one named user event, such as `DeployUnit`.
pub struct EventBus<E: Clone + Send + 'static> {
    name: &'static str,
    tx: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { name, tx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publish an event. Returns the number of observers that will see it.
    pub fn publish(&self, event: E) -> usize {
        let observers = self.tx.send(event).unwrap_or(0);
        debug!(event = self.name, observers, "Published event");
        observers
    }

    /// Start observing events published from now on.
    pub fn subscribe(&self) -> EventStream<E> {
        EventStream {
            name: self.name,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of an [`EventBus`].
pub struct EventStream<E: Clone + Send + 'static> {
    name: &'static str,
    rx: broadcast::Receiver<E>,
}

impl<E: Clone + Send + 'static> EventStream<E> {
    /// Wait for the next event. Returns `None` once the bus is gone.
    ///
    /// Events dropped because the stream fell behind are skipped; user
    /// events are not replayable.
    pub async fn next(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(event = self.name, skipped, "Observer lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
