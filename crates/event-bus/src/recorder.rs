use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bus::EventBus;
use crate::event::{Event, EventPayload};
use crate::handler::{BoxError, EventHandler};

/// A subscriber that keeps every event it sees, in delivery order.
///
/// Attached to all vocabulary topics it yields the live timeline the
/// demo UI reads; attached inside a test it is the assertion surface
/// for "what actually happened on the bus".
pub struct EventRecorder<P> {
    events: Arc<RwLock<Vec<Event<P>>>>,
}

impl<P> Clone for EventRecorder<P> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<P> Default for EventRecorder<P> {
    fn default() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<P: EventPayload> EventRecorder<P> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes this recorder to each of the given topics.
    pub async fn attach(&self, bus: &EventBus<P>, topics: &[P::Topic]) {
        for &topic in topics {
            bus.subscribe(topic, Arc::new(self.clone())).await;
        }
    }

    /// Returns a snapshot of everything recorded so far.
    pub async fn events(&self) -> Vec<Event<P>> {
        self.events.read().await.clone()
    }

    /// Returns how many events have been recorded.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns whether nothing has been recorded yet.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Drops everything recorded so far.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    /// Polls the recording until the predicate holds or the timeout
    /// elapses. Returns whether the predicate was ever satisfied.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Event<P>]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&self.events.read().await) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl<P: EventPayload> EventHandler<P> for EventRecorder<P> {
    async fn handle(&self, event: Event<P>) -> Result<(), BoxError> {
        self.events.write().await.push(event);
        Ok(())
    }
}
