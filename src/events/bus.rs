//! Event bus implementations and the best-effort publisher.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events::{Event, EventBus, EventEnvelope, EventError};

/// In-process fan-out bus built on a Tokio broadcast channel.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), EventError> {
        if self.tx.receiver_count() == 0 {
            tracing::trace!(kind = envelope.event.kind(), "No event subscribers, dropping event");
            return Ok(());
        }
        self.tx.send(envelope).map(|_| ()).map_err(|_| EventError::Closed)
    }
}

/// Bus that keeps every published event in memory.
#[derive(Debug, Default)]
pub struct MemoryEventBus {
    events: Mutex<Vec<EventEnvelope>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.envelopes().into_iter().map(|e| e.event).collect()
    }

    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope);
        Ok(())
    }
}

/// Source-tagged, fire-and-forget publishing handle.
///
/// A component without a bus gets a publisher that silently drops events.
#[derive(Clone)]
pub struct Publisher {
    bus: Option<Arc<dyn EventBus>>,
    source: &'static str,
}

impl Publisher {
    pub fn new(bus: Option<Arc<dyn EventBus>>, source: &'static str) -> Self {
        Self { bus, source }
    }

    /// Publish `event`; failures are logged and swallowed.
    pub async fn publish(&self, event: Event) {
        let Some(bus) = &self.bus else {
            return;
        };

        let kind = event.kind();
        if let Err(e) = bus.publish(EventEnvelope::new(self.source, event)).await {
            tracing::warn!(
                source = self.source,
                kind,
                error = %e,
                "Failed to publish event"
            );
        }
    }
}
