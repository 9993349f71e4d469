//! Transactional outbox.
//!
//! When enabled, committed batches are appended to the outbox instead of being
//! published directly. The [`OutboxRelay`] drains pending entries in append order
//! into the dispatcher and marks them delivered afterwards, giving at-least-once
//! delivery; handlers tolerate redelivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::telemetry::metrics::DispatchMetrics;
use crate::worker::PeriodicTask;

use super::dispatcher::{BatchReport, EventDispatcher, EventSink};
use super::event::EventEnvelope;

/// An envelope waiting in the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Monotonic append position
    pub sequence: u64,
    pub envelope: EventEnvelope,
    pub appended_at: DateTime<Utc>,
}

/// Durable staging area for committed events.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Append a committed batch, preserving its order.
    async fn append(&self, batch: Vec<EventEnvelope>) -> Result<()>;

    /// Oldest undelivered entries, at most `limit`.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Remove delivered entries.
    async fn mark_delivered(&self, sequences: &[u64]) -> Result<()>;

    async fn pending_count(&self) -> Result<usize>;
}

/// Outbox held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    state: Mutex<OutboxState>,
}

#[derive(Debug, Default)]
struct OutboxState {
    next_sequence: u64,
    pending: BTreeMap<u64, OutboxEntry>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn append(&self, batch: Vec<EventEnvelope>) -> Result<()> {
        let depth = {
            let mut state = self.state.lock();
            let now = Utc::now();
            for envelope in batch {
                state.next_sequence += 1;
                let sequence = state.next_sequence;
                state.pending.insert(
                    sequence,
                    OutboxEntry {
                        sequence,
                        envelope,
                        appended_at: now,
                    },
                );
            }
            state.pending.len()
        };
        DispatchMetrics::set_outbox_pending(depth);
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        Ok(self
            .state
            .lock()
            .pending
            .values()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, sequences: &[u64]) -> Result<()> {
        let depth = {
            let mut state = self.state.lock();
            for sequence in sequences {
                state.pending.remove(sequence);
            }
            state.pending.len()
        };
        DispatchMetrics::set_outbox_pending(depth);
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.state.lock().pending.len())
    }
}

/// Committed batches go to the outbox; nothing is published yet.
#[async_trait]
impl EventSink for InMemoryOutbox {
    async fn deliver(&self, batch: Vec<EventEnvelope>) -> Result<BatchReport> {
        self.append(batch).await?;
        Ok(BatchReport::default())
    }
}

// =============================================================================
// Relay
// =============================================================================

/// Moves outbox entries into the dispatcher.
pub struct OutboxRelay {
    outbox: Arc<dyn Outbox>,
    dispatcher: EventDispatcher,
    batch_size: usize,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn Outbox>, dispatcher: EventDispatcher, batch_size: usize) -> Self {
        Self {
            outbox,
            dispatcher,
            batch_size: batch_size.max(1),
        }
    }

    /// Relay one batch. Returns the number of entries delivered.
    #[instrument(name = "outbox_relay", skip(self))]
    pub async fn relay_once(&self) -> Result<usize> {
        let entries = self.outbox.fetch_pending(self.batch_size).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut delivered = Vec::with_capacity(entries.len());
        for entry in &entries {
            self.dispatcher.publish(&entry.envelope).await;
            delivered.push(entry.sequence);
        }
        self.outbox.mark_delivered(&delivered).await?;

        debug!(count = delivered.len(), "Relayed outbox entries");
        DispatchMetrics::outbox_relayed(delivered.len());
        Ok(delivered.len())
    }

    /// Relay until the outbox is empty.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let relayed = self.relay_once().await?;
            if relayed == 0 {
                return Ok(total);
            }
            total += relayed;
        }
    }
}

#[async_trait]
impl PeriodicTask for OutboxRelay {
    fn name(&self) -> &str {
        "outbox-relay"
    }

    async fn tick(&mut self) -> Result<()> {
        self.relay_once().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountUuid;
    use crate::events::dispatcher::{handler_fn, HandlerError};
    use crate::events::payloads::GoalCompleted;
    use crate::events::EventKind;
    use uuid::Uuid;

    fn envelope() -> EventEnvelope {
        EventEnvelope::new(
            GoalCompleted {
                goal_uuid: Uuid::new_v4(),
                account_uuid: AccountUuid::new("acct"),
                completed_at: Utc::now(),
            },
            1,
        )
    }

    #[tokio::test]
    async fn test_append_and_fetch_in_order() {
        let outbox = InMemoryOutbox::new();
        let batch = vec![envelope(), envelope(), envelope()];
        let ids: Vec<_> = batch.iter().map(|e| e.id()).collect();

        outbox.append(batch).await.unwrap();
        assert_eq!(outbox.pending_count().await.unwrap(), 3);

        let pending = outbox.fetch_pending(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].envelope.id(), ids[0]);
        assert_eq!(pending[1].envelope.id(), ids[1]);

        outbox.mark_delivered(&[pending[0].sequence]).await.unwrap();
        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].envelope.id(), ids[1]);
    }

    #[tokio::test]
    async fn test_relay_drains_into_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            dispatcher.subscribe(
                EventKind::GoalCompleted,
                handler_fn("recorder", move |e: EventEnvelope| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().push(e.id());
                        Ok::<_, HandlerError>(())
                    }
                }),
            );
        }

        let outbox = Arc::new(InMemoryOutbox::new());
        let batch: Vec<_> = (0..5).map(|_| envelope()).collect();
        let ids: Vec<_> = batch.iter().map(|e| e.id()).collect();
        outbox.deliver(batch).await.unwrap();
        assert!(seen.lock().is_empty());

        let relay = OutboxRelay::new(outbox.clone(), dispatcher, 2);
        assert_eq!(relay.drain().await.unwrap(), 5);
        assert_eq!(outbox.pending_count().await.unwrap(), 0);
        assert_eq!(*seen.lock(), ids);
    }
}
