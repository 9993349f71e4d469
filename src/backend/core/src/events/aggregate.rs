//! Aggregate roots, pending event buffers and read-model projections.
//!
//! Write-side aggregates record events into a [`PendingEvents`] buffer as a side
//! effect of state changes. The buffer is never persisted; a unit of work drains it
//! after the aggregate has been saved. Read models implement [`Projection`] and are
//! folded from envelopes.

use uuid::Uuid;

use crate::domain::AccountUuid;

use super::event::EventEnvelope;
use super::registry::DomainEvent;

// =============================================================================
// Aggregate Root
// =============================================================================

/// A write-side domain aggregate that emits events.
pub trait AggregateRoot: Clone + Send + Sync + 'static {
    /// Entity type name used in errors and logs.
    const ENTITY_TYPE: &'static str;

    fn uuid(&self) -> Uuid;

    fn account_uuid(&self) -> &AccountUuid;

    /// Number of events this aggregate has ever recorded.
    fn version(&self) -> u64;

    fn pending(&self) -> &PendingEvents;

    fn pending_mut(&mut self) -> &mut PendingEvents;

    /// Events recorded since the last drain, oldest first.
    fn pending_events(&self) -> &[EventEnvelope] {
        self.pending().as_slice()
    }

    /// Drain the buffer. Called by the unit of work after a successful save.
    fn take_pending_events(&mut self) -> Vec<EventEnvelope> {
        self.pending_mut().take()
    }
}

/// Ordered buffer of events recorded by an aggregate but not yet released.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingEvents {
    events: Vec<EventEnvelope>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump `version` and buffer `event` wrapped in a fresh envelope.
    pub fn record(&mut self, version: &mut u64, event: impl Into<DomainEvent>) -> &EventEnvelope {
        *version += 1;
        self.events.push(EventEnvelope::new(event, *version));
        let last = self.events.len() - 1;
        &self.events[last]
    }

    pub fn as_slice(&self) -> &[EventEnvelope] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn take(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// =============================================================================
// Projection Trait
// =============================================================================

/// A read model folded from a stream of event envelopes.
///
/// Implementations must be pure functions of `(self, envelope) -> self'`.
/// They must not perform I/O or fail; events a projection does not understand
/// are ignored.
pub trait Projection {
    /// Fold a single envelope into the read model.
    fn apply(&mut self, envelope: &EventEnvelope);

    /// Fold every envelope in order.
    fn apply_all<'a, I>(&mut self, envelopes: I)
    where
        I: IntoIterator<Item = &'a EventEnvelope>,
    {
        for envelope in envelopes {
            self.apply(envelope);
        }
    }
}
