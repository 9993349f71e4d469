//! Unit of work: persist first, publish after.
//!
//! Events recorded by an aggregate are staged only once the aggregate has been
//! saved (or deleted) successfully, and leave the process only on `commit`. A unit
//! of work that is dropped without committing discards everything it staged.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::events::{AggregateRoot, BatchReport, EventEnvelope, EventId, EventSink};
use crate::repository::Repository;
use crate::telemetry::metrics::OperationTimer;

/// Where committed events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Publish straight to the in-process dispatcher.
    #[default]
    Direct,
    /// Append to the outbox; the relay publishes later.
    Outbox,
}

pub struct UnitOfWork {
    sink: Arc<dyn EventSink>,
    staged: Vec<EventEnvelope>,
    cause: Option<(EventId, String)>,
    actor: Option<String>,
}

impl UnitOfWork {
    pub fn begin(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            staged: Vec::new(),
            cause: None,
            actor: None,
        }
    }

    /// Every event staged by this unit of work is caused by `parent`.
    pub fn caused_by(mut self, parent: &EventEnvelope) -> Self {
        let correlation = parent
            .metadata
            .correlation_id
            .clone()
            .unwrap_or_else(|| parent.id().to_string());
        self.cause = Some((parent.id(), correlation));
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Persist `aggregate`, then stage its pending events.
    ///
    /// On failure nothing is staged and the aggregate keeps its pending events.
    pub async fn save<A, R>(&mut self, repository: &R, aggregate: &mut A) -> Result<()>
    where
        A: AggregateRoot,
        R: Repository<A> + ?Sized,
    {
        repository.save(aggregate).await?;
        let events = aggregate.take_pending_events();
        self.stage(events);
        Ok(())
    }

    /// Remove `aggregate` from storage, then stage its pending events.
    pub async fn delete<A, R>(&mut self, repository: &R, aggregate: &mut A) -> Result<()>
    where
        A: AggregateRoot,
        R: Repository<A> + ?Sized,
    {
        repository.delete(aggregate.uuid()).await?;
        let events = aggregate.take_pending_events();
        self.stage(events);
        Ok(())
    }

    fn stage(&mut self, events: Vec<EventEnvelope>) {
        for mut envelope in events {
            if let Some((causation, correlation)) = &self.cause {
                envelope.metadata.causation_id = Some(*causation);
                envelope.metadata.correlation_id = Some(correlation.clone());
            }
            if let Some(actor) = &self.actor {
                envelope.metadata.actor_id = Some(actor.clone());
            }
            self.staged.push(envelope);
        }
    }

    /// Events staged so far, in commit order.
    pub fn staged(&self) -> &[EventEnvelope] {
        &self.staged
    }

    /// Release every staged event, in order, to the sink.
    pub async fn commit(mut self) -> Result<BatchReport> {
        let batch = std::mem::take(&mut self.staged);
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }
        debug!(events = batch.len(), "Committing unit of work");
        let timer = OperationTimer::start("unit_of_work_commit");
        let delivered = self.sink.deliver(batch).await;
        timer.finish();
        delivered
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                discarded = self.staged.len(),
                "Unit of work dropped without commit; staged events discarded"
            );
        }
    }
}
