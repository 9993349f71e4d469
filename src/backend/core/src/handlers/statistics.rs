//! Goal statistics projection.

use async_trait::async_trait;
use tracing::trace;

use crate::events::{EventEnvelope, EventHandler, EventKind, HandlerResult};
use crate::statistics::StatisticsStore;

pub struct GoalStatisticsProjector {
    store: StatisticsStore,
}

impl GoalStatisticsProjector {
    pub const NAME: &'static str = "goal_statistics";
    pub const SUBSCRIPTIONS: &'static [EventKind] = &[
        EventKind::GoalCreated,
        EventKind::GoalScheduleTimeChanged,
        EventKind::GoalCompleted,
        EventKind::GoalArchived,
        EventKind::GoalDeleted,
        EventKind::KeyResultAdded,
        EventKind::KeyResultProgressed,
    ];

    pub fn new(store: StatisticsStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for GoalStatisticsProjector {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let outcome = self.store.apply(envelope);
        trace!(event_id = %envelope.id(), ?outcome, "Folded into goal statistics");
        Ok(())
    }
}
