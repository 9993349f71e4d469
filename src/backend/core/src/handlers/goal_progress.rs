//! Goal module: advance key results when bound task instances complete.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::application::GoalService;
use crate::events::payloads::TaskInstanceCompleted;
use crate::events::{EventEnvelope, EventHandler, EventKind, HandlerError, HandlerResult};

pub struct GoalProgressHandler {
    goals: GoalService,
}

impl GoalProgressHandler {
    pub const NAME: &'static str = "goal_progress";
    pub const SUBSCRIPTIONS: &'static [EventKind] = &[EventKind::TaskInstanceCompleted];

    pub fn new(goals: GoalService) -> Self {
        Self { goals }
    }
}

#[async_trait]
impl EventHandler for GoalProgressHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let Some(completed) = envelope.payload::<TaskInstanceCompleted>() else {
            return Ok(());
        };
        let Some(binding) = completed.goal_binding else {
            return Ok(());
        };

        let goal = self.goals.get_goal(binding.goal_uuid).await?;
        if goal.account_uuid != completed.account_uuid {
            return Err(HandlerError::other(format!(
                "goal {} does not belong to account {}",
                binding.goal_uuid, completed.account_uuid
            )));
        }

        let applied = self
            .goals
            .apply_key_result_progress(binding.goal_uuid, binding.key_result_uuid, binding.increment_value, envelope)
            .await?;
        if applied {
            info!(
                goal_uuid = %binding.goal_uuid,
                key_result_uuid = %binding.key_result_uuid,
                delta = binding.increment_value,
                "Key result progressed"
            );
        } else {
            debug!(event_id = %envelope.id(), "Task completion already applied");
        }
        Ok(())
    }
}
