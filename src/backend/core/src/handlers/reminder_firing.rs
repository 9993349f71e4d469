//! Reminder module: fire reminders when their schedule task fires.

use async_trait::async_trait;
use tracing::debug;

use crate::application::ReminderService;
use crate::domain::ScheduleSourceKind;
use crate::events::payloads::ScheduleTaskFired;
use crate::events::{EventEnvelope, EventHandler, EventKind, HandlerResult};

pub struct ReminderFiringHandler {
    reminders: ReminderService,
}

impl ReminderFiringHandler {
    pub const NAME: &'static str = "reminder_firing";
    pub const SUBSCRIPTIONS: &'static [EventKind] = &[EventKind::ScheduleTaskFired];

    pub fn new(reminders: ReminderService) -> Self {
        Self { reminders }
    }
}

#[async_trait]
impl EventHandler for ReminderFiringHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let Some(fired) = envelope.payload::<ScheduleTaskFired>() else {
            return Ok(());
        };
        if fired.source.kind != ScheduleSourceKind::Reminder {
            return Ok(());
        }

        let reminder = self.reminders.get_reminder(fired.source.source_uuid).await?;
        if !reminder.enabled {
            debug!(template_uuid = %reminder.uuid, "Reminder disabled; ignoring firing");
            return Ok(());
        }

        let triggered = self
            .reminders
            .fire(reminder.uuid, fired.fired_at, fired.schedule_task_uuid, envelope)
            .await?;
        if !triggered {
            debug!(template_uuid = %reminder.uuid, slot = %fired.fired_at, "Reminder slot already fired");
        }
        Ok(())
    }
}
