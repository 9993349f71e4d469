//! Notification module: turn reminder firings and goal deadlines into notifications.

use async_trait::async_trait;

use crate::application::{GoalService, NotificationService};
use crate::domain::ScheduleSourceKind;
use crate::events::{DomainEvent, EventEnvelope, EventHandler, EventKind, HandlerResult};

pub struct NotificationHandler {
    notifications: NotificationService,
    goals: GoalService,
}

impl NotificationHandler {
    pub const NAME: &'static str = "notification";
    pub const SUBSCRIPTIONS: &'static [EventKind] = &[EventKind::ReminderTriggered, EventKind::ScheduleTaskFired];

    pub fn new(notifications: NotificationService, goals: GoalService) -> Self {
        Self { notifications, goals }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let (title, body) = match &envelope.event {
            DomainEvent::ReminderTriggered(e) => (e.title.clone(), format!("Reminder at {}", e.triggered_at.to_rfc3339())),
            DomainEvent::ScheduleTaskFired(e) if e.source.kind == ScheduleSourceKind::GoalDeadline => {
                let goal = self.goals.get_goal(e.source.source_uuid).await?;
                if !goal.is_active() {
                    return Ok(());
                }
                (
                    format!("Goal due: {}", goal.title),
                    format!("The deadline for \"{}\" was {}", goal.title, e.fired_at.to_rfc3339()),
                )
            }
            _ => return Ok(()),
        };

        self.notifications
            .notify(envelope.account_uuid().clone(), &title, &body, envelope)
            .await?;
        Ok(())
    }
}
