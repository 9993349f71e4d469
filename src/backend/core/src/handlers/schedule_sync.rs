//! Schedule module: keep schedule tasks in step with goals and reminders.
//!
//! Each goal owns at most one pending deadline task and each enabled reminder
//! at most one pending firing task. An event only names the source that
//! changed; the desired task is derived from the source's current state, then
//! the existing task is created, moved, or cancelled to match. Late or
//! redelivered events therefore converge on the same schedule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::application::{GoalService, ReminderService, ScheduleService};
use crate::domain::{AccountUuid, Goal, ReminderTemplate, ReminderTrigger, ScheduleSource, ScheduleSourceKind};
use crate::events::{DomainEvent, EventEnvelope, EventHandler, EventKind, HandlerResult};

pub struct ScheduleSyncHandler {
    schedules: ScheduleService,
    goals: GoalService,
    reminders: ReminderService,
}

/// Desired state of the task for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Desired {
    Run {
        at: DateTime<Utc>,
        every_minutes: Option<u32>,
    },
    Cancelled(&'static str),
}

impl Desired {
    fn from_trigger(trigger: &ReminderTrigger, now: DateTime<Utc>) -> Self {
        match trigger.next_after(now) {
            Some(at) => Desired::Run {
                at,
                every_minutes: trigger.recurrence_minutes(),
            },
            None => Desired::Cancelled("no future firing"),
        }
    }

    fn for_goal(goal: Option<&Goal>) -> Self {
        match goal {
            None => Desired::Cancelled("goal deleted"),
            Some(goal) if goal.is_deleted() => Desired::Cancelled("goal deleted"),
            Some(goal) if !goal.is_active() => Desired::Cancelled("goal no longer active"),
            Some(goal) => Desired::Run {
                at: goal.end_time,
                every_minutes: None,
            },
        }
    }

    /// Next firing after `now`, or after the last firing if that is later.
    fn for_reminder(reminder: Option<&ReminderTemplate>, now: DateTime<Utc>) -> Self {
        match reminder {
            None => Desired::Cancelled("reminder deleted"),
            Some(reminder) if reminder.deleted => Desired::Cancelled("reminder deleted"),
            Some(reminder) if !reminder.enabled => Desired::Cancelled("reminder disabled"),
            Some(reminder) => {
                let since = reminder.last_fired_at.map_or(now, |fired| fired.max(now));
                Desired::from_trigger(&reminder.trigger, since)
            }
        }
    }
}

impl ScheduleSyncHandler {
    pub const NAME: &'static str = "schedule_sync";
    pub const SUBSCRIPTIONS: &'static [EventKind] = &[
        EventKind::GoalCreated,
        EventKind::GoalScheduleTimeChanged,
        EventKind::GoalCompleted,
        EventKind::GoalArchived,
        EventKind::GoalDeleted,
        EventKind::ReminderTemplateCreated,
        EventKind::ReminderTriggerChanged,
        EventKind::ReminderToggled,
        EventKind::ReminderTemplateDeleted,
    ];

    pub fn new(schedules: ScheduleService, goals: GoalService, reminders: ReminderService) -> Self {
        Self {
            schedules,
            goals,
            reminders,
        }
    }

    /// The schedule source an event concerns.
    fn source(envelope: &EventEnvelope) -> Option<ScheduleSource> {
        let source = match &envelope.event {
            DomainEvent::GoalCreated(e) => ScheduleSource::goal_deadline(e.goal_uuid),
            DomainEvent::GoalScheduleTimeChanged(e) => ScheduleSource::goal_deadline(e.goal_uuid),
            DomainEvent::GoalCompleted(e) => ScheduleSource::goal_deadline(e.goal_uuid),
            DomainEvent::GoalArchived(e) => ScheduleSource::goal_deadline(e.goal_uuid),
            DomainEvent::GoalDeleted(e) => ScheduleSource::goal_deadline(e.goal_uuid),
            DomainEvent::ReminderTemplateCreated(e) => ScheduleSource::reminder(e.template_uuid),
            DomainEvent::ReminderTriggerChanged(e) => ScheduleSource::reminder(e.template_uuid),
            DomainEvent::ReminderToggled(e) => ScheduleSource::reminder(e.template_uuid),
            DomainEvent::ReminderTemplateDeleted(e) => ScheduleSource::reminder(e.template_uuid),
            _ => return None,
        };
        Some(source)
    }

    async fn desired(&self, source: ScheduleSource, now: DateTime<Utc>) -> crate::error::Result<Desired> {
        Ok(match source.kind {
            ScheduleSourceKind::GoalDeadline => {
                let goal = self.goals.find_goal(source.source_uuid).await?;
                Desired::for_goal(goal.as_ref())
            }
            ScheduleSourceKind::Reminder => {
                let reminder = self.reminders.find_reminder(source.source_uuid).await?;
                Desired::for_reminder(reminder.as_ref(), now)
            }
        })
    }

    async fn sync(
        &self,
        cause: &EventEnvelope,
        account_uuid: &AccountUuid,
        source: ScheduleSource,
        desired: Desired,
    ) -> HandlerResult {
        let tasks = self.schedules.tasks_for(account_uuid, source).await?;
        let pending = tasks.iter().find(|task| task.is_pending());

        match (pending, desired) {
            (Some(task), Desired::Cancelled(reason)) => {
                self.schedules.cancel(task.uuid, reason, Some(cause)).await?;
            }
            (None, Desired::Cancelled(_)) => {
                debug!(source = %source, "No pending schedule task to cancel");
            }
            (Some(task), Desired::Run { at, every_minutes }) if task.every_minutes == every_minutes => {
                self.schedules.reschedule(task.uuid, at, Some(cause)).await?;
            }
            (Some(task), Desired::Run { at, every_minutes }) => {
                self.schedules.cancel(task.uuid, "recurrence changed", Some(cause)).await?;
                self.schedules
                    .create_task(account_uuid.clone(), source, at, every_minutes, Some(cause))
                    .await?;
            }
            (None, Desired::Run { at, every_minutes }) => {
                let already_fired = tasks
                    .iter()
                    .any(|task| task.last_fired_at.is_some_and(|fired| fired >= at));
                if already_fired {
                    debug!(source = %source, run_at = %at, "Slot already fired; not rescheduling");
                    return Ok(());
                }
                self.schedules
                    .create_task(account_uuid.clone(), source, at, every_minutes, Some(cause))
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ScheduleSyncHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let Some(source) = Self::source(envelope) else {
            return Ok(());
        };
        let desired = self.desired(source, envelope.timestamp()).await?;
        self.sync(envelope, envelope.account_uuid(), source, desired).await
    }
}
