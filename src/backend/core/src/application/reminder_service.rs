//! Reminder module application service.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{AccountUuid, ReminderTemplate, ReminderTrigger};
use crate::error::{CadenceError, Result};
use crate::events::{EventEnvelope, EventSink};
use crate::repository::Repository;

use super::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct ReminderService {
    reminders: Arc<dyn Repository<ReminderTemplate>>,
    sink: Arc<dyn EventSink>,
}

impl ReminderService {
    pub fn new(reminders: Arc<dyn Repository<ReminderTemplate>>, sink: Arc<dyn EventSink>) -> Self {
        Self { reminders, sink }
    }

    #[instrument(skip(self, title))]
    pub async fn create_reminder(
        &self,
        account_uuid: AccountUuid,
        title: &str,
        trigger: ReminderTrigger,
        enabled: bool,
    ) -> Result<ReminderTemplate> {
        let mut reminder = ReminderTemplate::create(account_uuid, title, trigger, enabled)?;
        self.persist(&mut reminder, None).await?;
        info!(template_uuid = %reminder.uuid, "Reminder created");
        Ok(reminder)
    }

    /// Current state of a reminder, `None` once it has been removed.
    pub async fn find_reminder(&self, template_uuid: Uuid) -> Result<Option<ReminderTemplate>> {
        self.reminders.find_by_uuid(template_uuid).await
    }

    pub async fn get_reminder(&self, template_uuid: Uuid) -> Result<ReminderTemplate> {
        self.find_reminder(template_uuid)
            .await?
            .ok_or_else(|| CadenceError::reminder_template_not_found(template_uuid))
    }

    pub async fn list_reminders(&self, account_uuid: &AccountUuid) -> Result<Vec<ReminderTemplate>> {
        self.reminders.list_by_account(account_uuid).await
    }

    pub async fn change_trigger(&self, template_uuid: Uuid, trigger: ReminderTrigger) -> Result<bool> {
        let mut reminder = self.get_reminder(template_uuid).await?;
        if !reminder.change_trigger(trigger)? {
            return Ok(false);
        }
        self.persist(&mut reminder, None).await?;
        Ok(true)
    }

    pub async fn set_enabled(&self, template_uuid: Uuid, enabled: bool) -> Result<bool> {
        let mut reminder = self.get_reminder(template_uuid).await?;
        if !reminder.set_enabled(enabled)? {
            return Ok(false);
        }
        self.persist(&mut reminder, None).await?;
        Ok(true)
    }

    pub async fn delete_reminder(&self, template_uuid: Uuid) -> Result<()> {
        let mut reminder = self.get_reminder(template_uuid).await?;
        reminder.mark_deleted()?;
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.delete(self.reminders.as_ref(), &mut reminder).await?;
        uow.commit().await?;
        Ok(())
    }

    /// Fire the reminder for the slot `at` on behalf of `cause`.
    ///
    /// Returns `false` when the slot already fired.
    #[instrument(skip(self, cause), fields(cause = %cause.id()))]
    pub async fn fire(
        &self,
        template_uuid: Uuid,
        at: DateTime<Utc>,
        schedule_task_uuid: Uuid,
        cause: &EventEnvelope,
    ) -> Result<bool> {
        let mut reminder = self.get_reminder(template_uuid).await?;
        if !reminder.fire(at, schedule_task_uuid)? {
            return Ok(false);
        }
        self.persist(&mut reminder, Some(cause)).await?;
        Ok(true)
    }

    async fn persist(&self, reminder: &mut ReminderTemplate, cause: Option<&EventEnvelope>) -> Result<()> {
        let mut uow = UnitOfWork::begin(self.sink.clone());
        if let Some(cause) = cause {
            uow = uow.caused_by(cause);
        }
        uow.save(self.reminders.as_ref(), reminder).await?;
        uow.commit().await?;
        Ok(())
    }
}
