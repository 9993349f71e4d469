//! Reminder template aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CadenceError, Result};
use crate::events::payloads::{
    ReminderTemplateCreated, ReminderTemplateDeleted, ReminderToggled, ReminderTriggerChanged,
    ReminderTriggered,
};
use crate::events::PendingEvents;

use super::{impl_aggregate_root, require_text, AccountUuid, ReminderTrigger};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTemplate {
    pub uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub trigger: ReminderTrigger,
    pub enabled: bool,
    pub deleted: bool,
    /// Firing slot of the most recent `reminder.triggered`
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
    pub version: u64,
    #[serde(skip)]
    pending: PendingEvents,
}

impl_aggregate_root!(ReminderTemplate, "reminder_template");

impl ReminderTemplate {
    pub fn create(
        account_uuid: AccountUuid,
        title: &str,
        trigger: ReminderTrigger,
        enabled: bool,
    ) -> Result<Self> {
        let title = require_text("title", title)?;
        trigger.validate()?;

        let mut template = Self {
            uuid: Uuid::new_v4(),
            account_uuid,
            title,
            trigger,
            enabled,
            deleted: false,
            last_fired_at: None,
            fire_count: 0,
            version: 0,
            pending: PendingEvents::new(),
        };
        let event = ReminderTemplateCreated {
            template_uuid: template.uuid,
            account_uuid: template.account_uuid.clone(),
            title: template.title.clone(),
            trigger,
            enabled,
        };
        template.pending.record(&mut template.version, event);
        Ok(template)
    }

    /// Replace the trigger. Returns `false` (no event) when unchanged.
    pub fn change_trigger(&mut self, trigger: ReminderTrigger) -> Result<bool> {
        self.ensure_live("change the trigger of")?;
        trigger.validate()?;
        if trigger == self.trigger {
            return Ok(false);
        }

        let event = ReminderTriggerChanged {
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            old_trigger: self.trigger,
            new_trigger: trigger,
            enabled: self.enabled,
        };
        self.trigger = trigger;
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    /// Enable or disable. Returns `false` (no event) when unchanged.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<bool> {
        self.ensure_live("toggle")?;
        if enabled == self.enabled {
            return Ok(false);
        }

        self.enabled = enabled;
        let event = ReminderToggled {
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            enabled,
            trigger: self.trigger,
        };
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    pub fn mark_deleted(&mut self) -> Result<()> {
        self.ensure_live("delete")?;
        self.deleted = true;
        let event = ReminderTemplateDeleted {
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    /// Fire for the slot `at`, scheduled by `schedule_task_uuid`.
    ///
    /// Returns `false` (no event) if this slot already fired.
    pub fn fire(&mut self, at: DateTime<Utc>, schedule_task_uuid: Uuid) -> Result<bool> {
        self.ensure_live("fire")?;
        if !self.enabled {
            return Err(CadenceError::invalid_transition("reminder", "Disabled", "fire"));
        }
        if self.last_fired_at.is_some_and(|last| last >= at) {
            return Ok(false);
        }

        self.last_fired_at = Some(at);
        self.fire_count += 1;
        let event = ReminderTriggered {
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            title: self.title.clone(),
            triggered_at: at,
            schedule_task_uuid,
        };
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    fn ensure_live(&self, action: &str) -> Result<()> {
        if self.deleted {
            return Err(CadenceError::invalid_transition("reminder", "Deleted", action));
        }
        Ok(())
    }
}
