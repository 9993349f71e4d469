//! Task templates and the instances generated from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CadenceError, Result};
use crate::events::payloads::{
    TaskInstanceCompleted, TaskInstanceCreated, TaskInstanceSkipped, TaskTemplateCreated,
    TaskTemplateDeleted, TaskTemplateUpdated,
};
use crate::events::PendingEvents;

use super::{impl_aggregate_root, require_text, AccountUuid, GoalBinding};

// =============================================================================
// Task Template
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub goal_binding: Option<GoalBinding>,
    pub deleted: bool,
    pub version: u64,
    #[serde(skip)]
    pending: PendingEvents,
}

impl_aggregate_root!(TaskTemplate, "task_template");

impl TaskTemplate {
    pub fn create(account_uuid: AccountUuid, title: &str, goal_binding: Option<GoalBinding>) -> Result<Self> {
        let title = require_text("title", title)?;
        if let Some(binding) = &goal_binding {
            binding.validate()?;
        }

        let mut template = Self {
            uuid: Uuid::new_v4(),
            account_uuid,
            title,
            goal_binding,
            deleted: false,
            version: 0,
            pending: PendingEvents::new(),
        };
        let event = TaskTemplateCreated {
            template_uuid: template.uuid,
            account_uuid: template.account_uuid.clone(),
            title: template.title.clone(),
            goal_binding,
        };
        template.pending.record(&mut template.version, event);
        Ok(template)
    }

    /// Update title and binding. Returns `false` (no event) when nothing changed.
    pub fn update(&mut self, title: &str, goal_binding: Option<GoalBinding>) -> Result<bool> {
        self.ensure_live("update")?;
        let title = require_text("title", title)?;
        if let Some(binding) = &goal_binding {
            binding.validate()?;
        }
        if title == self.title && goal_binding == self.goal_binding {
            return Ok(false);
        }

        let event = TaskTemplateUpdated {
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            old_title: self.title.clone(),
            new_title: title.clone(),
            old_goal_binding: self.goal_binding,
            new_goal_binding: goal_binding,
        };
        self.title = title;
        self.goal_binding = goal_binding;
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    pub fn mark_deleted(&mut self) -> Result<()> {
        self.ensure_live("delete")?;
        self.deleted = true;
        let event = TaskTemplateDeleted {
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    /// Generate a pending instance scheduled for `scheduled_for`. The instance
    /// snapshots the template's current goal binding.
    pub fn generate_instance(&self, scheduled_for: DateTime<Utc>) -> Result<TaskInstance> {
        self.ensure_live("generate an instance of")?;

        let mut instance = TaskInstance {
            uuid: Uuid::new_v4(),
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            scheduled_for,
            status: TaskInstanceStatus::Pending,
            goal_binding: self.goal_binding,
            finished_at: None,
            version: 0,
            pending: PendingEvents::new(),
        };
        let event = TaskInstanceCreated {
            instance_uuid: instance.uuid,
            template_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            scheduled_for,
        };
        instance.pending.record(&mut instance.version, event);
        Ok(instance)
    }

    fn ensure_live(&self, action: &str) -> Result<()> {
        if self.deleted {
            return Err(CadenceError::invalid_transition("task template", "Deleted", action));
        }
        Ok(())
    }
}

// =============================================================================
// Task Instance
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskInstanceStatus {
    Pending,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub uuid: Uuid,
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskInstanceStatus,
    pub goal_binding: Option<GoalBinding>,
    pub finished_at: Option<DateTime<Utc>>,
    pub version: u64,
    #[serde(skip)]
    pending: PendingEvents,
}

impl_aggregate_root!(TaskInstance, "task_instance");

impl TaskInstance {
    /// Complete a pending instance. The event carries the goal binding.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("complete")?;
        self.status = TaskInstanceStatus::Completed;
        self.finished_at = Some(at);
        let event = TaskInstanceCompleted {
            instance_uuid: self.uuid,
            template_uuid: self.template_uuid,
            account_uuid: self.account_uuid.clone(),
            goal_binding: self.goal_binding,
            completed_at: at,
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    pub fn skip(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("skip")?;
        self.status = TaskInstanceStatus::Skipped;
        self.finished_at = Some(at);
        let event = TaskInstanceSkipped {
            instance_uuid: self.uuid,
            template_uuid: self.template_uuid,
            account_uuid: self.account_uuid.clone(),
            skipped_at: at,
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    /// Refresh the binding from the template before completion.
    pub fn rebind(&mut self, goal_binding: Option<GoalBinding>) {
        if self.status == TaskInstanceStatus::Pending {
            self.goal_binding = goal_binding;
        }
    }

    fn ensure_pending(&self, action: &str) -> Result<()> {
        if self.status != TaskInstanceStatus::Pending {
            return Err(CadenceError::invalid_transition("task instance", self.status, action));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::events::{AggregateRoot, EventKind};

    fn binding() -> GoalBinding {
        GoalBinding {
            goal_uuid: Uuid::new_v4(),
            key_result_uuid: Uuid::new_v4(),
            increment_value: 5.0,
        }
    }

    #[test]
    fn test_update_is_noop_when_unchanged() {
        let b = binding();
        let mut template = TaskTemplate::create(AccountUuid::new("acct"), "Run", Some(b)).unwrap();
        template.take_pending_events();

        assert!(!template.update("Run", Some(b)).unwrap());
        assert!(template.pending_events().is_empty());

        assert!(template.update("Run 5k", None).unwrap());
        let updated = template.pending_events()[0]
            .payload::<TaskTemplateUpdated>()
            .unwrap()
            .clone();
        assert_eq!(updated.old_title, "Run");
        assert_eq!(updated.new_title, "Run 5k");
        assert_eq!(updated.old_goal_binding, Some(b));
        assert_eq!(updated.new_goal_binding, None);
    }

    #[test]
    fn test_invalid_binding_rejected() {
        let mut b = binding();
        b.increment_value = -1.0;
        let err = TaskTemplate::create(AccountUuid::new("acct"), "Run", Some(b)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_generate_and_complete_instance() {
        let b = binding();
        let template = TaskTemplate::create(AccountUuid::new("acct"), "Run", Some(b)).unwrap();
        let mut instance = template.generate_instance(Utc::now()).unwrap();
        assert_eq!(instance.pending_events()[0].kind(), EventKind::TaskInstanceCreated);
        instance.take_pending_events();

        instance.complete(Utc::now()).unwrap();
        let completed = instance.pending_events()[0]
            .payload::<TaskInstanceCompleted>()
            .unwrap()
            .clone();
        assert_eq!(completed.goal_binding, Some(b));
        assert_eq!(completed.template_uuid, template.uuid);

        let err = instance.complete(Utc::now()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert!(instance.skip(Utc::now()).is_err());
        assert_eq!(instance.pending_events().len(), 1);
    }

    #[test]
    fn test_deleted_template_rejects_changes() {
        let mut template = TaskTemplate::create(AccountUuid::new("acct"), "Run", None).unwrap();
        template.mark_deleted().unwrap();
        assert!(template.update("Walk", None).is_err());
        assert!(template.generate_instance(Utc::now()).is_err());
        assert!(template.mark_deleted().is_err());
    }
}
