//! Payload structs for every registered event kind.
//!
//! Payloads are plain data, camelCase on the wire, and always carry the owning
//! `accountUuid` plus the identifiers a consumer in another module needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AccountUuid, GoalBinding, GoalStatus, Importance, KeyResultSnapshot, ReminderTrigger,
    ScheduleSource,
};

use super::event::EventId;

// =============================================================================
// Goal Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCreated {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub importance: Importance,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub key_results: Vec<KeyResultSnapshot>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalScheduleTimeChanged {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub old_start_time: DateTime<Utc>,
    pub new_start_time: DateTime<Utc>,
    pub old_end_time: DateTime<Utc>,
    pub new_end_time: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCompleted {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalArchived {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub previous_status: GoalStatus,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDeleted {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub previous_status: GoalStatus,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResultAdded {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub key_result: KeyResultSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResultProgressed {
    pub goal_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub key_result_uuid: Uuid,
    pub old_value: f64,
    pub new_value: f64,
    pub target_value: f64,
    /// The event whose handling produced this progress (de-duplication key).
    pub source_event_id: EventId,
}

impl KeyResultProgressed {
    /// True when this progress moved the key result across its target.
    pub fn crossed_target(&self) -> bool {
        self.old_value < self.target_value && self.new_value >= self.target_value
    }

    /// True when this progress moved the key result back below its target.
    pub fn dropped_below_target(&self) -> bool {
        self.old_value >= self.target_value && self.new_value < self.target_value
    }
}

// =============================================================================
// Task Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateCreated {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_binding: Option<GoalBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateUpdated {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub old_title: String,
    pub new_title: String,
    #[serde(default)]
    pub old_goal_binding: Option<GoalBinding>,
    #[serde(default)]
    pub new_goal_binding: Option<GoalBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateDeleted {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstanceCreated {
    pub instance_uuid: Uuid,
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstanceCompleted {
    pub instance_uuid: Uuid,
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_binding: Option<GoalBinding>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstanceSkipped {
    pub instance_uuid: Uuid,
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub skipped_at: DateTime<Utc>,
}

// =============================================================================
// Reminder Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTemplateCreated {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub trigger: ReminderTrigger,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTriggerChanged {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub old_trigger: ReminderTrigger,
    pub new_trigger: ReminderTrigger,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderToggled {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub enabled: bool,
    pub trigger: ReminderTrigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTemplateDeleted {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTriggered {
    pub template_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub triggered_at: DateTime<Utc>,
    pub schedule_task_uuid: Uuid,
}

// =============================================================================
// Schedule Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskCreated {
    pub schedule_task_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub source: ScheduleSource,
    pub run_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskRescheduled {
    pub schedule_task_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub source: ScheduleSource,
    pub old_run_at: DateTime<Utc>,
    pub new_run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskCancelled {
    pub schedule_task_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub source: ScheduleSource,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskFired {
    pub schedule_task_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub source: ScheduleSource,
    pub fired_at: DateTime<Utc>,
    /// Next run for recurring tasks; `None` when the task is finished.
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Notification Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreated {
    pub notification_uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub body: String,
    pub source_event_id: EventId,
}
