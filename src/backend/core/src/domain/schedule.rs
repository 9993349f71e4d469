//! Schedule task aggregate, owned by the schedule module.
//!
//! A schedule task is a pending future firing created on behalf of another
//! module's entity (a goal deadline or a reminder). Fixed tasks complete after
//! firing once; recurring tasks advance to their next slot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CadenceError, Result};
use crate::events::payloads::{
    ScheduleTaskCancelled, ScheduleTaskCreated, ScheduleTaskFired, ScheduleTaskRescheduled,
};
use crate::events::PendingEvents;

use super::{impl_aggregate_root, AccountUuid, ScheduleSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleTaskStatus {
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTask {
    pub uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub source: ScheduleSource,
    pub run_at: DateTime<Utc>,
    pub every_minutes: Option<u32>,
    pub status: ScheduleTaskStatus,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
    pub version: u64,
    #[serde(skip)]
    pending: PendingEvents,
}

impl_aggregate_root!(ScheduleTask, "schedule_task");

impl ScheduleTask {
    pub fn create(
        account_uuid: AccountUuid,
        source: ScheduleSource,
        run_at: DateTime<Utc>,
        every_minutes: Option<u32>,
    ) -> Result<Self> {
        if every_minutes == Some(0) {
            return Err(CadenceError::invalid_field("everyMinutes", "interval must be at least one minute"));
        }

        let mut task = Self {
            uuid: Uuid::new_v4(),
            account_uuid,
            source,
            run_at,
            every_minutes,
            status: ScheduleTaskStatus::Pending,
            last_fired_at: None,
            fire_count: 0,
            version: 0,
            pending: PendingEvents::new(),
        };
        let event = ScheduleTaskCreated {
            schedule_task_uuid: task.uuid,
            account_uuid: task.account_uuid.clone(),
            source,
            run_at,
            every_minutes,
        };
        task.pending.record(&mut task.version, event);
        Ok(task)
    }

    pub fn is_pending(&self) -> bool {
        self.status == ScheduleTaskStatus::Pending
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.run_at <= now
    }

    /// Move the next run. Returns `false` (no event) when unchanged.
    pub fn reschedule(&mut self, run_at: DateTime<Utc>) -> Result<bool> {
        self.ensure_pending("reschedule")?;
        if run_at == self.run_at {
            return Ok(false);
        }

        let event = ScheduleTaskRescheduled {
            schedule_task_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            source: self.source,
            old_run_at: self.run_at,
            new_run_at: run_at,
        };
        self.run_at = run_at;
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    /// Cancel a pending task. Returns `false` if it is already finished.
    pub fn cancel(&mut self, reason: &str) -> Result<bool> {
        if !self.is_pending() {
            return Ok(false);
        }

        self.status = ScheduleTaskStatus::Cancelled;
        let event = ScheduleTaskCancelled {
            schedule_task_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            source: self.source,
            reason: reason.to_string(),
        };
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    /// Fire the current slot. The event's `firedAt` is the slot, not `now`.
    pub fn fire(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("fire")?;
        if self.run_at > now {
            return Err(CadenceError::validation(format!(
                "Schedule task {} is not due until {}",
                self.uuid, self.run_at
            )));
        }

        let slot = self.run_at;
        let next_run_at = self.every_minutes.map(|minutes| next_slot(slot, minutes, now));
        match next_run_at {
            Some(next) => self.run_at = next,
            None => self.status = ScheduleTaskStatus::Completed,
        }
        self.last_fired_at = Some(slot);
        self.fire_count += 1;

        let event = ScheduleTaskFired {
            schedule_task_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            source: self.source,
            fired_at: slot,
            next_run_at,
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<()> {
        if !self.is_pending() {
            return Err(CadenceError::invalid_transition("schedule task", self.status, action));
        }
        Ok(())
    }
}

/// First slot `slot + k * every` strictly after `now`, with `k >= 1`.
fn next_slot(slot: DateTime<Utc>, every_minutes: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let period = Duration::minutes(i64::from(every_minutes));
    let missed = ((now - slot).num_seconds() / period.num_seconds()).max(0);
    slot + period * (missed as i32 + 1)
}
