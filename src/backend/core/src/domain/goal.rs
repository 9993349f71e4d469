//! Goal aggregate with key results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CadenceError, Result};
use crate::events::payloads::{
    GoalArchived, GoalCompleted, GoalCreated, GoalDeleted, GoalScheduleTimeChanged, KeyResultAdded,
    KeyResultProgressed,
};
use crate::events::{EventId, PendingEvents};

use super::{impl_aggregate_root, require_text, AccountUuid, GoalStatus, Importance, KeyResultSnapshot};

/// One applied progress adjustment, keyed by the event that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub source_event_id: EventId,
    pub delta: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResult {
    pub uuid: Uuid,
    pub name: String,
    pub target_value: f64,
    pub current_value: f64,
    #[serde(default)]
    pub records: Vec<ProgressRecord>,
}

impl KeyResult {
    pub fn is_completed(&self) -> bool {
        self.current_value >= self.target_value
    }

    pub fn has_applied(&self, source_event_id: EventId) -> bool {
        self.records.iter().any(|r| r.source_event_id == source_event_id)
    }

    pub fn snapshot(&self) -> KeyResultSnapshot {
        KeyResultSnapshot {
            key_result_uuid: self.uuid,
            name: self.name.clone(),
            target_value: self.target_value,
            current_value: self.current_value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub importance: Importance,
    pub status: GoalStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub key_results: Vec<KeyResult>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: u64,
    #[serde(skip)]
    pending: PendingEvents,
}

impl_aggregate_root!(Goal, "goal");

impl Goal {
    /// Create an active goal. Records `goal.created`.
    pub fn create(
        account_uuid: AccountUuid,
        title: &str,
        importance: Importance,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Self> {
        let title = require_text("title", title)?;
        validate_window(start_time, end_time)?;

        let now = Utc::now();
        let mut goal = Self {
            uuid: Uuid::new_v4(),
            account_uuid,
            title,
            importance,
            status: GoalStatus::Active,
            start_time,
            end_time,
            key_results: Vec::new(),
            created_at: now,
            completed_at: None,
            archived_at: None,
            deleted_at: None,
            version: 0,
            pending: PendingEvents::new(),
        };
        let event = GoalCreated {
            goal_uuid: goal.uuid,
            account_uuid: goal.account_uuid.clone(),
            title: goal.title.clone(),
            importance,
            start_time,
            end_time,
            key_results: Vec::new(),
            created_at: now,
        };
        goal.pending.record(&mut goal.version, event);
        Ok(goal)
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active && !self.is_deleted()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn key_result(&self, key_result_uuid: Uuid) -> Option<&KeyResult> {
        self.key_results.iter().find(|kr| kr.uuid == key_result_uuid)
    }

    /// Change the goal window. Returns `false` (no event) when unchanged.
    pub fn change_schedule(&mut self, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<bool> {
        if !self.is_active() {
            return Err(CadenceError::invalid_transition("goal", self.status, "change schedule"));
        }
        validate_window(start_time, end_time)?;
        if start_time == self.start_time && end_time == self.end_time {
            return Ok(false);
        }

        let event = GoalScheduleTimeChanged {
            goal_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            old_start_time: self.start_time,
            new_start_time: start_time,
            old_end_time: self.end_time,
            new_end_time: end_time,
            changed_at: Utc::now(),
        };
        self.start_time = start_time;
        self.end_time = end_time;
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    /// Add a key result. Returns its uuid.
    pub fn add_key_result(&mut self, name: &str, target_value: f64, initial_value: f64) -> Result<Uuid> {
        if self.is_deleted() || self.status == GoalStatus::Archived {
            return Err(CadenceError::invalid_transition("goal", self.status, "add key result"));
        }
        let name = require_text("name", name)?;
        if !target_value.is_finite() || target_value <= 0.0 {
            return Err(CadenceError::invalid_field("targetValue", "target value must be positive"));
        }
        if !initial_value.is_finite() || initial_value < 0.0 {
            return Err(CadenceError::invalid_field("initialValue", "initial value must not be negative"));
        }

        let key_result = KeyResult {
            uuid: Uuid::new_v4(),
            name,
            target_value,
            current_value: initial_value,
            records: Vec::new(),
        };
        let uuid = key_result.uuid;
        let event = KeyResultAdded {
            goal_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            key_result: key_result.snapshot(),
        };
        self.key_results.push(key_result);
        self.pending.record(&mut self.version, event);
        Ok(uuid)
    }

    /// Apply `delta` to a key result on behalf of `source_event`.
    ///
    /// Returns `false` without recording anything if `source_event` was already applied.
    pub fn adjust_key_result(&mut self, key_result_uuid: Uuid, delta: f64, source_event: EventId) -> Result<bool> {
        if self.is_deleted() {
            return Err(CadenceError::invalid_transition("goal", "Deleted", "adjust key result"));
        }
        if !delta.is_finite() {
            return Err(CadenceError::invalid_field("delta", "delta must be a finite number"));
        }
        let goal_uuid = self.uuid;
        let account_uuid = self.account_uuid.clone();
        let key_result = self
            .key_results
            .iter_mut()
            .find(|kr| kr.uuid == key_result_uuid)
            .ok_or_else(|| CadenceError::key_result_not_found(goal_uuid, key_result_uuid))?;

        if key_result.has_applied(source_event) {
            return Ok(false);
        }

        let old_value = key_result.current_value;
        let new_value = (old_value + delta).max(0.0);
        key_result.current_value = new_value;
        key_result.records.push(ProgressRecord {
            source_event_id: source_event,
            delta,
            recorded_at: Utc::now(),
        });
        let event = KeyResultProgressed {
            goal_uuid,
            account_uuid,
            key_result_uuid,
            old_value,
            new_value,
            target_value: key_result.target_value,
            source_event_id: source_event,
        };
        self.pending.record(&mut self.version, event);
        Ok(true)
    }

    /// Complete an active goal.
    pub fn complete(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(CadenceError::invalid_transition("goal", self.status, "complete"));
        }
        let now = Utc::now();
        self.status = GoalStatus::Completed;
        self.completed_at = Some(now);
        let event = GoalCompleted {
            goal_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            completed_at: now,
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    /// Archive an active or completed goal.
    pub fn archive(&mut self) -> Result<()> {
        if self.is_deleted() || self.status == GoalStatus::Archived {
            return Err(CadenceError::invalid_transition("goal", self.status, "archive"));
        }
        let now = Utc::now();
        let previous_status = self.status;
        self.status = GoalStatus::Archived;
        self.archived_at = Some(now);
        let event = GoalArchived {
            goal_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            previous_status,
            archived_at: now,
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }

    /// Mark the goal deleted. Persisting the deletion is the repository's job.
    pub fn mark_deleted(&mut self) -> Result<()> {
        if self.is_deleted() {
            return Err(CadenceError::invalid_transition("goal", "Deleted", "delete"));
        }
        let now = Utc::now();
        self.deleted_at = Some(now);
        let event = GoalDeleted {
            goal_uuid: self.uuid,
            account_uuid: self.account_uuid.clone(),
            previous_status: self.status,
            deleted_at: now,
        };
        self.pending.record(&mut self.version, event);
        Ok(())
    }
}

fn validate_window(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<()> {
    if end_time <= start_time {
        return Err(CadenceError::invalid_field("endTime", "end time must be after start time"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::events::{AggregateRoot, EventKind};
    use chrono::Duration;

    fn goal() -> Goal {
        let start = Utc::now();
        let mut goal = Goal::create(
            AccountUuid::new("acct"),
            "Read 12 books",
            Importance::High,
            start,
            start + Duration::days(90),
        )
        .unwrap();
        goal.take_pending_events();
        goal
    }

    #[test]
    fn test_create_records_event() {
        let start = Utc::now();
        let goal = Goal::create(
            AccountUuid::new("acct"),
            "  Ship it ",
            Importance::Low,
            start,
            start + Duration::days(1),
        )
        .unwrap();
        assert_eq!(goal.title, "Ship it");
        assert_eq!(goal.version(), 1);
        assert_eq!(goal.pending_events().len(), 1);
        assert_eq!(goal.pending_events()[0].kind(), EventKind::GoalCreated);
    }

    #[test]
    fn test_create_rejects_bad_window() {
        let start = Utc::now();
        let err = Goal::create(AccountUuid::new("acct"), "x", Importance::Low, start, start).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_change_schedule() {
        let mut goal = goal();
        let (start, end) = (goal.start_time, goal.end_time);

        assert!(!goal.change_schedule(start, end).unwrap());
        assert!(goal.pending_events().is_empty());

        assert!(goal.change_schedule(start, end + Duration::days(7)).unwrap());
        assert_eq!(goal.pending_events()[0].kind(), EventKind::GoalScheduleTimeChanged);

        let version = goal.version();
        let err = goal.change_schedule(end, start).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(goal.version(), version);
        assert_eq!(goal.pending_events().len(), 1);
    }

    #[test]
    fn test_adjust_key_result_is_idempotent_by_source() {
        let mut goal = goal();
        let kr = goal.add_key_result("Books", 12.0, 0.0).unwrap();
        goal.take_pending_events();

        let source = EventId::new();
        assert!(goal.adjust_key_result(kr, 1.0, source).unwrap());
        assert!(!goal.adjust_key_result(kr, 1.0, source).unwrap());
        assert_eq!(goal.key_result(kr).unwrap().current_value, 1.0);
        assert_eq!(goal.pending_events().len(), 1);

        let progressed = goal.pending_events()[0]
            .payload::<KeyResultProgressed>()
            .unwrap()
            .clone();
        assert_eq!(progressed.old_value, 0.0);
        assert_eq!(progressed.new_value, 1.0);
        assert_eq!(progressed.source_event_id, source);
    }

    #[test]
    fn test_adjust_unknown_key_result() {
        let mut goal = goal();
        let err = goal.adjust_key_result(Uuid::new_v4(), 1.0, EventId::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyResultNotFound);
        assert!(goal.pending_events().is_empty());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut goal = goal();
        goal.complete().unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);

        let err = goal.complete().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert!(goal.change_schedule(goal.start_time, goal.end_time + Duration::days(1)).is_err());

        goal.archive().unwrap();
        assert!(goal.archive().is_err());

        goal.mark_deleted().unwrap();
        assert!(goal.mark_deleted().is_err());

        let kinds: Vec<_> = goal.pending_events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::GoalCompleted, EventKind::GoalArchived, EventKind::GoalDeleted]
        );
        let versions: Vec<_> = goal.pending_events().iter().map(|e| e.version()).collect();
        assert_eq!(versions, vec![2, 3, 4]);
    }

    #[test]
    fn test_pending_events_are_not_serialized() {
        let start = Utc::now();
        let goal = Goal::create(AccountUuid::new("acct"), "x", Importance::Low, start, start + Duration::days(1)).unwrap();
        let json = serde_json::to_value(&goal).unwrap();
        assert!(json.get("pending").is_none());
        let restored: Goal = serde_json::from_value(json).unwrap();
        assert!(restored.pending_events().is_empty());
        assert_eq!(restored.version(), 1);
    }
}
