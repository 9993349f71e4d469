//! Value types shared between aggregates and event payloads.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CadenceError, Result};
use crate::events::Module;

/// Opaque account identifier. Every aggregate and event is owned by one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountUuid(pub String);

impl AccountUuid {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountUuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountUuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Goal values
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Importance {
    pub const ALL: [Importance; 4] = [
        Importance::Low,
        Importance::Medium,
        Importance::High,
        Importance::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "LOW",
            Importance::Medium => "MEDIUM",
            Importance::High => "HIGH",
            Importance::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Importance {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        Importance::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CadenceError::invalid_field("importance", format!("unknown importance '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    Active,
    Completed,
    Archived,
}

/// A key result as carried inside goal events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResultSnapshot {
    pub key_result_uuid: Uuid,
    pub name: String,
    pub target_value: f64,
    pub current_value: f64,
}

impl KeyResultSnapshot {
    pub fn is_completed(&self) -> bool {
        self.current_value >= self.target_value
    }
}

// =============================================================================
// Task values
// =============================================================================

/// Links a task template to a goal key result. Completing an instance of the
/// template advances the key result by `increment_value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalBinding {
    pub goal_uuid: Uuid,
    pub key_result_uuid: Uuid,
    pub increment_value: f64,
}

impl GoalBinding {
    pub fn validate(&self) -> Result<()> {
        if !self.increment_value.is_finite() || self.increment_value <= 0.0 {
            return Err(CadenceError::invalid_field(
                "goalBinding.incrementValue",
                "increment value must be a positive number",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Reminder values
// =============================================================================

/// When a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReminderTrigger {
    /// Fires once at `at`.
    Fixed { at: DateTime<Utc> },

    /// Fires every `every_minutes`, starting from `anchor`.
    #[serde(rename_all = "camelCase")]
    Interval {
        every_minutes: u32,
        anchor: DateTime<Utc>,
    },
}

impl ReminderTrigger {
    pub fn validate(&self) -> Result<()> {
        match self {
            ReminderTrigger::Fixed { .. } => Ok(()),
            ReminderTrigger::Interval { every_minutes, .. } if *every_minutes == 0 => Err(
                CadenceError::invalid_field("trigger.everyMinutes", "interval must be at least one minute"),
            ),
            ReminderTrigger::Interval { .. } => Ok(()),
        }
    }

    /// First firing strictly after `t`, if any.
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            ReminderTrigger::Fixed { at } => (at > t).then_some(at),
            ReminderTrigger::Interval { every_minutes, anchor } => {
                if every_minutes == 0 {
                    return None;
                }
                if anchor > t {
                    return Some(anchor);
                }
                let period = Duration::minutes(i64::from(every_minutes));
                let elapsed = (t - anchor).num_seconds();
                let steps = elapsed / period.num_seconds() + 1;
                Some(anchor + period * steps as i32)
            }
        }
    }

    /// Minutes between firings for recurring triggers.
    pub fn recurrence_minutes(&self) -> Option<u32> {
        match self {
            ReminderTrigger::Fixed { .. } => None,
            ReminderTrigger::Interval { every_minutes, .. } => Some(*every_minutes),
        }
    }
}

// =============================================================================
// Schedule values
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSourceKind {
    GoalDeadline,
    Reminder,
}

/// What a schedule task was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSource {
    pub kind: ScheduleSourceKind,
    pub source_uuid: Uuid,
}

impl ScheduleSource {
    pub fn goal_deadline(goal_uuid: Uuid) -> Self {
        Self {
            kind: ScheduleSourceKind::GoalDeadline,
            source_uuid: goal_uuid,
        }
    }

    pub fn reminder(template_uuid: Uuid) -> Self {
        Self {
            kind: ScheduleSourceKind::Reminder,
            source_uuid: template_uuid,
        }
    }

    /// Module that owns the source entity.
    pub fn module(&self) -> Module {
        match self.kind {
            ScheduleSourceKind::GoalDeadline => Module::Goal,
            ScheduleSourceKind::Reminder => Module::Reminder,
        }
    }
}

impl fmt::Display for ScheduleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ScheduleSourceKind::GoalDeadline => "goal_deadline",
            ScheduleSourceKind::Reminder => "reminder",
        };
        write!(f, "{}:{}", kind, self.source_uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_fixed_trigger_next_after() {
        let trigger = ReminderTrigger::Fixed { at: at(9, 0) };
        assert_eq!(trigger.next_after(at(8, 0)), Some(at(9, 0)));
        assert_eq!(trigger.next_after(at(9, 0)), None);
        assert_eq!(trigger.recurrence_minutes(), None);
    }

    #[test]
    fn test_interval_trigger_next_after() {
        let trigger = ReminderTrigger::Interval {
            every_minutes: 30,
            anchor: at(9, 0),
        };
        assert_eq!(trigger.next_after(at(8, 0)), Some(at(9, 0)));
        assert_eq!(trigger.next_after(at(9, 0)), Some(at(9, 30)));
        assert_eq!(trigger.next_after(at(9, 45)), Some(at(10, 0)));
        assert_eq!(trigger.recurrence_minutes(), Some(30));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let trigger = ReminderTrigger::Interval {
            every_minutes: 0,
            anchor: at(9, 0),
        };
        assert!(trigger.validate().is_err());
        assert_eq!(trigger.next_after(at(8, 0)), None);
    }

    #[test]
    fn test_trigger_wire_format() {
        let trigger = ReminderTrigger::Interval {
            every_minutes: 15,
            anchor: at(9, 0),
        };
        let json = serde_json::to_value(trigger).unwrap();
        assert_eq!(json["type"], "interval");
        assert_eq!(json["everyMinutes"], 15);
    }

    #[test]
    fn test_goal_binding_validation() {
        let mut binding = GoalBinding {
            goal_uuid: Uuid::new_v4(),
            key_result_uuid: Uuid::new_v4(),
            increment_value: 1.0,
        };
        assert!(binding.validate().is_ok());
        binding.increment_value = 0.0;
        assert!(binding.validate().is_err());
    }

    #[test]
    fn test_importance_parse() {
        assert_eq!("high".parse::<Importance>().unwrap(), Importance::High);
        assert!("urgent".parse::<Importance>().is_err());
    }
}
