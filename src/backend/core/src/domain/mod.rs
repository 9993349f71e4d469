//! Domain aggregates for the goal, task, reminder, schedule and notification modules.
//!
//! Aggregates validate, change state, and record the matching event into their
//! pending buffer. A failed operation leaves both state and buffer untouched.

/// Implements `AggregateRoot` for a struct with `uuid`, `account_uuid`,
/// `version` and `pending` fields.
macro_rules! impl_aggregate_root {
    ($ty:ty, $entity:literal) => {
        impl $crate::events::AggregateRoot for $ty {
            const ENTITY_TYPE: &'static str = $entity;

            fn uuid(&self) -> uuid::Uuid {
                self.uuid
            }

            fn account_uuid(&self) -> &$crate::domain::AccountUuid {
                &self.account_uuid
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn pending(&self) -> &$crate::events::PendingEvents {
                &self.pending
            }

            fn pending_mut(&mut self) -> &mut $crate::events::PendingEvents {
                &mut self.pending
            }
        }
    };
}

pub(crate) use impl_aggregate_root;

pub mod goal;
pub mod notification;
pub mod reminder;
pub mod schedule;
pub mod task;
pub mod values;

pub use goal::{Goal, KeyResult, ProgressRecord};
pub use notification::Notification;
pub use reminder::ReminderTemplate;
pub use schedule::{ScheduleTask, ScheduleTaskStatus};
pub use task::{TaskInstance, TaskInstanceStatus, TaskTemplate};
pub use values::*;

pub(crate) fn require_text(field: &str, value: &str) -> crate::error::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::error::CadenceError::invalid_field(
            field,
            format!("{} must not be empty", field),
        ));
    }
    Ok(trimmed.to_string())
}
