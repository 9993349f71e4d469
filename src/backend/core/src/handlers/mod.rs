//! Cross-module event handlers.
//!
//! Each handler belongs to the consuming module and reacts to events owned by
//! another module. Handlers only ever see the published envelope, never the
//! producer's aggregate. Follow-up events they cause carry the triggering
//! event as their causation.

pub mod goal_progress;
pub mod notification;
pub mod reminder_firing;
pub mod schedule_sync;
pub mod statistics;

pub use goal_progress::GoalProgressHandler;
pub use notification::NotificationHandler;
pub use reminder_firing::ReminderFiringHandler;
pub use schedule_sync::ScheduleSyncHandler;
pub use statistics::GoalStatisticsProjector;
