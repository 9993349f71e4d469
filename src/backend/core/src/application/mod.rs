//! Application layer: use cases, the unit of work, and process wiring.
//!
//! Every use case follows the same shape: load the aggregate, call a domain
//! method, save through a [`UnitOfWork`], and commit. Events leave the process
//! only after the save succeeded.

pub mod goal_service;
pub mod notification_service;
pub mod reminder_service;
pub mod runtime;
pub mod schedule_service;
pub mod task_service;
pub mod unit_of_work;

pub use goal_service::GoalService;
pub use notification_service::NotificationService;
pub use reminder_service::ReminderService;
pub use runtime::{Repositories, Services, SyncRuntime};
pub use schedule_service::ScheduleService;
pub use task_service::TaskService;
pub use unit_of_work::{DeliveryMode, UnitOfWork};
