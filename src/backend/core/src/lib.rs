#![allow(clippy::result_large_err)]
//! # Cadence Core
//!
//! Event-driven synchronization between the goal, task, reminder, schedule
//! and notification modules.
//!
//! ## Architecture
//!
//! - **Events**: One declarative registry of event kinds, a common envelope, and the dispatcher
//! - **Domain**: Aggregates that record pending events on every state change
//! - **Repository**: Aggregate storage; the commit point that gates event release
//! - **Application**: Use cases, the unit of work, and process wiring
//! - **Handlers**: Cross-module reactions (key result progress, schedule sync, reminders, notifications)
//! - **Statistics**: Pure read-model folds with de-duplication and periodic reconciliation
//! - **Telemetry**: Structured logging and Prometheus metrics

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod handlers;
pub mod repository;
pub mod statistics;
pub mod telemetry;
pub mod worker;

pub use error::{CadenceError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::application::{
        DeliveryMode, GoalService, NotificationService, ReminderService, ScheduleService, SyncRuntime,
        TaskService, UnitOfWork,
    };
    pub use crate::config::Config;
    pub use crate::domain::{
        AccountUuid, Goal, GoalBinding, GoalStatus, Importance, Notification, ReminderTemplate,
        ReminderTrigger, ScheduleSource, ScheduleTask, TaskInstance, TaskTemplate,
    };
    pub use crate::error::{CadenceError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::events::{
        handler_fn, AggregateRoot, BatchReport, DomainEvent, EventDispatcher, EventEnvelope,
        EventHandler, EventId, EventKind, EventPayload, EventSink, HandlerError, HandlerResult,
        Module, Projection, PublishReport,
    };
    pub use crate::repository::{InMemoryRepository, Repository};
    pub use crate::statistics::{GoalStatistics, StatisticsStore};
}
