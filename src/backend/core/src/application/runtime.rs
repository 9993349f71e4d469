//! Process wiring.
//!
//! Everything is constructed once in [`SyncRuntime::build`] and handed down by
//! reference: repositories, dispatcher, statistics store, services, and the
//! handler registrations. There is no ambient global state, so every test can
//! build an isolated runtime.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::Config;
use crate::domain::{Goal, Notification, ReminderTemplate, ScheduleTask, TaskInstance, TaskTemplate};
use crate::error::Result;
use crate::events::{
    DispatcherOptions, EventDispatcher, EventHandler, EventKind, EventSink, InMemoryOutbox, Outbox,
    OutboxRelay,
};
use crate::handlers::{
    GoalProgressHandler, GoalStatisticsProjector, NotificationHandler, ReminderFiringHandler,
    ScheduleSyncHandler,
};
use crate::repository::InMemoryRepository;
use crate::statistics::{StatisticsReconciler, StatisticsStore};
use crate::telemetry::metrics::DispatchMetrics;
use crate::worker::{spawn_periodic, PeriodicTask, WorkerHandle};

use super::{
    DeliveryMode, GoalService, NotificationService, ReminderService, ScheduleService, TaskService,
};

// =============================================================================
// Repositories
// =============================================================================

/// The in-memory stores backing every module.
#[derive(Clone, Default)]
pub struct Repositories {
    pub goals: Arc<InMemoryRepository<Goal>>,
    pub task_templates: Arc<InMemoryRepository<TaskTemplate>>,
    pub task_instances: Arc<InMemoryRepository<TaskInstance>>,
    pub reminders: Arc<InMemoryRepository<ReminderTemplate>>,
    pub schedule_tasks: Arc<InMemoryRepository<ScheduleTask>>,
    pub notifications: Arc<InMemoryRepository<Notification>>,
}

/// One service per module, all publishing to the same sink.
#[derive(Clone)]
pub struct Services {
    pub goals: GoalService,
    pub tasks: TaskService,
    pub reminders: ReminderService,
    pub schedules: ScheduleService,
    pub notifications: NotificationService,
}

impl Services {
    fn new(repos: &Repositories, sink: Arc<dyn EventSink>) -> Self {
        Self {
            goals: GoalService::new(repos.goals.clone(), sink.clone()),
            tasks: TaskService::new(repos.task_templates.clone(), repos.task_instances.clone(), sink.clone()),
            reminders: ReminderService::new(repos.reminders.clone(), sink.clone()),
            schedules: ScheduleService::new(repos.schedule_tasks.clone(), sink.clone()),
            notifications: NotificationService::new(repos.notifications.clone(), sink),
        }
    }
}

// =============================================================================
// Schedule Ticker
// =============================================================================

/// Fires due schedule tasks on every tick.
struct ScheduleTicker {
    schedules: ScheduleService,
}

#[async_trait]
impl PeriodicTask for ScheduleTicker {
    fn name(&self) -> &str {
        "schedule-ticker"
    }

    async fn tick(&mut self) -> Result<()> {
        self.schedules.run_due(Utc::now()).await.map(|_| ())
    }
}

// =============================================================================
// Runtime
// =============================================================================

pub struct SyncRuntime {
    config: Config,
    mode: DeliveryMode,
    dispatcher: EventDispatcher,
    outbox: Arc<InMemoryOutbox>,
    repositories: Repositories,
    statistics: StatisticsStore,
    services: Services,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl SyncRuntime {
    /// Construct every component and register every cross-module handler.
    #[instrument(skip(config), fields(instance = %config.service.instance_name))]
    pub fn build(config: &Config) -> Result<Self> {
        config.validate()?;

        let dispatcher = EventDispatcher::with_options(DispatcherOptions::from(&config.dispatcher));
        let outbox = Arc::new(InMemoryOutbox::new());
        let repositories = Repositories::default();
        let statistics = StatisticsStore::new(config.statistics.dedupe_window);

        let mode = if config.outbox.enabled {
            DeliveryMode::Outbox
        } else {
            DeliveryMode::Direct
        };

        // Handlers hold a weak dispatcher handle; a strong one would form a cycle
        // through the subscription table.
        let (caller_sink, handler_sink): (Arc<dyn EventSink>, Arc<dyn EventSink>) = match mode {
            DeliveryMode::Direct => (
                Arc::new(dispatcher.clone()) as Arc<dyn EventSink>,
                Arc::new(dispatcher.downgrade()) as Arc<dyn EventSink>,
            ),
            DeliveryMode::Outbox => (
                outbox.clone() as Arc<dyn EventSink>,
                outbox.clone() as Arc<dyn EventSink>,
            ),
        };
        let services = Services::new(&repositories, caller_sink);
        let handler_services = Services::new(&repositories, handler_sink);

        register(
            &dispatcher,
            GoalProgressHandler::SUBSCRIPTIONS,
            Arc::new(GoalProgressHandler::new(handler_services.goals.clone())),
        );
        register(
            &dispatcher,
            ScheduleSyncHandler::SUBSCRIPTIONS,
            Arc::new(ScheduleSyncHandler::new(
                handler_services.schedules.clone(),
                handler_services.goals.clone(),
                handler_services.reminders.clone(),
            )),
        );
        register(
            &dispatcher,
            ReminderFiringHandler::SUBSCRIPTIONS,
            Arc::new(ReminderFiringHandler::new(handler_services.reminders.clone())),
        );
        register(
            &dispatcher,
            NotificationHandler::SUBSCRIPTIONS,
            Arc::new(NotificationHandler::new(
                handler_services.notifications.clone(),
                handler_services.goals.clone(),
            )),
        );
        register(
            &dispatcher,
            GoalStatisticsProjector::SUBSCRIPTIONS,
            Arc::new(GoalStatisticsProjector::new(statistics.clone())),
        );
        DispatchMetrics::set_subscriptions(dispatcher.subscription_count());

        info!(
            mode = ?mode,
            subscriptions = dispatcher.subscription_count(),
            "Sync runtime built"
        );

        Ok(Self {
            config: config.clone(),
            mode,
            dispatcher,
            outbox,
            repositories,
            statistics,
            services,
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn outbox(&self) -> &Arc<InMemoryOutbox> {
        &self.outbox
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn statistics(&self) -> &StatisticsStore {
        &self.statistics
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn goals(&self) -> &GoalService {
        &self.services.goals
    }

    pub fn tasks(&self) -> &TaskService {
        &self.services.tasks
    }

    pub fn reminders(&self) -> &ReminderService {
        &self.services.reminders
    }

    pub fn schedules(&self) -> &ScheduleService {
        &self.services.schedules
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.services.notifications
    }

    pub fn statistics_reconciler(&self) -> StatisticsReconciler {
        StatisticsReconciler::new(self.repositories.goals.clone(), self.statistics.clone())
    }

    pub fn outbox_relay(&self) -> OutboxRelay {
        let outbox: Arc<dyn Outbox> = self.outbox.clone();
        OutboxRelay::new(outbox, self.dispatcher.clone(), self.config.outbox.batch_size)
    }

    /// Relay everything pending in the outbox, including follow-up events
    /// appended by handlers while relaying. A no-op in direct mode.
    pub async fn flush(&self) -> Result<usize> {
        if self.mode == DeliveryMode::Direct {
            return Ok(0);
        }
        let relayed = self.outbox_relay().drain().await?;
        DispatchMetrics::set_outbox_pending(self.outbox.pending_count().await?);
        Ok(relayed)
    }

    /// Start the schedule ticker, statistics reconciler, and outbox relay.
    pub fn start_background(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }

        workers.push(spawn_periodic(
            ScheduleTicker {
                schedules: self.services.schedules.clone(),
            },
            self.config.service.schedule_tick,
        ));
        if self.config.statistics.reconcile_enabled {
            workers.push(spawn_periodic(
                self.statistics_reconciler(),
                self.config.statistics.reconcile_interval,
            ));
        }
        if self.mode == DeliveryMode::Outbox {
            workers.push(spawn_periodic(self.outbox_relay(), self.config.outbox.poll_interval));
        }
        info!(workers = workers.len(), "Background workers started");
    }

    /// Stop background workers and relay anything left in the outbox.
    pub async fn shutdown(&self) -> Result<()> {
        let workers: Vec<WorkerHandle> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            worker.stop().await;
        }
        let relayed = self.flush().await?;
        info!(relayed, "Sync runtime shut down");
        Ok(())
    }
}

fn register(dispatcher: &EventDispatcher, kinds: &[EventKind], handler: Arc<dyn EventHandler>) {
    dispatcher.subscribe_many(kinds.iter().copied(), handler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registers_every_handler() {
        let runtime = SyncRuntime::build(&Config::default()).unwrap();
        let dispatcher = runtime.dispatcher();

        assert_eq!(runtime.delivery_mode(), DeliveryMode::Direct);
        assert_eq!(dispatcher.handler_count(EventKind::TaskInstanceCompleted), 1);
        // schedule sync and statistics
        assert_eq!(dispatcher.handler_count(EventKind::GoalCreated), 2);
        // reminder firing and notification
        assert_eq!(dispatcher.handler_count(EventKind::ScheduleTaskFired), 2);
        assert_eq!(dispatcher.handler_count(EventKind::NotificationCreated), 0);
    }

    #[tokio::test]
    async fn test_background_workers_start_and_stop() {
        let runtime = SyncRuntime::build(&Config::default()).unwrap();
        runtime.start_background();
        runtime.start_background();
        assert_eq!(runtime.workers.lock().len(), 2);
        runtime.shutdown().await.unwrap();
        assert!(runtime.workers.lock().is_empty());
    }
}
