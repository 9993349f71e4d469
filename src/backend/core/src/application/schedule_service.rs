//! Schedule module application service.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{AccountUuid, ScheduleSource, ScheduleTask};
use crate::error::{CadenceError, Result};
use crate::events::{EventEnvelope, EventSink};
use crate::repository::Repository;

use super::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct ScheduleService {
    tasks: Arc<dyn Repository<ScheduleTask>>,
    sink: Arc<dyn EventSink>,
}

impl ScheduleService {
    pub fn new(tasks: Arc<dyn Repository<ScheduleTask>>, sink: Arc<dyn EventSink>) -> Self {
        Self { tasks, sink }
    }

    pub async fn get_task(&self, task_uuid: Uuid) -> Result<ScheduleTask> {
        self.tasks
            .find_by_uuid(task_uuid)
            .await?
            .ok_or_else(|| CadenceError::schedule_task_not_found(task_uuid))
    }

    pub async fn list_tasks(&self, account_uuid: &AccountUuid) -> Result<Vec<ScheduleTask>> {
        self.tasks.list_by_account(account_uuid).await
    }

    /// Every task, in any status, scheduled on behalf of `source`.
    pub async fn tasks_for(&self, account_uuid: &AccountUuid, source: ScheduleSource) -> Result<Vec<ScheduleTask>> {
        Ok(self
            .tasks
            .list_by_account(account_uuid)
            .await?
            .into_iter()
            .filter(|task| task.source == source)
            .collect())
    }

    /// The pending task scheduled on behalf of `source`, if any.
    pub async fn find_pending_for(
        &self,
        account_uuid: &AccountUuid,
        source: ScheduleSource,
    ) -> Result<Option<ScheduleTask>> {
        Ok(self
            .tasks_for(account_uuid, source)
            .await?
            .into_iter()
            .find(ScheduleTask::is_pending))
    }

    pub async fn create_task(
        &self,
        account_uuid: AccountUuid,
        source: ScheduleSource,
        run_at: DateTime<Utc>,
        every_minutes: Option<u32>,
        cause: Option<&EventEnvelope>,
    ) -> Result<ScheduleTask> {
        let mut task = ScheduleTask::create(account_uuid, source, run_at, every_minutes)?;
        self.persist(&mut task, cause).await?;
        info!(schedule_task_uuid = %task.uuid, source = %source, run_at = %run_at, "Schedule task created");
        Ok(task)
    }

    pub async fn reschedule(
        &self,
        task_uuid: Uuid,
        run_at: DateTime<Utc>,
        cause: Option<&EventEnvelope>,
    ) -> Result<bool> {
        let mut task = self.get_task(task_uuid).await?;
        if !task.reschedule(run_at)? {
            return Ok(false);
        }
        self.persist(&mut task, cause).await?;
        Ok(true)
    }

    pub async fn cancel(&self, task_uuid: Uuid, reason: &str, cause: Option<&EventEnvelope>) -> Result<bool> {
        let mut task = self.get_task(task_uuid).await?;
        if !task.cancel(reason)? {
            return Ok(false);
        }
        self.persist(&mut task, cause).await?;
        Ok(true)
    }

    /// Fire every task due at `now`, each in its own unit of work.
    ///
    /// A task that fails to fire is logged and skipped; the rest still run.
    #[instrument(skip(self))]
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut due: Vec<ScheduleTask> = self
            .tasks
            .list_all()
            .await?
            .into_iter()
            .filter(|task| task.is_due(now))
            .collect();
        due.sort_by_key(|task| task.run_at);

        let mut fired = 0;
        for mut task in due {
            let task_uuid = task.uuid;
            let outcome = match task.fire(now) {
                Ok(()) => self.persist(&mut task, None).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => fired += 1,
                Err(err) => warn!(schedule_task_uuid = %task_uuid, error = %err, "Failed to fire schedule task"),
            }
        }
        Ok(fired)
    }

    async fn persist(&self, task: &mut ScheduleTask, cause: Option<&EventEnvelope>) -> Result<()> {
        let mut uow = UnitOfWork::begin(self.sink.clone());
        if let Some(cause) = cause {
            uow = uow.caused_by(cause);
        }
        uow.save(self.tasks.as_ref(), task).await?;
        uow.commit().await?;
        Ok(())
    }
}
