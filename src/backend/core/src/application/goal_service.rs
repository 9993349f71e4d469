//! Goal module application service.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{AccountUuid, Goal, Importance};
use crate::error::{CadenceError, Result};
use crate::events::{EventEnvelope, EventSink};
use crate::repository::Repository;

use super::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct GoalService {
    goals: Arc<dyn Repository<Goal>>,
    sink: Arc<dyn EventSink>,
}

impl GoalService {
    pub fn new(goals: Arc<dyn Repository<Goal>>, sink: Arc<dyn EventSink>) -> Self {
        Self { goals, sink }
    }

    pub fn repository(&self) -> &Arc<dyn Repository<Goal>> {
        &self.goals
    }

    #[instrument(skip(self, title))]
    pub async fn create_goal(
        &self,
        account_uuid: AccountUuid,
        title: &str,
        importance: Importance,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Goal> {
        let mut goal = Goal::create(account_uuid, title, importance, start_time, end_time)?;
        self.persist(&mut goal, None).await?;
        info!(goal_uuid = %goal.uuid, "Goal created");
        Ok(goal)
    }

    /// Current state of a goal, `None` once it has been removed.
    pub async fn find_goal(&self, goal_uuid: Uuid) -> Result<Option<Goal>> {
        self.goals.find_by_uuid(goal_uuid).await
    }

    pub async fn get_goal(&self, goal_uuid: Uuid) -> Result<Goal> {
        self.find_goal(goal_uuid)
            .await?
            .ok_or_else(|| CadenceError::goal_not_found(goal_uuid))
    }

    pub async fn list_goals(&self, account_uuid: &AccountUuid) -> Result<Vec<Goal>> {
        self.goals.list_by_account(account_uuid).await
    }

    pub async fn add_key_result(
        &self,
        goal_uuid: Uuid,
        name: &str,
        target_value: f64,
        initial_value: f64,
    ) -> Result<Uuid> {
        let mut goal = self.get_goal(goal_uuid).await?;
        let key_result_uuid = goal.add_key_result(name, target_value, initial_value)?;
        self.persist(&mut goal, None).await?;
        Ok(key_result_uuid)
    }

    /// Returns `false` when the window did not change.
    pub async fn change_schedule(
        &self,
        goal_uuid: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<bool> {
        let mut goal = self.get_goal(goal_uuid).await?;
        if !goal.change_schedule(start_time, end_time)? {
            return Ok(false);
        }
        self.persist(&mut goal, None).await?;
        Ok(true)
    }

    pub async fn complete_goal(&self, goal_uuid: Uuid) -> Result<()> {
        let mut goal = self.get_goal(goal_uuid).await?;
        goal.complete()?;
        self.persist(&mut goal, None).await
    }

    pub async fn archive_goal(&self, goal_uuid: Uuid) -> Result<()> {
        let mut goal = self.get_goal(goal_uuid).await?;
        goal.archive()?;
        self.persist(&mut goal, None).await
    }

    /// Remove the goal from storage and publish `goal.deleted`.
    pub async fn delete_goal(&self, goal_uuid: Uuid) -> Result<()> {
        let mut goal = self.get_goal(goal_uuid).await?;
        goal.mark_deleted()?;
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.delete(self.goals.as_ref(), &mut goal).await?;
        uow.commit().await?;
        info!(goal_uuid = %goal_uuid, "Goal deleted");
        Ok(())
    }

    /// Apply progress on behalf of `cause`. Returns `false` if `cause` was already applied.
    #[instrument(skip(self, cause), fields(cause = %cause.id()))]
    pub async fn apply_key_result_progress(
        &self,
        goal_uuid: Uuid,
        key_result_uuid: Uuid,
        delta: f64,
        cause: &EventEnvelope,
    ) -> Result<bool> {
        let mut goal = self.get_goal(goal_uuid).await?;
        if !goal.adjust_key_result(key_result_uuid, delta, cause.id())? {
            return Ok(false);
        }
        self.persist(&mut goal, Some(cause)).await?;
        Ok(true)
    }

    async fn persist(&self, goal: &mut Goal, cause: Option<&EventEnvelope>) -> Result<()> {
        let mut uow = UnitOfWork::begin(self.sink.clone());
        if let Some(cause) = cause {
            uow = uow.caused_by(cause);
        }
        uow.save(self.goals.as_ref(), goal).await?;
        uow.commit().await?;
        Ok(())
    }
}
