//! Task module application service.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{AccountUuid, GoalBinding, TaskInstance, TaskTemplate};
use crate::error::{CadenceError, Result};
use crate::events::EventSink;
use crate::repository::Repository;

use super::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct TaskService {
    templates: Arc<dyn Repository<TaskTemplate>>,
    instances: Arc<dyn Repository<TaskInstance>>,
    sink: Arc<dyn EventSink>,
}

impl TaskService {
    pub fn new(
        templates: Arc<dyn Repository<TaskTemplate>>,
        instances: Arc<dyn Repository<TaskInstance>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            templates,
            instances,
            sink,
        }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    #[instrument(skip(self, title))]
    pub async fn create_template(
        &self,
        account_uuid: AccountUuid,
        title: &str,
        goal_binding: Option<GoalBinding>,
    ) -> Result<TaskTemplate> {
        let mut template = TaskTemplate::create(account_uuid, title, goal_binding)?;
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.save(self.templates.as_ref(), &mut template).await?;
        uow.commit().await?;
        info!(template_uuid = %template.uuid, "Task template created");
        Ok(template)
    }

    pub async fn get_template(&self, template_uuid: Uuid) -> Result<TaskTemplate> {
        self.templates
            .find_by_uuid(template_uuid)
            .await?
            .ok_or_else(|| CadenceError::task_template_not_found(template_uuid))
    }

    /// Returns `false` when neither title nor binding changed.
    pub async fn update_template(
        &self,
        template_uuid: Uuid,
        title: &str,
        goal_binding: Option<GoalBinding>,
    ) -> Result<bool> {
        let mut template = self.get_template(template_uuid).await?;
        if !template.update(title, goal_binding)? {
            return Ok(false);
        }
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.save(self.templates.as_ref(), &mut template).await?;
        uow.commit().await?;
        Ok(true)
    }

    pub async fn delete_template(&self, template_uuid: Uuid) -> Result<()> {
        let mut template = self.get_template(template_uuid).await?;
        template.mark_deleted()?;
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.delete(self.templates.as_ref(), &mut template).await?;
        uow.commit().await?;
        info!(template_uuid = %template_uuid, "Task template deleted");
        Ok(())
    }

    // =========================================================================
    // Instances
    // =========================================================================

    pub async fn generate_instance(
        &self,
        template_uuid: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<TaskInstance> {
        let template = self.get_template(template_uuid).await?;
        let mut instance = template.generate_instance(scheduled_for)?;
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.save(self.instances.as_ref(), &mut instance).await?;
        uow.commit().await?;
        Ok(instance)
    }

    pub async fn get_instance(&self, instance_uuid: Uuid) -> Result<TaskInstance> {
        self.instances
            .find_by_uuid(instance_uuid)
            .await?
            .ok_or_else(|| CadenceError::task_instance_not_found(instance_uuid))
    }

    pub async fn list_instances(&self, account_uuid: &AccountUuid) -> Result<Vec<TaskInstance>> {
        self.instances.list_by_account(account_uuid).await
    }

    /// Complete a pending instance.
    ///
    /// The binding is refreshed from the template when the template still exists,
    /// so a binding edited after generation is the one carried by the event.
    #[instrument(skip(self))]
    pub async fn complete_instance(&self, instance_uuid: Uuid, at: DateTime<Utc>) -> Result<TaskInstance> {
        let mut instance = self.get_instance(instance_uuid).await?;
        match self.templates.find_by_uuid(instance.template_uuid).await? {
            Some(template) => instance.rebind(template.goal_binding),
            None => debug!(
                template_uuid = %instance.template_uuid,
                "Template gone; completing with the instance's own binding"
            ),
        }
        instance.complete(at)?;

        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.save(self.instances.as_ref(), &mut instance).await?;
        uow.commit().await?;
        Ok(instance)
    }

    pub async fn skip_instance(&self, instance_uuid: Uuid, at: DateTime<Utc>) -> Result<TaskInstance> {
        let mut instance = self.get_instance(instance_uuid).await?;
        instance.skip(at)?;
        let mut uow = UnitOfWork::begin(self.sink.clone());
        uow.save(self.instances.as_ref(), &mut instance).await?;
        uow.commit().await?;
        Ok(instance)
    }
}
