//! Notification module application service.

use std::sync::Arc;
use tracing::debug;

use crate::domain::{AccountUuid, Notification};
use crate::error::Result;
use crate::events::{EventEnvelope, EventSink};
use crate::repository::Repository;

use super::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn Repository<Notification>>,
    sink: Arc<dyn EventSink>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn Repository<Notification>>, sink: Arc<dyn EventSink>) -> Self {
        Self { notifications, sink }
    }

    pub async fn list_notifications(&self, account_uuid: &AccountUuid) -> Result<Vec<Notification>> {
        self.notifications.list_by_account(account_uuid).await
    }

    /// Create a notification for `source`. Returns `None` if one already exists for that event.
    pub async fn notify(
        &self,
        account_uuid: AccountUuid,
        title: &str,
        body: &str,
        source: &EventEnvelope,
    ) -> Result<Option<Notification>> {
        let source_event_id = source.id();
        let existing = self.notifications.list_by_account(&account_uuid).await?;
        if existing.iter().any(|n| n.source_event_id == source_event_id) {
            debug!(source_event_id = %source_event_id, "Notification already exists for event");
            return Ok(None);
        }

        let mut notification = Notification::create(account_uuid, title, body, source_event_id)?;
        let mut uow = UnitOfWork::begin(self.sink.clone()).caused_by(source);
        uow.save(self.notifications.as_ref(), &mut notification).await?;
        uow.commit().await?;
        Ok(Some(notification))
    }
}
