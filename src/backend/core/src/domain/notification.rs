//! Notification aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::events::payloads::NotificationCreated;
use crate::events::{EventId, PendingEvents};

use super::{impl_aggregate_root, require_text, AccountUuid};

/// A user-facing notification created in response to another module's event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub uuid: Uuid,
    pub account_uuid: AccountUuid,
    pub title: String,
    pub body: String,
    /// The event this notification was created for
    pub source_event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub version: u64,
    #[serde(skip)]
    pending: PendingEvents,
}

impl_aggregate_root!(Notification, "notification");

impl Notification {
    pub fn create(account_uuid: AccountUuid, title: &str, body: &str, source_event_id: EventId) -> Result<Self> {
        let title = require_text("title", title)?;

        let mut notification = Self {
            uuid: Uuid::new_v4(),
            account_uuid,
            title,
            body: body.to_string(),
            source_event_id,
            created_at: Utc::now(),
            version: 0,
            pending: PendingEvents::new(),
        };
        let event = NotificationCreated {
            notification_uuid: notification.uuid,
            account_uuid: notification.account_uuid.clone(),
            title: notification.title.clone(),
            body: notification.body.clone(),
            source_event_id,
        };
        notification.pending.record(&mut notification.version, event);
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AggregateRoot, EventKind};

    #[test]
    fn test_create() {
        let source = EventId::new();
        let notification = Notification::create(AccountUuid::new("acct"), "Stretch", "Time to move", source).unwrap();
        assert_eq!(notification.source_event_id, source);
        assert_eq!(notification.pending_events()[0].kind(), EventKind::NotificationCreated);
        assert!(Notification::create(AccountUuid::new("acct"), " ", "", source).is_err());
    }
}
