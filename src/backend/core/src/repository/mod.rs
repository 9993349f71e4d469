//! Persistence boundary for aggregates.
//!
//! Repositories store aggregate state only. Pending events never reach storage;
//! the unit of work moves them to the event sink after a successful save.

pub mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::AccountUuid;
use crate::error::{CadenceError, Result};
use crate::events::AggregateRoot;

/// Aggregate storage.
#[async_trait]
pub trait Repository<A: AggregateRoot>: Send + Sync {
    /// Insert or update. Fails with `RepositoryWriteFailed` when the write is not committed.
    async fn save(&self, aggregate: &A) -> Result<()>;

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<A>>;

    /// Remove. Fails with `RecordNotFound` if absent.
    async fn delete(&self, uuid: Uuid) -> Result<()>;

    async fn list_by_account(&self, account_uuid: &AccountUuid) -> Result<Vec<A>>;

    async fn list_all(&self) -> Result<Vec<A>>;

    /// Load or fail with `RecordNotFound`.
    async fn get(&self, uuid: Uuid) -> Result<A> {
        self.find_by_uuid(uuid)
            .await?
            .ok_or_else(|| CadenceError::not_found(A::ENTITY_TYPE, uuid.to_string()))
    }
}
