//! In-memory repository backed by `DashMap`.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::domain::AccountUuid;
use crate::error::{CadenceError, ErrorCode, Result};
use crate::events::AggregateRoot;

use super::Repository;

/// Process-local aggregate store.
///
/// Saves use optimistic concurrency: the stored version must equal the version the
/// aggregate was loaded at (its current version minus its pending events).
#[derive(Debug)]
pub struct InMemoryRepository<A> {
    entries: DashMap<Uuid, A>,
    fail_next_save: AtomicBool,
}

impl<A: AggregateRoot> Default for InMemoryRepository<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AggregateRoot> InMemoryRepository<A> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            fail_next_save: AtomicBool::new(false),
        }
    }

    /// Make the next `save` report a failed write.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<A: AggregateRoot> Repository<A> for InMemoryRepository<A> {
    async fn save(&self, aggregate: &A) -> Result<()> {
        let uuid = aggregate.uuid();
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(CadenceError::write_failed(A::ENTITY_TYPE, uuid, "simulated write failure"));
        }

        let loaded_version = aggregate.version() - aggregate.pending_events().len() as u64;
        let mut stored = aggregate.clone();
        stored.pending_mut().clear();

        match self.entries.entry(uuid) {
            Entry::Occupied(mut existing) => {
                if loaded_version == 0 {
                    return Err(CadenceError::new(
                        ErrorCode::DuplicateRecord,
                        format!("{} already exists: {}", A::ENTITY_TYPE, uuid),
                    ));
                }
                if existing.get().version() != loaded_version {
                    return Err(CadenceError::write_failed(
                        A::ENTITY_TYPE,
                        uuid,
                        format!(
                            "version conflict: stored {}, loaded {}",
                            existing.get().version(),
                            loaded_version
                        ),
                    ));
                }
                existing.insert(stored);
            }
            Entry::Vacant(slot) => {
                if loaded_version != 0 {
                    return Err(CadenceError::write_failed(
                        A::ENTITY_TYPE,
                        uuid,
                        "record was removed concurrently",
                    ));
                }
                slot.insert(stored);
            }
        }
        Ok(())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<A>> {
        Ok(self.entries.get(&uuid).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, uuid: Uuid) -> Result<()> {
        self.entries
            .remove(&uuid)
            .map(|_| ())
            .ok_or_else(|| CadenceError::not_found(A::ENTITY_TYPE, uuid.to_string()))
    }

    async fn list_by_account(&self, account_uuid: &AccountUuid) -> Result<Vec<A>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.value().account_uuid() == account_uuid)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<A>> {
        Ok(self.entries.iter().map(|entry| entry.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Goal, Importance};
    use chrono::{Duration, Utc};

    fn goal(account: &str) -> Goal {
        let start = Utc::now();
        Goal::create(AccountUuid::new(account), "Goal", Importance::Medium, start, start + Duration::days(1)).unwrap()
    }

    #[tokio::test]
    async fn test_save_strips_pending_events() {
        let repo = InMemoryRepository::<Goal>::new();
        let goal = goal("a");
        repo.save(&goal).await.unwrap();

        let stored = repo.get(goal.uuid).await.unwrap();
        assert!(stored.pending_events().is_empty());
        assert_eq!(stored.version(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_save() {
        let repo = InMemoryRepository::<Goal>::new();
        repo.fail_next_save();

        let goal = goal("a");
        let err = repo.save(&goal).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RepositoryWriteFailed);
        assert!(repo.is_empty());

        repo.save(&goal).await.unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let repo = InMemoryRepository::<Goal>::new();
        let mut goal = goal("a");
        repo.save(&goal).await.unwrap();
        goal.take_pending_events();

        let mut first = repo.get(goal.uuid).await.unwrap();
        let mut second = repo.get(goal.uuid).await.unwrap();
        first.complete().unwrap();
        second.archive().unwrap();

        repo.save(&first).await.unwrap();
        let err = repo.save(&second).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RepositoryWriteFailed);
    }

    #[tokio::test]
    async fn test_list_by_account_and_delete() {
        let repo = InMemoryRepository::<Goal>::new();
        let a = goal("a");
        repo.save(&a).await.unwrap();
        repo.save(&goal("a")).await.unwrap();
        repo.save(&goal("b")).await.unwrap();

        assert_eq!(repo.list_by_account(&AccountUuid::new("a")).await.unwrap().len(), 2);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);

        repo.delete(a.uuid).await.unwrap();
        let err = repo.delete(a.uuid).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
    }
}
