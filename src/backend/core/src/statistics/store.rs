//! Process-local statistics store, one accumulator per account.

use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::AccountUuid;
use crate::events::EventEnvelope;
use crate::telemetry::metrics::StatisticsMetrics;

use super::goal::{FoldOutcome, GoalStatistics};

#[derive(Debug, Clone)]
pub struct StatisticsStore {
    accounts: Arc<DashMap<AccountUuid, GoalStatistics>>,
    dedupe_window: usize,
}

impl StatisticsStore {
    pub fn new(dedupe_window: usize) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            dedupe_window,
        }
    }

    /// Fold `envelope` into its account's accumulator, creating it on first use.
    pub fn apply(&self, envelope: &EventEnvelope) -> FoldOutcome {
        let mut entry = self
            .accounts
            .entry(envelope.account_uuid().clone())
            .or_insert_with(|| GoalStatistics::with_dedupe_window(envelope.account_uuid().clone(), self.dedupe_window));
        let outcome = entry.fold(envelope);
        if let Some(reason) = outcome.skip_reason() {
            StatisticsMetrics::event_skipped(reason);
        }
        outcome
    }

    /// Snapshot of the account's statistics (zero-valued if never seen).
    pub fn get(&self, account_uuid: &AccountUuid) -> GoalStatistics {
        self.accounts
            .get(account_uuid)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| GoalStatistics::with_dedupe_window(account_uuid.clone(), self.dedupe_window))
    }

    pub fn accounts(&self) -> Vec<AccountUuid> {
        self.accounts.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Replace an account's accumulator, e.g. with a recompute.
    pub fn replace(&self, stats: GoalStatistics) {
        self.accounts.insert(stats.account_uuid.clone(), stats);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
