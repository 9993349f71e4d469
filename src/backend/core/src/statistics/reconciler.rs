//! Periodic full recompute of statistics from the goal store.
//!
//! Corrects drift left by events lost between commit and publish.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{AccountUuid, Goal};
use crate::error::Result;
use crate::repository::Repository;
use crate::telemetry::metrics::{OperationTimer, StatisticsMetrics};
use crate::worker::PeriodicTask;

use super::goal::GoalStatistics;
use super::store::StatisticsStore;

pub struct StatisticsReconciler {
    goals: Arc<dyn Repository<Goal>>,
    store: StatisticsStore,
}

impl StatisticsReconciler {
    pub fn new(goals: Arc<dyn Repository<Goal>>, store: StatisticsStore) -> Self {
        Self { goals, store }
    }

    /// Recompute every known account. Returns the number of accounts whose
    /// counters changed.
    pub async fn reconcile(&self) -> Result<usize> {
        let timer = OperationTimer::start("statistics_reconcile");
        let mut by_account: BTreeMap<AccountUuid, Vec<Goal>> = BTreeMap::new();
        for goal in self.goals.list_all().await? {
            by_account.entry(goal.account_uuid.clone()).or_default().push(goal);
        }

        let accounts: BTreeSet<AccountUuid> = by_account
            .keys()
            .cloned()
            .chain(self.store.accounts())
            .collect();

        let mut drifted = 0;
        for account in accounts {
            let goals = by_account.remove(&account).unwrap_or_default();
            let current = self.store.get(&account);
            let recomputed = GoalStatistics::recompute(account.clone(), &goals, Some(&current));
            if !same_counters(&current, &recomputed) {
                info!(
                    account_uuid = %account,
                    before = current.total_goals,
                    after = recomputed.total_goals,
                    "Statistics drift corrected"
                );
                drifted += 1;
            }
            self.store.replace(recomputed);
        }

        StatisticsMetrics::reconciled(drifted);
        debug!(drifted, elapsed_ms = timer.finish().as_millis() as u64, "Statistics reconciled");
        Ok(drifted)
    }
}

fn same_counters(a: &GoalStatistics, b: &GoalStatistics) -> bool {
    a.total_goals == b.total_goals
        && a.active_goals == b.active_goals
        && a.completed_goals == b.completed_goals
        && a.archived_goals == b.archived_goals
        && a.goals_by_importance == b.goals_by_importance
        && a.total_key_results == b.total_key_results
        && a.completed_key_results == b.completed_key_results
}

#[async_trait]
impl PeriodicTask for StatisticsReconciler {
    fn name(&self) -> &str {
        "statistics-reconciler"
    }

    async fn tick(&mut self) -> Result<()> {
        self.reconcile().await.map(|_| ())
    }
}
