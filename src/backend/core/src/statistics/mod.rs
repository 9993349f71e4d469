//! Read-side statistics.
//!
//! Accumulators are folded from published goal events and periodically
//! replaced by a recompute from the goal store.

pub mod goal;
pub mod reconciler;
pub mod store;

pub use goal::{FoldOutcome, GoalStatistics, Stamp, DEFAULT_DEDUPE_WINDOW};
pub use reconciler::StatisticsReconciler;
pub use store::StatisticsStore;
