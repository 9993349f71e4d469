//! Replay an NDJSON event log into goal statistics.
//!
//! Each line is one serialized event envelope. Lines are folded in file order;
//! duplicates and stale status changes are reported rather than counted.

use anyhow::{bail, Context, Result};
use cadence_core::domain::AccountUuid;
use cadence_core::events::EventEnvelope;
use cadence_core::statistics::{FoldOutcome, GoalStatistics, StatisticsStore, DEFAULT_DEDUPE_WINDOW};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ReplayArgs {
    /// NDJSON file to replay, or `-` for stdin
    pub input: PathBuf,

    /// Only report this account
    #[arg(short, long)]
    pub account: Option<String>,

    /// Recently applied event ids remembered per account
    #[arg(long, default_value_t = DEFAULT_DEDUPE_WINDOW)]
    pub dedupe_window: usize,

    /// Skip lines that fail to decode instead of aborting
    #[arg(long)]
    pub skip_invalid: bool,
}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct StatisticsRow {
    #[tabled(rename = "Account")]
    account_uuid: String,
    #[tabled(rename = "Goals")]
    total_goals: u64,
    #[tabled(rename = "Active")]
    active_goals: u64,
    #[tabled(rename = "Completed")]
    completed_goals: u64,
    #[tabled(rename = "Archived")]
    archived_goals: u64,
    #[tabled(rename = "Key Results")]
    total_key_results: u64,
    #[tabled(rename = "KRs Done")]
    completed_key_results: u64,
}

impl From<&GoalStatistics> for StatisticsRow {
    fn from(stats: &GoalStatistics) -> Self {
        Self {
            account_uuid: stats.account_uuid.to_string(),
            total_goals: stats.total_goals,
            active_goals: stats.active_goals,
            completed_goals: stats.completed_goals,
            archived_goals: stats.archived_goals,
            total_key_results: stats.total_key_results,
            completed_key_results: stats.completed_key_results,
        }
    }
}

/// Counts of what each replayed line did.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaySummary {
    lines: usize,
    invalid: usize,
    applied: usize,
    ignored: usize,
    skipped: BTreeMap<&'static str, usize>,
}

impl ReplaySummary {
    fn record(&mut self, outcome: FoldOutcome) {
        match (outcome, outcome.skip_reason()) {
            (FoldOutcome::Ignored, _) => self.ignored += 1,
            (_, Some(reason)) => *self.skipped.entry(reason).or_insert(0) += 1,
            (_, None) => self.applied += 1,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayReport {
    summary: ReplaySummary,
    statistics: Vec<GoalStatistics>,
}

fn open(input: &Path) -> Result<Box<dyn BufRead>> {
    if input.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Fold every envelope from `reader` into `store`.
fn replay_into(reader: impl BufRead, store: &StatisticsStore, skip_invalid: bool) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read event log")?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        match EventEnvelope::from_json_str(&line) {
            Ok(envelope) => summary.record(store.apply(&envelope)),
            Err(e) if skip_invalid => {
                summary.invalid += 1;
                output::print_warning(&format!("line {}: {}", index + 1, e));
            }
            Err(e) => bail!("line {}: {}", index + 1, e),
        }
    }
    Ok(summary)
}

pub fn execute(args: ReplayArgs, format: OutputFormat) -> Result<()> {
    if args.dedupe_window == 0 {
        bail!("--dedupe-window must be at least 1");
    }

    let store = StatisticsStore::new(args.dedupe_window);
    let summary = replay_into(open(&args.input)?, &store, args.skip_invalid)?;

    let mut accounts = match &args.account {
        Some(account) => vec![AccountUuid::new(account.as_str())],
        None => store.accounts(),
    };
    accounts.sort();
    let statistics: Vec<GoalStatistics> = accounts.iter().map(|a| store.get(a)).collect();

    match format {
        OutputFormat::Table => {
            let rows: Vec<StatisticsRow> = statistics.iter().map(StatisticsRow::from).collect();
            output::print_list(&rows, format)?;
            output::print_header("Replay");
            output::print_detail("Lines", &summary.lines.to_string());
            output::print_detail("Applied", &summary.applied.to_string());
            output::print_detail("Ignored", &summary.ignored.to_string());
            for (reason, count) in &summary.skipped {
                output::print_detail(&format!("Skipped ({})", reason), &count.to_string());
            }
            if summary.invalid > 0 {
                output::print_detail("Invalid", &summary.invalid.to_string());
            }
            Ok(())
        }
        _ => output::print_item(&ReplayReport { summary, statistics }, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::domain::{Goal, Importance};
    use cadence_core::events::AggregateRoot;
    use chrono::{Duration, Utc};

    fn log_for(goal: &mut Goal) -> String {
        goal.take_pending_events()
            .iter()
            .map(|e| e.to_json_string().unwrap() + "\n")
            .collect()
    }

    #[test]
    fn test_replay_counts_duplicates_once() {
        let start = Utc::now();
        let mut goal = Goal::create(AccountUuid::new("acct"), "Ship", Importance::High, start, start + Duration::days(3)).unwrap();
        goal.complete().unwrap();
        let log = log_for(&mut goal);
        let doubled = format!("{log}\n{log}");

        let store = StatisticsStore::new(16);
        let summary = replay_into(doubled.as_bytes(), &store, false).unwrap();

        assert_eq!(summary.lines, 4);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.skipped.get("duplicate"), Some(&2));
        let stats = store.get(&AccountUuid::new("acct"));
        assert_eq!(stats.total_goals, 1);
        assert_eq!(stats.completed_goals, 1);
    }

    #[test]
    fn test_invalid_line_aborts_unless_skipped() {
        let input = "{\"not\": \"an envelope\"}\n";
        let store = StatisticsStore::new(16);
        assert!(replay_into(input.as_bytes(), &store, false).is_err());

        let summary = replay_into(input.as_bytes(), &store, true).unwrap();
        assert_eq!(summary.invalid, 1);
        assert!(store.is_empty());
    }
}
