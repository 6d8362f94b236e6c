//! `pronos checkpoint`: status counts and failed-target review.

use std::collections::BTreeMap;

use pronos_core::CollectionConfig;
use pronos_store::{CheckpointEntry, CheckpointStatus, CheckpointStore};

/// # Errors
///
/// Returns an error if the checkpoint file exists but cannot be read.
pub(crate) fn run_checkpoint(config: &CollectionConfig, failed: bool) -> anyhow::Result<()> {
    let store = CheckpointStore::open(&config.checkpoint_path)?;
    let counts = status_counts(store.entries());
    let total: usize = counts.values().sum();

    println!("checkpoint: {}", store.path().display());
    println!("{total} targets recorded");
    for (status, count) in &counts {
        println!("  {status:<17}{count}");
    }

    if failed {
        let failures = store.failed_targets();
        if failures.is_empty() {
            println!("no failed_permanent targets");
            return Ok(());
        }
        println!();
        for entry in failures {
            print_failure(entry);
        }
        println!();
        println!("re-admit with: pronos collect <profile> --retry-failed");
    }
    Ok(())
}

fn status_counts<'a>(
    entries: impl Iterator<Item = &'a CheckpointEntry>,
) -> BTreeMap<CheckpointStatus, usize> {
    let mut counts: BTreeMap<CheckpointStatus, usize> =
        CheckpointStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for entry in entries {
        *counts.entry(entry.status).or_insert(0) += 1;
    }
    counts
}

fn print_failure(entry: &CheckpointEntry) {
    let kind = entry
        .failure_kind
        .map_or_else(|| "unknown".to_string(), |k| k.to_string());
    let last = entry
        .last_attempt_at
        .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
    println!(
        "{}  [{kind}] attempts={} last={last}",
        entry.target, entry.attempts
    );
    if let Some(error) = &entry.error_summary {
        println!("    error: {error}");
    }
    if let Some(kind) = entry.failure_kind {
        println!("    hint: {}", kind.operator_hint());
    }
}
