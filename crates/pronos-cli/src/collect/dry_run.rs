//! `collect --dry-run`: reports the target set and its checkpoint status
//! without any network I/O.

use std::collections::BTreeMap;

use pronos_core::{CollectionConfig, DataKind, Target};
use pronos_scraper::TeamRegistry;
use pronos_store::{CheckpointStatus, CheckpointStore};

use super::targets::{build_targets, TargetPlan};
use crate::teams::{cache_path, load_cached};

/// Pending targets listed individually before the output is truncated.
const LIST_LIMIT: usize = 50;

/// # Errors
///
/// Returns an error if the registry cache or the checkpoint cannot be read.
pub(crate) fn run_dry_run(config: &CollectionConfig, kinds: &[DataKind]) -> anyhow::Result<()> {
    let registry = if let Some(registry) = load_cached(config)? {
        registry
    } else {
        println!(
            "dry-run: no team registry cache at {}; named teams are shown unresolved",
            cache_path(config).display()
        );
        TeamRegistry::new(&config.source.base_url).with_aliases(&config.team_aliases)
    };
    let checkpoint = CheckpointStore::open(&config.checkpoint_path)?;
    let plan = build_targets(config, &registry, kinds, true);
    let report = DryRunReport::new(&plan, &checkpoint);

    println!(
        "dry-run: {} targets across {} seasons",
        plan.targets.len(),
        config.seasons.len()
    );
    for (kind, count) in &report.per_kind {
        println!("  {kind}: {count}");
    }
    println!("checkpoint ({}):", checkpoint.path().display());
    for (status, count) in &report.per_status {
        println!("  {status}: {count}");
    }
    println!("pending: {}", report.pending.len());
    for target in report.pending.iter().take(LIST_LIMIT) {
        println!("  {target}");
    }
    if report.pending.len() > LIST_LIMIT {
        println!("  ... and {} more", report.pending.len() - LIST_LIMIT);
    }
    Ok(())
}

struct DryRunReport {
    per_kind: BTreeMap<DataKind, usize>,
    per_status: BTreeMap<CheckpointStatus, usize>,
    pending: Vec<Target>,
}

impl DryRunReport {
    fn new(plan: &TargetPlan, checkpoint: &CheckpointStore) -> Self {
        let mut per_kind = BTreeMap::new();
        for target in &plan.targets {
            *per_kind.entry(target.data_kind).or_insert(0) += 1;
        }
        Self {
            per_kind,
            per_status: checkpoint.summarize(&plan.targets),
            pending: checkpoint.pending_targets(&plan.targets),
        }
    }
}
