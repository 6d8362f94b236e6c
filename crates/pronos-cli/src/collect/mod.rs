//! The `collect` command: builds the target space for a profile and runs the
//! orchestrator over it.
//!
//! Per-target failures never abort a run; they are recorded in the
//! checkpoint and summarised at the end. Only configuration, registry and
//! storage errors are fatal.

mod dry_run;
mod runner;
mod targets;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pronos_core::{CollectionConfig, DataKind, RunStats, StepName};
use pronos_scraper::{Fetcher, RateLimiter, RetryPolicy, WagesExtractor};
use pronos_store::{CheckpointStore, OutputWriter};

use crate::teams::resolve_registry;
use runner::{Orchestrator, RunOptions};

/// Flags that override the profile for one invocation.
#[derive(Debug, Clone, Default)]
pub(crate) struct CollectOptions {
    pub step: Option<StepName>,
    pub dry_run: bool,
    pub skip_existing: bool,
    pub retry_failed: bool,
}

/// Kinds to collect: the `--step` filter if given, else every enabled step.
fn selected_kinds(config: &CollectionConfig, step: Option<StepName>) -> Vec<DataKind> {
    match step {
        Some(step) => step.data_kind().into_iter().collect(),
        None => config.enabled_kinds(),
    }
}

/// # Errors
///
/// Returns an error if the HTTP client cannot be built, the registry cannot
/// be resolved, or the checkpoint or output directory cannot be written.
pub(crate) async fn run_collect(
    config: &CollectionConfig,
    options: &CollectOptions,
) -> anyhow::Result<()> {
    let kinds = selected_kinds(config, options.step);

    if options.dry_run {
        return dry_run::run_dry_run(config, &kinds);
    }

    let fetcher = Fetcher::from_config(&config.scraping)?;
    let mut limiter = RateLimiter::from_config(&config.scraping);
    let resolved = resolve_registry(config, &fetcher, &mut limiter).await?;

    if options.step == Some(StepName::TeamMapping) {
        println!(
            "team registry: {} teams{}",
            resolved.registry.len(),
            if resolved.complete { "" } else { " (incomplete)" }
        );
        return Ok(());
    }
    if kinds.is_empty() {
        println!("no collection steps enabled; nothing to do");
        return Ok(());
    }

    let plan = targets::build_targets(config, &resolved.registry, &kinds, resolved.complete);
    if !plan.deferred.is_empty() {
        tracing::warn!(
            names = ?plan.deferred,
            "teams not found in a partially resolved registry; left for a later run"
        );
    }

    let mut checkpoint = CheckpointStore::open(&config.checkpoint_path)?;
    if options.retry_failed {
        let readmitted = checkpoint.readmit_failed()?;
        tracing::info!(readmitted, "failed targets re-admitted");
    }

    let mut sink = OutputWriter::new(&config.data_dir(), &config.output_formats);
    let skip_existing: BTreeSet<DataKind> = kinds
        .iter()
        .copied()
        .filter(|kind| options.skip_existing || config.step(StepName::from(*kind)).skip_if_exists)
        .collect();
    let run_options = RunOptions {
        skip_existing,
        max_matches: config.max_matches,
        target_policy: RetryPolicy::for_targets(&config.scraping),
        wages: WagesExtractor::new(config.wage_conversion.clone()),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_task = tokio::spawn(watch_interrupts(Arc::clone(&cancel)));

    let stats = Orchestrator::new(
        &fetcher,
        &mut limiter,
        &resolved.registry,
        &mut checkpoint,
        &mut sink,
        run_options,
        cancel,
    )
    .run(&plan.targets)
    .await;
    signal_task.abort();
    let stats = stats?;

    print_summary(&stats);
    match write_run_report(config, &stats) {
        Ok(path) => tracing::info!(path = %path.display(), "run report written"),
        Err(e) => tracing::warn!(error = %e, "failed to write run report"),
    }
    Ok(())
}

/// First Ctrl-C requests a stop between targets; the second exits at once.
async fn watch_interrupts(cancel: Arc<AtomicBool>) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        if cancel.swap(true, Ordering::SeqCst) {
            tracing::warn!("second interrupt; aborting with the current target in progress");
            std::process::exit(130);
        }
        tracing::warn!("interrupt received; finishing the current target (press Ctrl-C again to abort)");
    }
}

fn print_summary(stats: &RunStats) {
    println!(
        "run {}: {} targets, {} pending at start, {} done, {} skipped, {} failed",
        stats.run_id,
        stats.targets_total,
        stats.targets_pending,
        stats.targets_done,
        stats.targets_skipped,
        stats.targets_failed
    );
    println!(
        "records: {} written, {} rejected",
        stats.records_written, stats.records_rejected
    );
    if let Some(secs) = stats.elapsed_secs() {
        println!("elapsed: {secs}s");
    }
    if stats.cancelled {
        println!("run was cancelled; remaining targets stay pending");
    }

    for (kind, count) in stats.failures_by_kind() {
        println!("failed ({kind}): {count}  hint: {}", kind.operator_hint());
    }
    let parse_errors = stats.parse_errors();
    if !parse_errors.is_empty() {
        println!("targets with parse errors:");
        for failure in parse_errors {
            println!("  {}  {}", failure.target_key, failure.message);
        }
    }
}

/// `{data_dir}/runs/{run_id}.json`
fn write_run_report(config: &CollectionConfig, stats: &RunStats) -> anyhow::Result<PathBuf> {
    let dir = config.data_dir().join("runs");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", stats.run_id));
    std::fs::write(&path, serde_json::to_vec_pretty(stats)?)?;
    Ok(path)
}
