//! The collection orchestrator: one sequential pass over pending targets.
//!
//! Every per-target failure is converted into a checkpoint update and a
//! [`RunStats`] entry here. Only checkpoint and output storage errors end
//! the run early.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pronos_core::{
    summarize_wages, CollectedRecord, DataKind, FailureKind, MatchStatRecord, RunStats, Target,
    TeamRecord,
};
use pronos_scraper::urls::{fixtures_page, wages_page};
use pronos_scraper::{
    paced_fetch, Document, ExtractError, Extractor, FetchResult, Fetch, FixturesExtractor,
    MatchStatsExtractor, RateLimiter, RetryPolicy, TeamRegistry, WagesExtractor,
};
use pronos_store::{CheckpointStatus, CheckpointStore, RecordSink, StoreError};

/// Per-run knobs derived from the profile and CLI flags.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    /// Kinds whose existing output marks the target done without fetching.
    pub skip_existing: BTreeSet<DataKind>,
    pub max_matches: Option<usize>,
    /// Whole-target retries, distinct from the fetcher's per-request ones.
    pub target_policy: RetryPolicy,
    pub wages: WagesExtractor,
}

/// A target-level failure, or a storage error that must stop the run.
#[derive(Debug)]
enum CollectError {
    Target { kind: FailureKind, message: String },
    Store(StoreError),
}

impl From<StoreError> for CollectError {
    fn from(e: StoreError) -> Self {
        CollectError::Store(e)
    }
}

impl From<ExtractError> for CollectError {
    fn from(e: ExtractError) -> Self {
        CollectError::Target {
            kind: e.failure_kind(),
            message: e.to_string(),
        }
    }
}

struct Collected {
    records: usize,
    rejected: usize,
}

pub(crate) struct Orchestrator<'a, F, S> {
    fetcher: &'a F,
    limiter: &'a mut RateLimiter,
    registry: &'a TeamRegistry,
    checkpoint: &'a mut CheckpointStore,
    sink: &'a mut S,
    options: RunOptions,
    cancel: Arc<AtomicBool>,
}

impl<'a, F: Fetch, S: RecordSink> Orchestrator<'a, F, S> {
    pub(crate) fn new(
        fetcher: &'a F,
        limiter: &'a mut RateLimiter,
        registry: &'a TeamRegistry,
        checkpoint: &'a mut CheckpointStore,
        sink: &'a mut S,
        options: RunOptions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            registry,
            checkpoint,
            sink,
            options,
            cancel,
        }
    }

    /// Processes every target the checkpoint still considers pending, in
    /// the given order. Cancellation is checked between targets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the checkpoint or output cannot be written.
    pub(crate) async fn run(&mut self, targets: &[Target]) -> Result<RunStats, StoreError> {
        let pending = self.checkpoint.pending_targets(targets);
        let mut stats = RunStats::start(targets.len());
        stats.targets_pending = pending.len();
        tracing::info!(
            run_id = %stats.run_id,
            total = targets.len(),
            pending = pending.len(),
            "collection run started"
        );

        for (index, target) in pending.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!(
                    remaining = pending.len() - index,
                    "cancellation requested; stopping before next target"
                );
                stats.cancelled = true;
                break;
            }
            self.process(target, &mut stats).await?;
        }

        stats.finish();
        tracing::info!(
            run_id = %stats.run_id,
            done = stats.targets_done,
            failed = stats.targets_failed,
            skipped = stats.targets_skipped,
            records = stats.records_written,
            rejected = stats.records_rejected,
            "collection run finished"
        );
        Ok(stats)
    }

    async fn process(&mut self, target: &Target, stats: &mut RunStats) -> Result<(), StoreError> {
        let Some(team) = self.registry.get(&target.team_id).cloned() else {
            let message = format!("team '{}' is not in the registry", target.team_name);
            tracing::warn!(unit = %target, "{message}");
            self.checkpoint.mark(
                target,
                CheckpointStatus::FailedPermanent,
                Some((FailureKind::UnknownTeam, message.clone())),
            )?;
            stats.record_failure(target, FailureKind::UnknownTeam, message, 0, true);
            return Ok(());
        };

        if self.options.skip_existing.contains(&target.data_kind) && self.sink.exists(target) {
            tracing::debug!(unit = %target, "output exists; skipping");
            self.checkpoint.mark(target, CheckpointStatus::Done, None)?;
            stats.record_skipped();
            return Ok(());
        }

        let mut state = self.options.target_policy.start();
        loop {
            let attempt = state.begin_attempt();
            self.checkpoint.mark(target, CheckpointStatus::InProgress, None)?;
            tracing::info!(unit = %target, attempt, "collecting");

            match self.collect(target, &team).await {
                Ok(collected) => {
                    self.checkpoint.mark(target, CheckpointStatus::Done, None)?;
                    stats.record_done(collected.records);
                    stats.record_rejections(target, collected.rejected);
                    if collected.rejected > 0 {
                        tracing::warn!(
                            unit = %target,
                            rejected = collected.rejected,
                            "rows rejected for missing required fields"
                        );
                    }
                    return Ok(());
                }
                Err(CollectError::Store(e)) => return Err(e),
                Err(CollectError::Target { kind, message }) => {
                    if kind.is_retryable() {
                        if let Some(delay) = state.next_backoff() {
                            tracing::warn!(
                                unit = %target,
                                attempt,
                                delay = ?delay,
                                error = %message,
                                "target failed; retrying after backoff"
                            );
                            self.checkpoint.mark(
                                target,
                                CheckpointStatus::Pending,
                                Some((kind, message)),
                            )?;
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    tracing::error!(
                        unit = %target,
                        attempt,
                        %kind,
                        error = %message,
                        hint = kind.operator_hint(),
                        "target failed permanently"
                    );
                    self.checkpoint.mark(
                        target,
                        CheckpointStatus::FailedPermanent,
                        Some((kind, message.clone())),
                    )?;
                    stats.record_failure(target, kind, message, state.attempts(), true);
                    return Ok(());
                }
            }
        }
    }

    async fn collect(&mut self, target: &Target, team: &TeamRecord) -> Result<Collected, CollectError> {
        match target.data_kind {
            DataKind::Fixtures => self.collect_fixtures(target, team).await,
            DataKind::Wages => self.collect_wages(target, team).await,
            DataKind::MatchStats => self.collect_match_stats(target, team).await,
        }
    }

    async fn collect_fixtures(
        &mut self,
        target: &Target,
        team: &TeamRecord,
    ) -> Result<Collected, CollectError> {
        let url = team.url_for(&target.season, &fixtures_page(&team.canonical_name));
        let document = self.fetch(&url).await?;
        let extraction = FixturesExtractor.extract(&document, target)?.into_collected();
        self.sink.persist(target, &extraction.records)?;
        Ok(Collected {
            records: extraction.records.len(),
            rejected: extraction.rejected,
        })
    }

    async fn collect_wages(
        &mut self,
        target: &Target,
        team: &TeamRecord,
    ) -> Result<Collected, CollectError> {
        let url = team.url_for(&target.season, &wages_page(&team.canonical_name));
        let document = self.fetch(&url).await?;
        let extraction = self.options.wages.extract(&document, target)?;

        let summary = summarize_wages(target, &extraction.records);
        let records: Vec<CollectedRecord> =
            extraction.records.into_iter().map(CollectedRecord::from).collect();
        self.sink.persist(target, &records)?;
        self.sink.persist_summary(&summary)?;
        tracing::info!(
            unit = %target,
            players = summary.player_count,
            total_wage_bill = summary.total_wage_bill,
            unverified = summary.unverified_count,
            "wages collected"
        );
        Ok(Collected {
            records: records.len(),
            rejected: extraction.rejected,
        })
    }

    /// Fetches the team's fixtures, then each played match's report page.
    /// Matches finished in an earlier attempt are read back from staging.
    async fn collect_match_stats(
        &mut self,
        target: &Target,
        team: &TeamRecord,
    ) -> Result<Collected, CollectError> {
        let url = team.url_for(&target.season, &fixtures_page(&team.canonical_name));
        let document = self.fetch(&url).await?;
        let fixtures = FixturesExtractor.extract(&document, target)?;

        let mut seen = BTreeSet::new();
        let mut matches: Vec<(String, String)> = fixtures
            .records
            .into_iter()
            .filter(pronos_core::FixtureRecord::is_played)
            .filter_map(|fixture| Some((fixture.match_id?, fixture.match_report_url?)))
            .filter(|(match_id, _)| seen.insert(match_id.clone()))
            .collect();
        if let Some(limit) = self.options.max_matches {
            matches.truncate(limit);
        }

        let completed = self.checkpoint.completed_units(target);
        let mut records: Vec<MatchStatRecord> = Vec::new();
        let mut rejected = 0;
        for (match_id, match_url) in &matches {
            if completed.contains(match_id) {
                if let Some(staged) = self.sink.load_staged_match(target, match_id)? {
                    records.extend(staged);
                    continue;
                }
            }

            let page = self.fetch(match_url).await?;
            let extraction = match MatchStatsExtractor.extract(&page, target) {
                Ok(extraction) => extraction,
                Err(e) => {
                    tracing::warn!(unit = %target, match_id, error = %e, "match page skipped");
                    rejected += 1;
                    continue;
                }
            };
            rejected += extraction.rejected;
            self.sink.stage_match(target, match_id, &extraction.records)?;
            self.checkpoint.record_progress(target, match_id)?;
            records.extend(extraction.records);
        }

        let records: Vec<CollectedRecord> = records.into_iter().map(CollectedRecord::from).collect();
        self.sink.persist(target, &records)?;
        self.sink.clear_staging(target)?;
        tracing::info!(
            unit = %target,
            matches = matches.len(),
            records = records.len(),
            "match stats collected"
        );
        Ok(Collected {
            records: records.len(),
            rejected,
        })
    }

    async fn fetch(&mut self, url: &str) -> Result<Document, CollectError> {
        match paced_fetch(self.fetcher, self.limiter, url).await {
            FetchResult::Success { document, .. } => Ok(document),
            FetchResult::Failure {
                kind,
                message,
                attempt_count,
            } => Err(CollectError::Target {
                kind,
                message: format!("{url}: {message} after {attempt_count} attempt(s)"),
            }),
        }
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
