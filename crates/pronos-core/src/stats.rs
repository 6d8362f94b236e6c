use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::target::Target;

/// Why a target could not be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient errors persisted through every fetch retry.
    TransientExhausted,
    NotFound,
    /// The page's structural marker is missing; the layout probably changed.
    ParseError,
    /// Rate limiting or an anti-bot response.
    Blocked,
    /// A configured team name matched nothing in the registry.
    UnknownTeam,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::TransientExhausted => "transient_exhausted",
            FailureKind::NotFound => "not_found",
            FailureKind::ParseError => "parse_error",
            FailureKind::Blocked => "blocked",
            FailureKind::UnknownTeam => "unknown_team",
        }
    }

    /// Only exhausted transient failures are worth another whole-target
    /// attempt within the same run.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::TransientExhausted)
    }

    /// One-line guidance printed in the end-of-run report.
    #[must_use]
    pub fn operator_hint(self) -> &'static str {
        match self {
            FailureKind::TransientExhausted => "network or server trouble; rerun later",
            FailureKind::NotFound => "page does not exist for this team and season",
            FailureKind::ParseError => "page layout changed; extractor needs attention",
            FailureKind::Blocked => "rate limited or challenged; increase scraping delays",
            FailureKind::UnknownTeam => "team name did not resolve; add an alias",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub target_key: String,
    pub team_name: String,
    pub kind: FailureKind,
    pub message: String,
    /// Whole-target attempts made this run.
    pub attempts: u32,
    /// `false` when the target was left pending for a later run.
    pub permanent: bool,
}

/// Counters for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub targets_total: usize,
    pub targets_pending: usize,
    pub targets_done: usize,
    pub targets_failed: usize,
    pub targets_skipped: usize,
    pub records_written: usize,
    pub records_rejected: usize,
    /// Rejected row counts keyed by [`Target::key`].
    pub rejections: BTreeMap<String, usize>,
    pub failures: Vec<TargetFailure>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStats {
    #[must_use]
    pub fn start(targets_total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            targets_total,
            targets_pending: 0,
            targets_done: 0,
            targets_failed: 0,
            targets_skipped: 0,
            records_written: 0,
            records_rejected: 0,
            rejections: BTreeMap::new(),
            failures: Vec::new(),
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_done(&mut self, records_written: usize) {
        self.targets_done += 1;
        self.records_written += records_written;
    }

    pub fn record_skipped(&mut self) {
        self.targets_skipped += 1;
    }

    /// Adds `count` rejected rows for `target`. Zero is a no-op so the map
    /// only lists targets that actually lost rows.
    pub fn record_rejections(&mut self, target: &Target, count: usize) {
        if count == 0 {
            return;
        }
        self.records_rejected += count;
        *self.rejections.entry(target.key()).or_insert(0) += count;
    }

    pub fn record_failure(
        &mut self,
        target: &Target,
        kind: FailureKind,
        message: impl Into<String>,
        attempts: u32,
        permanent: bool,
    ) {
        self.targets_failed += 1;
        self.failures.push(TargetFailure {
            target_key: target.key(),
            team_name: target.team_name.clone(),
            kind,
            message: message.into(),
            attempts,
            permanent,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Failure counts per kind, for the end-of-run report.
    #[must_use]
    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Parse errors mean the site changed; they get their own line in the
    /// report.
    #[must_use]
    pub fn parse_errors(&self) -> Vec<&TargetFailure> {
        self.failures
            .iter()
            .filter(|f| f.kind == FailureKind::ParseError)
            .collect()
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}
