//! Durable per-target progress, kept in a single JSON file.
//!
//! The store assumes a single writer. Every mutation rewrites the whole file
//! through a temporary sibling and a rename, so a crash leaves either the old
//! or the new state on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pronos_core::{FailureKind, Target};
use serde::{Deserialize, Serialize};

use crate::{write_atomic, StoreError};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    InProgress,
    Done,
    FailedPermanent,
}

impl CheckpointStatus {
    pub const ALL: [CheckpointStatus; 4] = [
        CheckpointStatus::Pending,
        CheckpointStatus::InProgress,
        CheckpointStatus::Done,
        CheckpointStatus::FailedPermanent,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Done => "done",
            CheckpointStatus::FailedPermanent => "failed_permanent",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub target: Target,
    pub status: CheckpointStatus,
    /// Attempts across all runs; incremented on each move to `in_progress`.
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
    pub failure_kind: Option<FailureKind>,
    /// Sub-units (match ids) already collected for a multi-page target.
    #[serde(default)]
    pub completed_units: BTreeSet<String>,
}

impl CheckpointEntry {
    fn new(target: &Target) -> Self {
        Self {
            target: target.clone(),
            status: CheckpointStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            error_summary: None,
            failure_kind: None,
            completed_units: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    updated_at: DateTime<Utc>,
    entries: BTreeMap<String, CheckpointEntry>,
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    entries: BTreeMap<String, CheckpointEntry>,
}

impl CheckpointStore {
    /// Opens the checkpoint at `path`. A missing file is an empty checkpoint;
    /// nothing is written until the first mutation.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the file exists but cannot be read.
    /// - [`StoreError::Json`] if it is not a checkpoint document.
    /// - [`StoreError::CheckpointVersion`] if it was written by an
    ///   incompatible version.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file: CheckpointFile =
                    serde_json::from_str(&content).map_err(|e| StoreError::json(&path, e))?;
                if file.version != FORMAT_VERSION {
                    return Err(StoreError::CheckpointVersion {
                        path,
                        found: file.version,
                        expected: FORMAT_VERSION,
                    });
                }
                file.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "checkpoint opened");
        Ok(Self { path, entries })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Status of `target`; targets never attempted are `pending`.
    #[must_use]
    pub fn status(&self, target: &Target) -> CheckpointStatus {
        self.entries
            .get(&target.key())
            .map_or(CheckpointStatus::Pending, |entry| entry.status)
    }

    #[must_use]
    pub fn entry(&self, target: &Target) -> Option<&CheckpointEntry> {
        self.entries.get(&target.key())
    }

    pub fn entries(&self) -> impl Iterator<Item = &CheckpointEntry> {
        self.entries.values()
    }

    /// Records a status transition and persists it.
    ///
    /// Moving to `in_progress` counts an attempt and stamps
    /// `last_attempt_at`. `error` replaces the stored failure; moving to
    /// `done` clears it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the checkpoint cannot be written. The
    /// in-memory state is updated regardless.
    pub fn mark(
        &mut self,
        target: &Target,
        status: CheckpointStatus,
        error: Option<(FailureKind, String)>,
    ) -> Result<(), StoreError> {
        let entry = self
            .entries
            .entry(target.key())
            .or_insert_with(|| CheckpointEntry::new(target));
        entry.target = target.clone();
        entry.status = status;
        if status == CheckpointStatus::InProgress {
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_attempt_at = Some(Utc::now());
        }
        match error {
            Some((kind, message)) => {
                entry.failure_kind = Some(kind);
                entry.error_summary = Some(message);
            }
            None if status == CheckpointStatus::Done => {
                entry.failure_kind = None;
                entry.error_summary = None;
            }
            None => {}
        }
        self.persist()
    }

    /// Records one completed sub-unit of `target` and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the checkpoint cannot be written.
    pub fn record_progress(&mut self, target: &Target, unit: &str) -> Result<(), StoreError> {
        let entry = self
            .entries
            .entry(target.key())
            .or_insert_with(|| CheckpointEntry::new(target));
        if entry.completed_units.insert(unit.to_string()) {
            self.persist()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn completed_units(&self, target: &Target) -> BTreeSet<String> {
        self.entries
            .get(&target.key())
            .map(|entry| entry.completed_units.clone())
            .unwrap_or_default()
    }

    /// The targets still to collect, in the caller's order: everything that
    /// is not `done` or `failed_permanent`. Targets left `in_progress` by an
    /// interrupted run are included.
    #[must_use]
    pub fn pending_targets(&self, all: &[Target]) -> Vec<Target> {
        all.iter()
            .filter(|target| {
                !matches!(
                    self.status(target),
                    CheckpointStatus::Done | CheckpointStatus::FailedPermanent
                )
            })
            .cloned()
            .collect()
    }

    /// Every `failed_permanent` entry, for operator review.
    #[must_use]
    pub fn failed_targets(&self) -> Vec<&CheckpointEntry> {
        self.entries
            .values()
            .filter(|entry| entry.status == CheckpointStatus::FailedPermanent)
            .collect()
    }

    /// Returns every `failed_permanent` entry to `pending`, keeping its error
    /// for reference. Returns the number re-admitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the checkpoint cannot be written.
    pub fn readmit_failed(&mut self) -> Result<usize, StoreError> {
        let mut readmitted = 0;
        for entry in self.entries.values_mut() {
            if entry.status == CheckpointStatus::FailedPermanent {
                entry.status = CheckpointStatus::Pending;
                readmitted += 1;
            }
        }
        if readmitted > 0 {
            self.persist()?;
        }
        Ok(readmitted)
    }

    /// Status counts over `targets`, including never-attempted ones.
    #[must_use]
    pub fn summarize(&self, targets: &[Target]) -> BTreeMap<CheckpointStatus, usize> {
        let mut counts: BTreeMap<CheckpointStatus, usize> =
            CheckpointStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for target in targets {
            *counts.entry(self.status(target)).or_insert(0) += 1;
        }
        counts
    }

    fn persist(&self) -> Result<(), StoreError> {
        let file = CheckpointFile {
            version: FORMAT_VERSION,
            updated_at: Utc::now(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| StoreError::json(&self.path, e))?;
        write_atomic(&self.path, &json)
    }
}
