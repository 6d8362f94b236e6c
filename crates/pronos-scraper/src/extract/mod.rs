//! Document → record extractors, one per data kind.
//!
//! Each extractor finds its table by a stable id rather than by position.
//! A missing marker is an [`ExtractError`]; a marker with no usable rows is
//! a valid empty result. Rows missing a required field are counted in
//! [`Extraction::rejected`] and never returned.

pub(crate) mod cells;
mod fixtures;
mod match_stats;
mod wages;

use pronos_core::{CollectedRecord, Target};

use crate::error::ExtractError;
use crate::fetcher::Document;

pub use fixtures::FixturesExtractor;
pub use match_stats::MatchStatsExtractor;
pub use wages::WagesExtractor;

/// Records parsed from one document plus the number of rows dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub rejected: usize,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: 0,
        }
    }
}

impl<T> Extraction<T> {
    #[must_use]
    pub fn into_collected(self) -> Extraction<CollectedRecord>
    where
        T: Into<CollectedRecord>,
    {
        Extraction {
            records: self.records.into_iter().map(Into::into).collect(),
            rejected: self.rejected,
        }
    }
}

pub trait Extractor {
    type Record: Into<CollectedRecord>;

    /// CSS selector of the element that must be present for the page to be
    /// considered parseable.
    const MARKER: &'static str;

    /// # Errors
    ///
    /// Returns [`ExtractError::MissingMarker`] when the page does not contain
    /// the structural marker for this data kind.
    fn extract(
        &self,
        document: &Document,
        target: &Target,
    ) -> Result<Extraction<Self::Record>, ExtractError>;
}
