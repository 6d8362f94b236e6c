use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kinds of data collected per (team, season).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Fixtures,
    MatchStats,
    Wages,
}

impl DataKind {
    /// All kinds in pipeline order. Match stats depend on the fixtures page,
    /// so fixtures come first.
    pub const ALL: [DataKind; 3] = [DataKind::Fixtures, DataKind::MatchStats, DataKind::Wages];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Fixtures => "fixtures",
            DataKind::MatchStats => "match_stats",
            DataKind::Wages => "wages",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixtures" => Ok(DataKind::Fixtures),
            "match_stats" => Ok(DataKind::MatchStats),
            "wages" => Ok(DataKind::Wages),
            other => Err(format!(
                "unknown data kind '{other}'; expected fixtures, match_stats or wages"
            )),
        }
    }
}

/// One collection unit: a team, a season, and a kind of data.
///
/// Targets are immutable once built; the checkpoint store addresses entries
/// by [`Target::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
    pub data_kind: DataKind,
}

impl Target {
    #[must_use]
    pub fn new(
        team_id: impl Into<String>,
        team_name: impl Into<String>,
        season: impl Into<String>,
        data_kind: DataKind,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            team_name: team_name.into(),
            season: season.into(),
            data_kind,
        }
    }

    /// Stable address of this target: `team_id/season/data_kind`.
    ///
    /// The display name is deliberately excluded so a renamed team keeps
    /// its checkpoint history.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.team_id, self.season, self.data_kind)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} {}",
            self.team_name, self.team_id, self.season, self.data_kind
        )
    }
}
