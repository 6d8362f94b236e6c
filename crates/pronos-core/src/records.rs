use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::target::{DataKind, Target};

/// Site-provided data-quality marker carried on every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    #[default]
    Verified,
    /// The site marks the figure as an estimate. Kept, not dropped;
    /// consumers decide whether to exclude it.
    UnverifiedEstimation,
}

impl DataQuality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataQuality::Verified => "verified",
            DataQuality::UnverifiedEstimation => "unverified_estimation",
        }
    }
}

/// One row of a team's all-competitions match log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
    pub date: String,
    pub start_time: Option<String>,
    pub competition: String,
    pub round: Option<String>,
    pub day_of_week: Option<String>,
    pub venue: String,
    pub opponent: String,
    /// `W`, `D` or `L`; absent for unplayed fixtures.
    pub result: Option<String>,
    pub goals_for: Option<u32>,
    pub goals_against: Option<u32>,
    pub xg_for: Option<f64>,
    pub xg_against: Option<f64>,
    pub possession: Option<f64>,
    pub attendance: Option<u64>,
    pub captain: Option<String>,
    pub formation: Option<String>,
    pub referee: Option<String>,
    pub match_id: Option<String>,
    pub match_report_url: Option<String>,
    pub data_quality: DataQuality,
}

impl FixtureRecord {
    /// A fixture with a result and a report link can feed match statistics.
    #[must_use]
    pub fn is_played(&self) -> bool {
        self.result.is_some() && self.match_report_url.is_some()
    }
}

/// Where on the match page a statistic was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatSource {
    TeamStats,
    TeamStatsExtra,
}

impl StatSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatSource::TeamStats => "team_stats",
            StatSource::TeamStatsExtra => "team_stats_extra",
        }
    }
}

/// One statistic for one side of one match, in long format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatRecord {
    pub team_id: String,
    pub season: String,
    pub match_id: String,
    pub match_url: String,
    /// The side this value belongs to, as printed on the match page.
    pub side_name: String,
    pub stat_name: String,
    pub stat_value: String,
    pub numeric_value: Option<f64>,
    pub source: StatSource,
    pub data_quality: DataQuality,
}

/// One player's wage row.
///
/// `annual_wage` is always `weekly_wage * 52` in the source currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WageRecord {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
    pub player_name: String,
    pub nationality: Option<String>,
    pub position: Option<String>,
    pub age: Option<u32>,
    pub weekly_wage: u64,
    pub annual_wage: u64,
    pub currency: String,
    pub converted_annual_wage: Option<Decimal>,
    pub converted_currency: Option<String>,
    pub notes: Option<String>,
    /// Id of the page table the row was read from (`wages` or `div_wages`).
    pub source_table: String,
    pub data_quality: DataQuality,
}

/// Per-target wage aggregates written next to the wage records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WageSummary {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
    pub player_count: usize,
    pub total_wage_bill: u64,
    pub top_earner_wage: u64,
    pub unverified_count: usize,
    /// The shared source currency; `None` when there are no rows or the rows
    /// disagree.
    pub currency: Option<String>,
}

/// Sum and max of annualised wages for one target.
#[must_use]
pub fn summarize_wages(target: &Target, records: &[WageRecord]) -> WageSummary {
    let mut currency: Option<&str> = None;
    let mut mixed = false;
    for record in records {
        match currency {
            None => currency = Some(record.currency.as_str()),
            Some(c) if c != record.currency => mixed = true,
            Some(_) => {}
        }
    }

    WageSummary {
        team_id: target.team_id.clone(),
        team_name: target.team_name.clone(),
        season: target.season.clone(),
        player_count: records.len(),
        total_wage_bill: records
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.annual_wage)),
        top_earner_wage: records.iter().map(|r| r.annual_wage).max().unwrap_or(0),
        unverified_count: records
            .iter()
            .filter(|r| r.data_quality == DataQuality::UnverifiedEstimation)
            .count(),
        currency: if mixed { None } else { currency.map(str::to_string) },
    }
}

/// Any record an extractor can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectedRecord {
    Fixture(FixtureRecord),
    MatchStat(MatchStatRecord),
    Wage(WageRecord),
}

impl CollectedRecord {
    #[must_use]
    pub fn data_kind(&self) -> DataKind {
        match self {
            CollectedRecord::Fixture(_) => DataKind::Fixtures,
            CollectedRecord::MatchStat(_) => DataKind::MatchStats,
            CollectedRecord::Wage(_) => DataKind::Wages,
        }
    }

    #[must_use]
    pub fn data_quality(&self) -> DataQuality {
        match self {
            CollectedRecord::Fixture(r) => r.data_quality,
            CollectedRecord::MatchStat(r) => r.data_quality,
            CollectedRecord::Wage(r) => r.data_quality,
        }
    }
}

impl From<FixtureRecord> for CollectedRecord {
    fn from(record: FixtureRecord) -> Self {
        CollectedRecord::Fixture(record)
    }
}

impl From<MatchStatRecord> for CollectedRecord {
    fn from(record: MatchStatRecord) -> Self {
        CollectedRecord::MatchStat(record)
    }
}

impl From<WageRecord> for CollectedRecord {
    fn from(record: WageRecord) -> Self {
        CollectedRecord::Wage(record)
    }
}

// ---------------------------------------------------------------------------
// Tabular view for CSV and Parquet writers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn text(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Text, nullable: false }
}

const fn opt_text(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Text, nullable: true }
}

const fn int(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Int, nullable: false }
}

const fn opt_int(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Int, nullable: true }
}

const fn opt_float(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Float, nullable: true }
}

const FIXTURE_COLUMNS: [Column; 23] = [
    text("team_id"),
    text("team_name"),
    text("season"),
    text("date"),
    opt_text("start_time"),
    text("competition"),
    opt_text("round"),
    opt_text("day_of_week"),
    text("venue"),
    text("opponent"),
    opt_text("result"),
    opt_int("goals_for"),
    opt_int("goals_against"),
    opt_float("xg_for"),
    opt_float("xg_against"),
    opt_float("possession"),
    opt_int("attendance"),
    opt_text("captain"),
    opt_text("formation"),
    opt_text("referee"),
    opt_text("match_id"),
    opt_text("match_report_url"),
    text("data_quality"),
];

const MATCH_STAT_COLUMNS: [Column; 10] = [
    text("team_id"),
    text("season"),
    text("match_id"),
    text("match_url"),
    text("side_name"),
    text("stat_name"),
    text("stat_value"),
    opt_float("numeric_value"),
    text("source"),
    text("data_quality"),
];

const WAGE_COLUMNS: [Column; 15] = [
    text("team_id"),
    text("team_name"),
    text("season"),
    text("player_name"),
    opt_text("nationality"),
    opt_text("position"),
    opt_int("age"),
    int("weekly_wage"),
    int("annual_wage"),
    text("currency"),
    opt_text("converted_annual_wage"),
    opt_text("converted_currency"),
    opt_text("notes"),
    text("source_table"),
    text("data_quality"),
];

/// Column layout of the flat file written for `kind`.
#[must_use]
pub fn columns_for(kind: DataKind) -> &'static [Column] {
    match kind {
        DataKind::Fixtures => &FIXTURE_COLUMNS,
        DataKind::MatchStats => &MATCH_STAT_COLUMNS,
        DataKind::Wages => &WAGE_COLUMNS,
    }
}

/// One cell of a flat row. `Null` only appears in nullable columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl Cell {
    fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Cell::Null, |v| Cell::Text(v.to_string()))
    }

    fn opt_int<T: Into<i64>>(value: Option<T>) -> Self {
        value.map_or(Cell::Null, |v| Cell::Int(v.into()))
    }

    fn opt_float(value: Option<f64>) -> Self {
        value.map_or(Cell::Null, Cell::Float)
    }

    fn wide_int(value: u64) -> Self {
        Cell::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }

    /// Renders the cell for CSV output; `Null` becomes an empty field.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Null => String::new(),
        }
    }
}

/// A record that can be flattened into the columns of [`columns_for`].
pub trait Tabular {
    fn row(&self) -> Vec<Cell>;
}

impl Tabular for FixtureRecord {
    fn row(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.team_id.clone()),
            Cell::Text(self.team_name.clone()),
            Cell::Text(self.season.clone()),
            Cell::Text(self.date.clone()),
            Cell::opt_text(self.start_time.as_deref()),
            Cell::Text(self.competition.clone()),
            Cell::opt_text(self.round.as_deref()),
            Cell::opt_text(self.day_of_week.as_deref()),
            Cell::Text(self.venue.clone()),
            Cell::Text(self.opponent.clone()),
            Cell::opt_text(self.result.as_deref()),
            Cell::opt_int(self.goals_for),
            Cell::opt_int(self.goals_against),
            Cell::opt_float(self.xg_for),
            Cell::opt_float(self.xg_against),
            Cell::opt_float(self.possession),
            self.attendance.map_or(Cell::Null, Cell::wide_int),
            Cell::opt_text(self.captain.as_deref()),
            Cell::opt_text(self.formation.as_deref()),
            Cell::opt_text(self.referee.as_deref()),
            Cell::opt_text(self.match_id.as_deref()),
            Cell::opt_text(self.match_report_url.as_deref()),
            Cell::Text(self.data_quality.as_str().to_string()),
        ]
    }
}

impl Tabular for MatchStatRecord {
    fn row(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.team_id.clone()),
            Cell::Text(self.season.clone()),
            Cell::Text(self.match_id.clone()),
            Cell::Text(self.match_url.clone()),
            Cell::Text(self.side_name.clone()),
            Cell::Text(self.stat_name.clone()),
            Cell::Text(self.stat_value.clone()),
            Cell::opt_float(self.numeric_value),
            Cell::Text(self.source.as_str().to_string()),
            Cell::Text(self.data_quality.as_str().to_string()),
        ]
    }
}

impl Tabular for WageRecord {
    fn row(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.team_id.clone()),
            Cell::Text(self.team_name.clone()),
            Cell::Text(self.season.clone()),
            Cell::Text(self.player_name.clone()),
            Cell::opt_text(self.nationality.as_deref()),
            Cell::opt_text(self.position.as_deref()),
            Cell::opt_int(self.age),
            Cell::wide_int(self.weekly_wage),
            Cell::wide_int(self.annual_wage),
            Cell::Text(self.currency.clone()),
            self.converted_annual_wage
                .map_or(Cell::Null, |d| Cell::Text(d.to_string())),
            Cell::opt_text(self.converted_currency.as_deref()),
            Cell::opt_text(self.notes.as_deref()),
            Cell::Text(self.source_table.clone()),
            Cell::Text(self.data_quality.as_str().to_string()),
        ]
    }
}

impl Tabular for CollectedRecord {
    fn row(&self) -> Vec<Cell> {
        match self {
            CollectedRecord::Fixture(r) => r.row(),
            CollectedRecord::MatchStat(r) => r.row(),
            CollectedRecord::Wage(r) => r.row(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wage(name: &str, weekly: u64, quality: DataQuality) -> WageRecord {
        WageRecord {
            team_id: "b8fd03ef".to_string(),
            team_name: "Manchester City".to_string(),
            season: "2022-2023".to_string(),
            player_name: name.to_string(),
            nationality: None,
            position: None,
            age: None,
            weekly_wage: weekly,
            annual_wage: weekly * 52,
            currency: "GBP".to_string(),
            converted_annual_wage: None,
            converted_currency: None,
            notes: None,
            source_table: "wages".to_string(),
            data_quality: quality,
        }
    }

    fn target() -> Target {
        Target::new("b8fd03ef", "Manchester City", "2022-2023", DataKind::Wages)
    }

    #[test]
    fn summary_sums_and_maxes_annual_wages() {
        let records = vec![
            wage("A", 100_000, DataQuality::Verified),
            wage("B", 375_000, DataQuality::Verified),
            wage("C", 0, DataQuality::UnverifiedEstimation),
        ];
        let summary = summarize_wages(&target(), &records);
        assert_eq!(summary.player_count, 3);
        assert_eq!(summary.total_wage_bill, 475_000 * 52);
        assert_eq!(summary.top_earner_wage, 375_000 * 52);
        assert_eq!(summary.unverified_count, 1);
        assert_eq!(summary.currency.as_deref(), Some("GBP"));
    }

    #[test]
    fn summary_of_no_rows_is_zeroed() {
        let summary = summarize_wages(&target(), &[]);
        assert_eq!(summary.player_count, 0);
        assert_eq!(summary.total_wage_bill, 0);
        assert_eq!(summary.top_earner_wage, 0);
        assert!(summary.currency.is_none());
    }

    #[test]
    fn summary_drops_currency_when_mixed() {
        let mut euro = wage("B", 10, DataQuality::Verified);
        euro.currency = "EUR".to_string();
        let records = vec![wage("A", 10, DataQuality::Verified), euro];
        assert!(summarize_wages(&target(), &records).currency.is_none());
    }

    #[test]
    fn rows_match_column_layout() {
        let record = wage("A", 1, DataQuality::Verified);
        assert_eq!(record.row().len(), columns_for(DataKind::Wages).len());

        let stat = MatchStatRecord {
            team_id: "b8fd03ef".to_string(),
            season: "2022-2023".to_string(),
            match_id: "abcd1234".to_string(),
            match_url: "https://fbref.com/en/matches/abcd1234/".to_string(),
            side_name: "Manchester City".to_string(),
            stat_name: "Possession".to_string(),
            stat_value: "61%".to_string(),
            numeric_value: Some(61.0),
            source: StatSource::TeamStats,
            data_quality: DataQuality::Verified,
        };
        assert_eq!(stat.row().len(), columns_for(DataKind::MatchStats).len());
    }

    #[test]
    fn null_cells_only_in_nullable_columns() {
        let record = wage("A", 1, DataQuality::Verified);
        for (cell, column) in record.row().iter().zip(columns_for(DataKind::Wages)) {
            if *cell == Cell::Null {
                assert!(column.nullable, "{} is not nullable", column.name);
            }
        }
    }

    #[test]
    fn data_quality_serializes_snake_case() {
        let json = serde_json::to_string(&DataQuality::UnverifiedEstimation).unwrap();
        assert_eq!(json, "\"unverified_estimation\"");
    }
}
