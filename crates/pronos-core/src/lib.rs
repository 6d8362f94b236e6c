pub mod config;
pub mod error;
pub mod records;
pub mod stats;
pub mod target;
pub mod team;

pub use config::{
    load_config_file, load_profile, parse_config, CollectionConfig, ConversionConfig, Environment,
    OutputFormat, ScrapingConfig, SourceConfig, StepConfig, StepName, TeamSelection,
};
pub use error::ConfigError;
pub use records::{
    columns_for, summarize_wages, Cell, CollectedRecord, Column, ColumnKind, DataQuality,
    FixtureRecord, MatchStatRecord, StatSource, Tabular, WageRecord, WageSummary,
};
pub use stats::{FailureKind, RunStats, TargetFailure};
pub use target::{DataKind, Target};
pub use team::{fold_team_name, TeamRecord};
