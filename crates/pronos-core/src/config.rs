use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::target::DataKind;
use crate::team::fold_team_name;
use crate::ConfigError;

static SEASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{4})$").expect("valid regex"));

const PROFILE_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

const DEFAULT_BASE_URL: &str = "https://fbref.com/en";
const DEFAULT_COMPETITION_ID: &str = "9";
const DEFAULT_COMPETITION_SLUG: &str = "Premier-League";
const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TARGET_RETRY_BUDGET: u32 = 1;
const MAX_FETCH_RETRIES: u32 = 10;
/// Upper bound for any configured pause, in seconds.
const MAX_DELAY_SECS: f64 = 3_600.0;

const DEFAULT_USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
    Test,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Parquet,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Pipeline steps that can be toggled in a profile. `TeamMapping` builds the
/// registry; the others map one-to-one onto [`DataKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    TeamMapping,
    Fixtures,
    MatchStats,
    Wages,
}

impl StepName {
    pub const ALL: [StepName; 4] = [
        StepName::TeamMapping,
        StepName::Fixtures,
        StepName::MatchStats,
        StepName::Wages,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::TeamMapping => "team_mapping",
            StepName::Fixtures => "fixtures",
            StepName::MatchStats => "match_stats",
            StepName::Wages => "wages",
        }
    }

    /// The data kind collected by this step, if any.
    #[must_use]
    pub fn data_kind(self) -> Option<DataKind> {
        match self {
            StepName::TeamMapping => None,
            StepName::Fixtures => Some(DataKind::Fixtures),
            StepName::MatchStats => Some(DataKind::MatchStats),
            StepName::Wages => Some(DataKind::Wages),
        }
    }
}

impl From<DataKind> for StepName {
    fn from(kind: DataKind) -> Self {
        match kind {
            DataKind::Fixtures => StepName::Fixtures,
            DataKind::MatchStats => StepName::MatchStats,
            DataKind::Wages => StepName::Wages,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepName::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown step '{s}'; expected team_mapping, fixtures, match_stats or wages"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepConfig {
    pub enabled: bool,
    pub skip_if_exists: bool,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_if_exists: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TeamSelection {
    /// Every team found in each season's league table.
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub competition_id: String,
    pub competition_slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapingConfig {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub chunk_size: Option<u32>,
    pub chunk_break_secs: Option<f64>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub request_timeout_secs: u64,
    pub target_retry_budget: u32,
    pub user_agents: Vec<String>,
}

impl ScrapingConfig {
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs_f64(self.min_delay_secs)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay_secs)
    }

    /// The configured long pause, when both halves of it are present.
    #[must_use]
    pub fn chunk_break(&self) -> Option<(u32, Duration)> {
        match (self.chunk_size, self.chunk_break_secs) {
            (Some(size), Some(secs)) => Some((size, Duration::from_secs_f64(secs))),
            _ => None,
        }
    }
}

/// An explicitly configured wage conversion. Without one, wages stay in the
/// currency the site reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionConfig {
    pub currency: String,
    pub rate: Decimal,
}

/// A fully validated collection profile.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionConfig {
    pub environment: Environment,
    pub seasons: Vec<String>,
    pub teams: TeamSelection,
    pub team_aliases: BTreeMap<String, Vec<String>>,
    pub source: SourceConfig,
    pub output_formats: Vec<OutputFormat>,
    pub output_base_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub scraping: ScrapingConfig,
    pub steps: BTreeMap<StepName, StepConfig>,
    pub max_matches: Option<usize>,
    pub wage_conversion: Option<ConversionConfig>,
    pub log_level: String,
}

impl CollectionConfig {
    #[must_use]
    pub fn step(&self, step: StepName) -> StepConfig {
        self.steps.get(&step).copied().unwrap_or_default()
    }

    /// `{output.base_path}/{environment}`
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.output_base_path.join(self.environment.as_str())
    }

    /// Enabled data kinds in pipeline order.
    #[must_use]
    pub fn enabled_kinds(&self) -> Vec<DataKind> {
        DataKind::ALL
            .into_iter()
            .filter(|kind| self.step(StepName::from(*kind)).enabled)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Raw YAML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    environment: Option<Environment>,
    seasons: Option<Vec<String>>,
    teams: Option<RawTeams>,
    team_aliases: Option<BTreeMap<String, Vec<String>>>,
    source: RawSource,
    output: RawOutput,
    scraping: RawScraping,
    steps: BTreeMap<String, RawStep>,
    filters: RawFilters,
    wages: RawWages,
    logging: RawLogging,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTeams {
    Keyword(String),
    List(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSource {
    base_url: Option<String>,
    competition_id: Option<String>,
    competition_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutput {
    formats: Option<Vec<String>>,
    base_path: Option<PathBuf>,
    checkpoint_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawScraping {
    delays: RawDelays,
    max_retries: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    target_retry_budget: Option<u32>,
    user_agents: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDelays {
    min: Option<f64>,
    max: Option<f64>,
    chunk_size: Option<u32>,
    chunk_break: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStep {
    enabled: Option<bool>,
    skip_if_exists: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFilters {
    max_matches: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWages {
    conversion: Option<RawConversion>,
}

#[derive(Debug, Deserialize)]
struct RawConversion {
    currency: Option<String>,
    rate: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogging {
    level: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Locate and load a named profile from `dir`.
///
/// `name` may be a bare profile name (`prod`), which is tried as
/// `prod.yaml`, `prod.yml`, `config_prod.yaml` and `config_prod.yml`, or a
/// path to an existing file.
///
/// # Errors
///
/// Returns [`ConfigError::ProfileNotFound`] listing the available profiles
/// when nothing matches, and any error from [`load_config_file`].
pub fn load_profile(name: &str, dir: &Path) -> Result<CollectionConfig, ConfigError> {
    let direct = Path::new(name);
    if direct.is_file() {
        return load_config_file(direct);
    }

    for candidate in profile_candidates(name) {
        let path = dir.join(candidate);
        if path.is_file() {
            return load_config_file(&path);
        }
    }

    Err(ConfigError::ProfileNotFound {
        name: name.to_string(),
        dir: dir.display().to_string(),
        available: available_profiles(dir),
    })
}

fn profile_candidates(name: &str) -> Vec<String> {
    let mut candidates = Vec::with_capacity(4);
    for prefix in ["", "config_"] {
        for ext in PROFILE_EXTENSIONS {
            candidates.push(format!("{prefix}{name}.{ext}"));
        }
    }
    candidates
}

fn available_profiles(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| PROFILE_EXTENSIONS.contains(&ext))
        })
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Load and validate a profile from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_config_file(path: &Path) -> Result<CollectionConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_config(&content)
}

/// Parse and validate a profile from YAML text.
///
/// Keys may sit at the top level or under a `data_collection:` section.
/// Unrecognised keys are ignored.
///
/// # Errors
///
/// Returns [`ConfigError::MissingKey`] naming the first absent required key,
/// [`ConfigError::InvalidValue`] for a value that fails validation, or
/// [`ConfigError::Parse`] for malformed YAML.
pub fn parse_config(yaml: &str) -> Result<CollectionConfig, ConfigError> {
    let mut document: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    if let Some(section) = document.get("data_collection").cloned() {
        document = section;
    }
    if document.is_null() {
        return Err(ConfigError::MissingKey("seasons".to_string()));
    }
    let raw: RawConfig = serde_yaml::from_value(document)?;
    validate(raw)
}

fn validate(raw: RawConfig) -> Result<CollectionConfig, ConfigError> {
    let seasons = validate_seasons(raw.seasons.ok_or_else(|| missing("seasons"))?)?;
    let teams = validate_teams(raw.teams.ok_or_else(|| missing("teams"))?)?;
    let output_formats =
        validate_formats(raw.output.formats.ok_or_else(|| missing("output.formats"))?)?;
    let output_base_path = raw
        .output
        .base_path
        .ok_or_else(|| missing("output.base_path"))?;
    if output_base_path.as_os_str().is_empty() {
        return Err(ConfigError::invalid("output.base_path", "must not be empty"));
    }

    let environment = raw.environment.unwrap_or(Environment::Dev);
    let scraping = validate_scraping(raw.scraping)?;

    let checkpoint_path = raw.output.checkpoint_path.unwrap_or_else(|| {
        output_base_path
            .join(environment.as_str())
            .join("checkpoint.json")
    });

    let steps = StepName::ALL
        .into_iter()
        .map(|name| {
            let step = raw.steps.get(name.as_str());
            let defaults = StepConfig::default();
            let config = StepConfig {
                enabled: step.and_then(|s| s.enabled).unwrap_or(defaults.enabled),
                skip_if_exists: step
                    .and_then(|s| s.skip_if_exists)
                    .unwrap_or(defaults.skip_if_exists),
            };
            (name, config)
        })
        .collect();

    let wage_conversion = raw.wages.conversion.map(validate_conversion).transpose()?;

    if raw.filters.max_matches == Some(0) {
        return Err(ConfigError::invalid(
            "filters.max_matches",
            "must be at least 1 when set",
        ));
    }

    let source = SourceConfig {
        base_url: raw
            .source
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
        competition_id: raw
            .source
            .competition_id
            .unwrap_or_else(|| DEFAULT_COMPETITION_ID.to_string()),
        competition_slug: raw
            .source
            .competition_slug
            .unwrap_or_else(|| DEFAULT_COMPETITION_SLUG.to_string()),
    };

    Ok(CollectionConfig {
        environment,
        seasons,
        teams,
        team_aliases: raw.team_aliases.unwrap_or_default(),
        source,
        output_formats,
        output_base_path,
        checkpoint_path,
        scraping,
        steps,
        max_matches: raw.filters.max_matches,
        wage_conversion,
        log_level: raw.logging.level.unwrap_or_else(|| "info".to_string()),
    })
}

fn missing(key: &str) -> ConfigError {
    ConfigError::MissingKey(key.to_string())
}

fn validate_seasons(seasons: Vec<String>) -> Result<Vec<String>, ConfigError> {
    if seasons.is_empty() {
        return Err(ConfigError::invalid("seasons", "must not be empty"));
    }
    let mut seen = HashSet::new();
    for season in &seasons {
        let caps = SEASON_RE.captures(season).ok_or_else(|| {
            ConfigError::invalid("seasons", format!("'{season}' is not in YYYY-YYYY form"))
        })?;
        let start: u32 = caps[1].parse().map_err(|_| {
            ConfigError::invalid("seasons", format!("'{season}' has an invalid start year"))
        })?;
        let end: u32 = caps[2].parse().map_err(|_| {
            ConfigError::invalid("seasons", format!("'{season}' has an invalid end year"))
        })?;
        if end != start + 1 {
            return Err(ConfigError::invalid(
                "seasons",
                format!("'{season}' must span consecutive years"),
            ));
        }
        if !seen.insert(season.as_str()) {
            return Err(ConfigError::invalid(
                "seasons",
                format!("'{season}' is listed more than once"),
            ));
        }
    }
    Ok(seasons)
}

fn validate_teams(teams: RawTeams) -> Result<TeamSelection, ConfigError> {
    match teams {
        RawTeams::Keyword(word) if word.eq_ignore_ascii_case("all") => Ok(TeamSelection::All),
        RawTeams::Keyword(word) => Err(ConfigError::invalid(
            "teams",
            format!("expected \"all\" or a list of team names, got '{word}'"),
        )),
        RawTeams::List(names) => {
            if names.is_empty() {
                return Err(ConfigError::invalid("teams", "must not be empty"));
            }
            let mut seen = HashSet::new();
            for name in &names {
                let folded = fold_team_name(name);
                if folded.is_empty() {
                    return Err(ConfigError::invalid(
                        "teams",
                        format!("'{name}' is not a usable team name"),
                    ));
                }
                if !seen.insert(folded) {
                    return Err(ConfigError::invalid(
                        "teams",
                        format!("'{name}' duplicates another configured team"),
                    ));
                }
            }
            Ok(TeamSelection::Named(names))
        }
    }
}

fn validate_formats(formats: Vec<String>) -> Result<Vec<OutputFormat>, ConfigError> {
    if formats.is_empty() {
        return Err(ConfigError::invalid("output.formats", "must not be empty"));
    }
    let mut parsed = Vec::with_capacity(formats.len());
    for format in formats {
        let value = match format.as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            "parquet" => OutputFormat::Parquet,
            other => {
                return Err(ConfigError::invalid(
                    "output.formats",
                    format!("'{other}' is not one of json, csv, parquet"),
                ))
            }
        };
        if !parsed.contains(&value) {
            parsed.push(value);
        }
    }
    Ok(parsed)
}

fn validate_scraping(raw: RawScraping) -> Result<ScrapingConfig, ConfigError> {
    let min = raw.delays.min.ok_or_else(|| missing("scraping.delays.min"))?;
    let max = raw.delays.max.ok_or_else(|| missing("scraping.delays.max"))?;
    let max_retries = raw
        .max_retries
        .ok_or_else(|| missing("scraping.max_retries"))?;

    if !min.is_finite() || min <= 0.0 || min > MAX_DELAY_SECS {
        return Err(ConfigError::invalid(
            "scraping.delays.min",
            format!("must be a positive number of seconds, at most {MAX_DELAY_SECS}"),
        ));
    }
    if !max.is_finite() || max < min || max > MAX_DELAY_SECS {
        return Err(ConfigError::invalid(
            "scraping.delays.max",
            format!("must be between scraping.delays.min ({min}) and {MAX_DELAY_SECS}"),
        ));
    }
    if max_retries > MAX_FETCH_RETRIES {
        return Err(ConfigError::invalid(
            "scraping.max_retries",
            format!("must be at most {MAX_FETCH_RETRIES}"),
        ));
    }
    if raw.delays.chunk_size == Some(0) {
        return Err(ConfigError::invalid(
            "scraping.delays.chunk_size",
            "must be at least 1 when set",
        ));
    }
    if let Some(secs) = raw.delays.chunk_break {
        if !secs.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&secs) {
            return Err(ConfigError::invalid(
                "scraping.delays.chunk_break",
                format!("must be between 0 and {MAX_DELAY_SECS} seconds"),
            ));
        }
    }

    let backoff_base_ms = raw.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS);
    let backoff_max_ms = raw.backoff_max_ms.unwrap_or(DEFAULT_BACKOFF_MAX_MS);
    if backoff_max_ms < backoff_base_ms {
        return Err(ConfigError::invalid(
            "scraping.backoff_max_ms",
            "must be at least scraping.backoff_base_ms",
        ));
    }

    let request_timeout_secs = raw
        .request_timeout_secs
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if request_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "scraping.request_timeout_secs",
            "must be at least 1",
        ));
    }

    let user_agents = match raw.user_agents {
        Some(agents) if agents.iter().all(|a| a.trim().is_empty()) => {
            return Err(ConfigError::invalid(
                "scraping.user_agents",
                "must contain at least one non-empty user agent",
            ))
        }
        Some(agents) => agents
            .into_iter()
            .filter(|a| !a.trim().is_empty())
            .collect(),
        None => DEFAULT_USER_AGENTS.iter().map(|a| (*a).to_string()).collect(),
    };

    Ok(ScrapingConfig {
        min_delay_secs: min,
        max_delay_secs: max,
        chunk_size: raw.delays.chunk_size,
        chunk_break_secs: raw.delays.chunk_break,
        max_retries,
        backoff_base_ms,
        backoff_max_ms,
        request_timeout_secs,
        target_retry_budget: raw
            .target_retry_budget
            .unwrap_or(DEFAULT_TARGET_RETRY_BUDGET),
        user_agents,
    })
}

fn validate_conversion(raw: RawConversion) -> Result<ConversionConfig, ConfigError> {
    let currency = raw
        .currency
        .ok_or_else(|| missing("wages.conversion.currency"))?;
    let rate = raw.rate.ok_or_else(|| missing("wages.conversion.rate"))?;
    if currency.trim().is_empty() {
        return Err(ConfigError::invalid(
            "wages.conversion.currency",
            "must not be empty",
        ));
    }
    if rate <= Decimal::ZERO {
        return Err(ConfigError::invalid(
            "wages.conversion.rate",
            "must be greater than zero",
        ));
    }
    Ok(ConversionConfig {
        currency: currency.trim().to_string(),
        rate,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
