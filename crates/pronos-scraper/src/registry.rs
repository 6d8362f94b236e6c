//! Team name → stable identifier resolution, built from league table pages.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use pronos_core::{fold_team_name, TeamRecord};

use crate::error::{ExtractError, RegistryError};
use crate::extract::cells::{clean_text, selector};
use crate::fetcher::{paced_fetch, Document, Fetch, FetchResult};
use crate::rate_limit::RateLimiter;
use crate::urls::{team_id_from_href, team_url_template};

const LEAGUE_TABLE: &str = "table#stats_squads_standard_for";

/// Name variants the league table uses alongside full club names. A team
/// matching any member of a group gains the whole group as aliases.
const BUILTIN_ALIAS_GROUPS: &[&[&str]] = &[
    &["Manchester United", "Manchester Utd", "Man United", "Man Utd"],
    &["Manchester City", "Man City"],
    &["Newcastle United", "Newcastle Utd", "Newcastle"],
    &["Nottingham Forest", "Nott'ham Forest"],
    &["Sheffield United", "Sheffield Utd"],
    &["West Bromwich Albion", "West Brom"],
    &["Wolverhampton Wanderers", "Wolves"],
    &["Tottenham Hotspur", "Tottenham"],
    &["Brighton & Hove Albion", "Brighton"],
    &["West Ham United", "West Ham"],
    &["Leicester City", "Leicester"],
    &["Leeds United", "Leeds"],
    &["Luton Town", "Luton"],
    &["Ipswich Town", "Ipswich"],
];

/// Resolves configured team names to [`TeamRecord`]s.
///
/// `lookup` folds the name with [`fold_team_name`] and tries canonical names
/// before aliases, so an alias can never shadow another team's real name.
#[derive(Debug, Clone)]
pub struct TeamRegistry {
    base_url: String,
    teams: BTreeMap<String, TeamRecord>,
    canonical_index: HashMap<String, String>,
    alias_index: HashMap<String, String>,
    alias_groups: Vec<AliasGroup>,
}

/// A set of names that refer to one team. `anchors` are the names that must
/// match before `names` are attached.
#[derive(Debug, Clone)]
struct AliasGroup {
    anchors: Vec<String>,
    names: Vec<String>,
}

impl TeamRegistry {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            teams: BTreeMap::new(),
            canonical_index: HashMap::new(),
            alias_index: HashMap::new(),
            alias_groups: BUILTIN_ALIAS_GROUPS
                .iter()
                .map(|group| {
                    let names: Vec<String> = group.iter().map(|name| (*name).to_string()).collect();
                    AliasGroup {
                        anchors: names.clone(),
                        names,
                    }
                })
                .collect(),
        }
    }

    /// Adds configured aliases (`canonical: [alias, ...]`). Unlike the
    /// built-in groups these are one-way: only a team answering to
    /// `canonical` gains the aliases.
    #[must_use]
    pub fn with_aliases(mut self, aliases: &BTreeMap<String, Vec<String>>) -> Self {
        for (canonical, extra) in aliases {
            self.alias_groups.push(AliasGroup {
                anchors: vec![canonical.clone()],
                names: extra.clone(),
            });
        }
        let ids: Vec<String> = self.teams.keys().cloned().collect();
        for id in ids {
            self.apply_alias_groups(&id);
        }
        self.reindex();
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamRecord> {
        self.teams.values()
    }

    /// Teams that appeared in `season`'s league table, ordered by name.
    #[must_use]
    pub fn teams_in_season(&self, season: &str) -> Vec<&TeamRecord> {
        let mut teams: Vec<&TeamRecord> = self
            .teams
            .values()
            .filter(|team| team.seasons.contains(season))
            .collect();
        teams.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        teams
    }

    #[must_use]
    pub fn get(&self, team_id: &str) -> Option<&TeamRecord> {
        self.teams.get(team_id)
    }

    /// Case-, diacritic- and punctuation-insensitive lookup: canonical names
    /// first, then aliases.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTeam`] when nothing matches.
    pub fn lookup(&self, name: &str) -> Result<&TeamRecord, RegistryError> {
        let key = fold_team_name(name);
        self.canonical_index
            .get(&key)
            .or_else(|| self.alias_index.get(&key))
            .and_then(|id| self.teams.get(id))
            .ok_or_else(|| RegistryError::UnknownTeam {
                name: name.to_string(),
            })
    }

    /// Records a team seen in `season`'s league table. A new display name for
    /// a known id becomes an alias; the first name seen stays canonical.
    pub fn insert(&mut self, team_id: &str, display_name: &str, season: &str) {
        let base_url = self.base_url.clone();
        let team = self.teams.entry(team_id.to_string()).or_insert_with(|| {
            TeamRecord::new(team_id, display_name, team_url_template(&base_url, team_id))
        });
        team.add_alias(display_name);
        team.seasons.insert(season.to_string());
        self.apply_alias_groups(team_id);
        self.reindex();
    }

    /// Fetches one season's league table and merges every team in it.
    ///
    /// Returns the teams on that page keyed by the display name used there.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Fetch`] if the page could not be fetched.
    /// - [`RegistryError::Extract`] if the league table is missing.
    pub async fn resolve_all<F: Fetch>(
        &mut self,
        fetcher: &F,
        limiter: &mut RateLimiter,
        league_url: &str,
        season: &str,
    ) -> Result<BTreeMap<String, TeamRecord>, RegistryError> {
        tracing::info!(season, url = league_url, "resolving league table");
        let document = match paced_fetch(fetcher, limiter, league_url).await {
            FetchResult::Success { document, .. } => document,
            FetchResult::Failure { kind, message, .. } => {
                return Err(RegistryError::Fetch {
                    url: league_url.to_string(),
                    kind,
                    message,
                })
            }
        };

        let entries = parse_league_table(&document)?;
        let mut resolved = BTreeMap::new();
        for (team_id, display_name) in entries {
            self.insert(&team_id, &display_name, season);
            if let Some(team) = self.teams.get(&team_id) {
                resolved.insert(display_name, team.clone());
            }
        }
        tracing::info!(season, teams = resolved.len(), "league table resolved");
        Ok(resolved)
    }

    /// Writes the registry to `path` as JSON, via a temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CacheIo`] on any filesystem failure.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let io_err = |source| RegistryError::CacheIo {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let records: Vec<&TeamRecord> = self.teams.values().collect();
        let json = serde_json::to_string_pretty(&records).map_err(|source| {
            RegistryError::CacheFormat {
                path: path.display().to_string(),
                source,
            }
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// Loads a registry written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CacheIo`] if the file cannot be read and
    /// [`RegistryError::CacheFormat`] if it is not a team list.
    pub fn load(path: &Path, base_url: &str) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::CacheIo {
            path: path.display().to_string(),
            source,
        })?;
        let records: Vec<TeamRecord> =
            serde_json::from_str(&content).map_err(|source| RegistryError::CacheFormat {
                path: path.display().to_string(),
                source,
            })?;
        let mut registry = Self::new(base_url);
        for record in records {
            registry.teams.insert(record.team_id.clone(), record);
        }
        let ids: Vec<String> = registry.teams.keys().cloned().collect();
        for id in ids {
            registry.apply_alias_groups(&id);
        }
        registry.reindex();
        Ok(registry)
    }

    fn apply_alias_groups(&mut self, team_id: &str) {
        let Some(team) = self.teams.get_mut(team_id) else {
            return;
        };
        let keys: Vec<String> = team.folded_keys().collect();
        for group in &self.alias_groups {
            let matches = group
                .anchors
                .iter()
                .any(|name| keys.contains(&fold_team_name(name)));
            if matches {
                for name in &group.names {
                    team.add_alias(name);
                }
            }
        }
    }

    fn reindex(&mut self) {
        self.canonical_index.clear();
        self.alias_index.clear();
        for (id, team) in &self.teams {
            self.canonical_index
                .entry(fold_team_name(&team.canonical_name))
                .or_insert_with(|| id.clone());
        }
        for (id, team) in &self.teams {
            for alias in &team.known_aliases {
                let key = fold_team_name(alias);
                if !self.canonical_index.contains_key(&key) {
                    self.alias_index.entry(key).or_insert_with(|| id.clone());
                }
            }
        }
    }
}

/// Extracts `(team_id, display_name)` pairs from a league table page, in
/// table order.
///
/// # Errors
///
/// Returns [`ExtractError::MissingMarker`] when the squad table is absent.
pub fn parse_league_table(document: &Document) -> Result<Vec<(String, String)>, ExtractError> {
    let table_sel = selector(LEAGUE_TABLE)?;
    let link_sel = selector("tbody > tr > th[data-stat=\"team\"] a[href]")?;

    let html = document.html();
    let Some(table) = html.select(&table_sel).next() else {
        return Err(ExtractError::missing(LEAGUE_TABLE, &document.url));
    };

    let mut entries = Vec::new();
    for link in table.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let (Some(team_id), Some(name)) = (team_id_from_href(href), clean_text(link)) else {
            tracing::warn!(href, "league table link without a team id");
            continue;
        };
        if !entries.iter().any(|(id, _): &(String, String)| *id == team_id) {
            entries.push((team_id, name));
        }
    }
    Ok(entries)
}
