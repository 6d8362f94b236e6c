//! Target space construction: data kinds × seasons × teams.

use pronos_core::{fold_team_name, CollectionConfig, DataKind, Target, TeamSelection};
use pronos_scraper::TeamRegistry;

/// Prefix of the placeholder id given to names the registry cannot resolve.
pub(crate) const UNRESOLVED_PREFIX: &str = "unresolved:";

#[derive(Debug, Default)]
pub(crate) struct TargetPlan {
    pub targets: Vec<Target>,
    /// Names left out because the registry is incomplete; they stay pending.
    pub deferred: Vec<String>,
}

/// Builds targets in pipeline order: every kind in turn, then season, then
/// team in configured (or league table) order.
///
/// A named team the registry does not know becomes a target with a
/// placeholder id when `registry_complete` is set, so the orchestrator
/// records it as `unknown_team`. Otherwise the name is deferred.
pub(crate) fn build_targets(
    config: &CollectionConfig,
    registry: &TeamRegistry,
    kinds: &[DataKind],
    registry_complete: bool,
) -> TargetPlan {
    let mut plan = TargetPlan::default();
    for kind in kinds {
        for season in &config.seasons {
            match &config.teams {
                TeamSelection::All => {
                    for team in registry.teams_in_season(season) {
                        plan.targets.push(Target::new(
                            team.team_id.clone(),
                            team.canonical_name.clone(),
                            season.clone(),
                            *kind,
                        ));
                    }
                }
                TeamSelection::Named(names) => {
                    for name in names {
                        match registry.lookup(name) {
                            Ok(team) => plan.targets.push(Target::new(
                                team.team_id.clone(),
                                team.canonical_name.clone(),
                                season.clone(),
                                *kind,
                            )),
                            Err(_) if registry_complete => plan.targets.push(Target::new(
                                unresolved_id(name),
                                name.clone(),
                                season.clone(),
                                *kind,
                            )),
                            Err(_) => {
                                if !plan.deferred.contains(name) {
                                    plan.deferred.push(name.clone());
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    plan
}

fn unresolved_id(name: &str) -> String {
    format!("{UNRESOLVED_PREFIX}{}", fold_team_name(name).replace(' ', "-"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pronos_core::load_config_file;

    use super::*;

    fn config(teams: &str) -> CollectionConfig {
        let yaml = format!(
            r"
seasons: [2021-2022, 2022-2023]
teams: {teams}
output:
  formats: [json]
  base_path: data
scraping:
  delays: {{ min: 1, max: 2 }}
  max_retries: 1
"
        );
        pronos_core::parse_config(&yaml).unwrap()
    }

    fn registry() -> TeamRegistry {
        let mut registry = TeamRegistry::new("https://fbref.com/en");
        registry.insert("18bb7c10", "Arsenal", "2021-2022");
        registry.insert("18bb7c10", "Arsenal", "2022-2023");
        registry.insert("943e8050", "Burnley", "2021-2022");
        registry.insert("19538871", "Manchester Utd", "2022-2023");
        registry
    }

    #[test]
    fn named_teams_form_the_cartesian_product_in_order() {
        let config = config("[Manchester United, Arsenal]");
        let plan = build_targets(
            &config,
            &registry(),
            &[DataKind::Fixtures, DataKind::Wages],
            true,
        );
        assert_eq!(plan.targets.len(), 8);
        assert_eq!(plan.targets[0].team_id, "19538871");
        assert_eq!(plan.targets[0].season, "2021-2022");
        assert_eq!(plan.targets[1].team_id, "18bb7c10");
        assert_eq!(plan.targets[2].season, "2022-2023");
        assert_eq!(plan.targets[4].data_kind, DataKind::Wages);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn all_uses_league_table_membership_per_season() {
        let config = config("all");
        let plan = build_targets(&config, &registry(), &[DataKind::Fixtures], true);
        let keys: Vec<String> = plan.targets.iter().map(Target::key).collect();
        assert_eq!(
            keys,
            vec![
                "18bb7c10/2021-2022/fixtures",
                "943e8050/2021-2022/fixtures",
                "18bb7c10/2022-2023/fixtures",
                "19538871/2022-2023/fixtures",
            ]
        );
    }

    #[test]
    fn unknown_name_gets_placeholder_when_registry_complete() {
        let config = config("[Arsenal, Real Madrid]");
        let plan = build_targets(&config, &registry(), &[DataKind::Fixtures], true);
        assert_eq!(plan.targets.len(), 4);
        assert_eq!(plan.targets[1].team_id, "unresolved:real-madrid");
        assert_eq!(plan.targets[1].team_name, "Real Madrid");
    }

    #[test]
    fn unknown_name_is_deferred_when_registry_incomplete() {
        let config = config("[Arsenal, Real Madrid]");
        let plan = build_targets(&config, &registry(), &[DataKind::Fixtures], false);
        assert_eq!(plan.targets.len(), 2);
        assert_eq!(plan.deferred, vec!["Real Madrid".to_string()]);
    }

    #[test]
    fn dev_profile_teams_all_resolve_with_builtin_aliases() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("dev.yaml");
        let config = load_config_file(&path).unwrap();
        let mut registry = TeamRegistry::new(&config.source.base_url);
        for (id, name) in [
            ("18bb7c10", "Arsenal"),
            ("b8fd03ef", "Manchester City"),
            ("822bd0ba", "Liverpool"),
            ("19538871", "Manchester Utd"),
            ("cff3d9bb", "Chelsea"),
        ] {
            for season in &config.seasons {
                registry.insert(id, name, season);
            }
        }
        let plan = build_targets(&config, &registry, &[DataKind::Fixtures], true);
        assert!(plan
            .targets
            .iter()
            .all(|t| !t.team_id.starts_with(UNRESOLVED_PREFIX)));
    }
}
