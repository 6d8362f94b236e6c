//! Team registry construction shared by `collect` and `teams`.

use std::path::PathBuf;

use pronos_core::{CollectionConfig, StepName};
use pronos_scraper::urls::league_url;
use pronos_scraper::{Fetch, Fetcher, RateLimiter, TeamRegistry};

/// A registry plus whether every configured season's league table was
/// resolved. Unknown names only fail targets when the registry is complete.
pub(crate) struct ResolvedRegistry {
    pub registry: TeamRegistry,
    pub complete: bool,
}

pub(crate) fn cache_path(config: &CollectionConfig) -> PathBuf {
    config.data_dir().join("raw").join("all_teams.json")
}

/// Reads the registry cache without touching the network.
pub(crate) fn load_cached(config: &CollectionConfig) -> anyhow::Result<Option<TeamRegistry>> {
    let path = cache_path(config);
    if !path.is_file() {
        return Ok(None);
    }
    let registry =
        TeamRegistry::load(&path, &config.source.base_url)?.with_aliases(&config.team_aliases);
    Ok(Some(registry))
}

fn covers_all_seasons(registry: &TeamRegistry, config: &CollectionConfig) -> bool {
    config
        .seasons
        .iter()
        .all(|season| !registry.teams_in_season(season).is_empty())
}

/// Builds the registry for a run.
///
/// With `steps.team_mapping.skip_if_exists` (or the step disabled) a cache
/// covering every configured season is reused. Otherwise each season's league
/// table is fetched; a season that fails is logged and leaves the registry
/// incomplete rather than aborting.
///
/// # Errors
///
/// Returns an error if the cache cannot be read, or if `team_mapping` is
/// disabled and no usable cache exists.
pub(crate) async fn resolve_registry<F: Fetch>(
    config: &CollectionConfig,
    fetcher: &F,
    limiter: &mut RateLimiter,
) -> anyhow::Result<ResolvedRegistry> {
    let step = config.step(StepName::TeamMapping);
    if step.skip_if_exists || !step.enabled {
        match load_cached(config)? {
            Some(registry) if covers_all_seasons(&registry, config) => {
                tracing::info!(teams = registry.len(), "using cached team registry");
                return Ok(ResolvedRegistry {
                    registry,
                    complete: true,
                });
            }
            Some(_) if !step.enabled => {
                anyhow::bail!(
                    "team_mapping is disabled and the registry cache at {} does not cover every configured season",
                    cache_path(config).display()
                );
            }
            None if !step.enabled => {
                anyhow::bail!(
                    "team_mapping is disabled and no registry cache exists at {}",
                    cache_path(config).display()
                );
            }
            _ => tracing::info!("registry cache missing or stale; resolving league tables"),
        }
    }

    let mut registry =
        TeamRegistry::new(&config.source.base_url).with_aliases(&config.team_aliases);
    let mut complete = true;
    for season in &config.seasons {
        let url = league_url(&config.source, season);
        if let Err(e) = registry.resolve_all(fetcher, limiter, &url, season).await {
            tracing::error!(
                season = %season,
                kind = %e.failure_kind(),
                error = %e,
                "league table resolution failed"
            );
            complete = false;
        }
    }

    if registry.is_empty() {
        tracing::error!("no league table resolved; no targets can be built");
    } else if let Err(e) = registry.save(&cache_path(config)) {
        tracing::warn!(error = %e, "failed to write team registry cache");
    }

    Ok(ResolvedRegistry { registry, complete })
}

/// `pronos teams`: resolves (or loads) the registry and prints it.
pub(crate) async fn run_teams(config: &CollectionConfig) -> anyhow::Result<()> {
    let fetcher = Fetcher::from_config(&config.scraping)?;
    let mut limiter = RateLimiter::from_config(&config.scraping);
    let resolved = resolve_registry(config, &fetcher, &mut limiter).await?;

    if !resolved.complete {
        println!("warning: some seasons could not be resolved; the list below is partial");
    }
    println!("{} teams", resolved.registry.len());
    for team in resolved.registry.teams() {
        let seasons: Vec<&str> = team.seasons.iter().map(String::as_str).collect();
        let aliases: Vec<&str> = team.known_aliases.iter().map(String::as_str).collect();
        println!(
            "{}  {:<28} seasons: {}  aliases: {}",
            team.team_id,
            team.canonical_name,
            seasons.join(", "),
            if aliases.is_empty() {
                "-".to_string()
            } else {
                aliases.join(", ")
            }
        );
    }
    Ok(())
}
