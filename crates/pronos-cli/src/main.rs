mod checkpoint;
mod collect;
mod teams;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pronos_core::{CollectionConfig, StepName};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pronos")]
#[command(about = "Football statistics collection pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect fixtures, match statistics and wages for a profile
    Collect {
        /// Configuration profile name (`dev`, `prod`, ...) or a YAML path
        profile: String,

        /// Run a single step instead of every enabled one
        #[arg(long)]
        step: Option<StepName>,

        /// Report the target set and checkpoint status without network I/O
        #[arg(long)]
        dry_run: bool,

        /// Skip targets whose output files already exist
        #[arg(long)]
        skip_existing: bool,

        /// Re-admit targets previously marked failed_permanent
        #[arg(long)]
        retry_failed: bool,

        #[command(flatten)]
        location: ConfigLocation,
    },
    /// Show checkpoint status for a profile
    Checkpoint {
        profile: String,

        /// List failed_permanent targets with their errors
        #[arg(long)]
        failed: bool,

        #[command(flatten)]
        location: ConfigLocation,
    },
    /// Resolve and list the team registry for a profile
    Teams {
        profile: String,

        #[command(flatten)]
        location: ConfigLocation,
    },
}

#[derive(Debug, clap::Args)]
struct ConfigLocation {
    /// Directory holding the configuration profiles
    #[arg(long, env = "PRONOS_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            profile,
            step,
            dry_run,
            skip_existing,
            retry_failed,
            location,
        } => {
            let config = load_config(&profile, &location.config_dir)?;
            let options = collect::CollectOptions {
                step,
                dry_run,
                skip_existing,
                retry_failed,
            };
            collect::run_collect(&config, &options).await?;
        }
        Commands::Checkpoint {
            profile,
            failed,
            location,
        } => {
            let config = load_config(&profile, &location.config_dir)?;
            checkpoint::run_checkpoint(&config, failed)?;
        }
        Commands::Teams { profile, location } => {
            let config = load_config(&profile, &location.config_dir)?;
            teams::run_teams(&config).await?;
        }
    }

    Ok(())
}

/// Loads the profile, then installs logging at its configured level unless
/// `RUST_LOG` is set.
fn load_config(profile: &str, config_dir: &Path) -> anyhow::Result<CollectionConfig> {
    let config = pronos_core::load_profile(profile, config_dir)?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(
        profile,
        environment = config.environment.as_str(),
        seasons = config.seasons.len(),
        "configuration loaded"
    );
    Ok(config)
}
