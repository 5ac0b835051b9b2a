use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use catalog_core::config::Config;
use catalog_core::logging::{init_logging_with_config, LogConfig};
use catalog_core::store::EditorScope;
use std::path::PathBuf;
use tracing::{debug, info};

mod edit;
mod locks;
mod sync;

#[derive(Parser, Debug)]
#[command(name = "catalog-admin")]
#[command(author, version, about = "Administer the shared catalog stores", long_about = None)]
struct Args {
    /// Configuration file (TOML); CATALOG_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or clear writer locks
    Locks {
        #[command(subcommand)]
        action: LocksAction,
    },

    /// Re-derive the area stores from the legacy store
    Sync {
        /// Legacy unified store
        #[arg(long)]
        legacy: Option<PathBuf>,

        #[arg(long)]
        normati: Option<PathBuf>,

        #[arg(long)]
        commerciali: Option<PathBuf>,

        #[arg(long)]
        materiali: Option<PathBuf>,

        /// Print the resolved paths and stop
        #[arg(long)]
        dry_run: bool,

        /// Only fill stores that are new or empty
        #[arg(long)]
        bootstrap_only: bool,
    },

    /// Hold an editor session until Ctrl-C
    Edit {
        #[arg(long)]
        user: String,

        /// NORMATI, COMMERCIALI, MATERIALI or MAIN
        #[arg(long)]
        scope: EditorScope,

        /// Open read-only when the lock is held elsewhere
        #[arg(long)]
        fallback_reader: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LocksAction {
    /// Show lock rows of the legacy and area stores
    List {
        #[arg(long)]
        json: bool,
    },

    /// Remove lock rows: ALL, STORE:ALL or STORE:KEY
    Clear {
        command: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args).context("invalid configuration")?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    catalog_core::metrics::init_metrics();

    debug!(?config, "configuration loaded");

    match args.command {
        Command::Locks { action } => match action {
            LocksAction::List { json } => locks::list(&config, json)?,
            LocksAction::Clear { command, yes } => locks::clear(&config, &command, yes)?,
        },
        Command::Sync {
            legacy,
            normati,
            commerciali,
            materiali,
            dry_run,
            bootstrap_only,
        } => {
            let overrides = sync::PathOverrides {
                legacy,
                normati,
                commerciali,
                materiali,
            };
            sync::run(&config, overrides, dry_run, bootstrap_only)?;
        }
        Command::Edit {
            user,
            scope,
            fallback_reader,
        } => edit::run(&config, user, scope, fallback_reader).await?,
    }

    info!("catalog-admin finished");
    Ok(())
}
