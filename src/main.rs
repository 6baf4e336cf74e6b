//! presence-roles - listener roles from rich-presence activity
//!
//! Periodically refreshes the list of recognized companion applications and
//! grants or revokes each community's listener roles depending on whether a
//! member is currently running one of them.

mod apps;
mod cli;
mod clock;
mod config;
mod error;
mod logging;
mod platform;
mod reconcile;
mod roles;
mod store;
mod sync;
mod types;
mod version;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::apps::{AppRegistry, HttpFeed};
use crate::cli::{Cli, Commands, ConfigSubcommand, RolesSubcommand};
use crate::clock::SystemClock;
use crate::config::BotConfig;
use crate::error::{Error, Result};
use crate::platform::{ChatPlatform, InMemoryPlatform};
use crate::reconcile::Reconciler;
use crate::roles::RoleMappings;
use crate::store::{JsonFileStore, KeyValueStore};
use crate::sync::ControlLoop;
use crate::types::{CommunityId, MemberId, RoleId};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    // Commands that need neither the store nor full logging
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let config = BotConfig::load(cli.config.as_deref())?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting presence-roles"
    );

    // Single cooperative task: passes and mutations never run in parallel
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_main(config, cli.command))
}

/// Everything a command needs, wired from configuration
struct App {
    config: BotConfig,
    platform: Arc<InMemoryPlatform>,
    reconciler: Arc<Reconciler>,
}

impl App {
    fn build(config: BotConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(config.database_path())?);
        let platform = Arc::new(InMemoryPlatform::load(&config.snapshot_path())?);

        let registry = AppRegistry::new(
            store.clone(),
            Arc::new(SystemClock),
            config.builtin_applications(),
            config.retention_policy(),
        );
        let reconciler = Arc::new(Reconciler::new(
            platform.clone(),
            RoleMappings::new(store),
            registry,
            config.mutation_timeout(),
        ));

        Ok(Self {
            config,
            platform,
            reconciler,
        })
    }

    fn feed(&self) -> Result<HttpFeed> {
        HttpFeed::new(self.config.feed.url.clone(), self.config.feed_timeout())
    }

    /// Write role changes back to the platform snapshot
    fn save_platform(&self) -> Result<()> {
        let path = self.config.snapshot_path();
        self.platform.save(&path)?;
        info!(path = %path.display(), "Platform snapshot saved");
        Ok(())
    }
}

async fn async_main(config: BotConfig, command: Commands) -> Result<()> {
    let app = App::build(config)?;

    match command {
        Commands::Run => run_loop(&app).await,

        Commands::Refresh => {
            let count = app.reconciler.registry().refresh(&app.feed()?).await?;
            println!("Updated application ids ({} entries)", count);
            Ok(())
        }

        Commands::Check { community, member } => {
            let result = check(&app, community, member).await;
            app.save_platform()?;
            result
        }

        Commands::Roles { subcommand } => {
            let result = handle_roles_command(&app, subcommand).await;
            app.save_platform()?;
            result
        }

        Commands::Learn { community, member } => {
            let (learned, outcome) = app
                .reconciler
                .learn_from_activity(CommunityId(community), MemberId(member))
                .await?;
            app.save_platform()?;

            match learned {
                Some((app_id, result)) => println!("Application {}: {:?}", app_id, result),
                None => println!("Member {} is not running any application", member),
            }
            println!("Member {}: {}", member, outcome);
            Ok(())
        }

        Commands::Version | Commands::Config { .. } => Err(Error::Internal(
            "version and config commands do not run inside the runtime".to_string(),
        )),
    }
}

/// Run the control loop until Ctrl+C
async fn run_loop(app: &App) -> Result<()> {
    let feed = Arc::new(app.feed()?);
    let control = ControlLoop::new(
        app.reconciler.clone(),
        feed,
        app.config.sync_interval(),
        app.config.sync.run_on_start,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let result = control.run(shutdown_rx).await;

    // Keep what was applied, even if the loop stopped on an error
    app.save_platform()?;
    let ticks = result?;
    info!(ticks, "presence-roles stopped");
    Ok(())
}

async fn check(app: &App, community: Option<u64>, member: Option<u64>) -> Result<()> {
    let reconciler = &app.reconciler;

    match (community, member) {
        (Some(community), Some(member)) => {
            let outcome = reconciler
                .reconcile_member(CommunityId(community), MemberId(member))
                .await?;
            println!("Member {}: {}", member, outcome);
        }
        (Some(community), None) => {
            let report = reconciler.reconcile_community(CommunityId(community)).await?;
            println!("{}", report);
        }
        (None, _) => {
            let report = reconciler.reconcile_all_communities().await?;
            println!("{}", report);
        }
    }

    Ok(())
}

/// Handle role mapping subcommands
async fn handle_roles_command(app: &App, subcommand: RolesSubcommand) -> Result<()> {
    let reconciler = &app.reconciler;
    let mappings = reconciler.mappings();

    match subcommand {
        RolesSubcommand::Show { community } => match mappings.overview(CommunityId(community))? {
            Some(text) => println!("{}", text),
            None => println!("No listener roles are configured"),
        },

        RolesSubcommand::Map {
            community,
            role,
            listener,
        } => {
            let community = CommunityId(community);
            for id in [role, listener] {
                if reconciler.platform().role(community, RoleId(id)).await?.is_none() {
                    return Err(Error::UnknownRole {
                        community: community.get(),
                        role: id,
                    });
                }
            }

            match mappings.set_mapping(community, RoleId(role), RoleId(listener))? {
                Some(previous) if previous != RoleId(listener) => {
                    println!("Role {} now grants {} (was {})", role, listener, previous);
                }
                _ => println!("Role {} now grants {}", role, listener),
            }
        }

        RolesSubcommand::Unmap { community, role } => {
            match reconciler.unmap_role(CommunityId(community), RoleId(role)).await? {
                Some(listener) => println!("Role {} no longer grants {}", role, listener),
                None => println!("Role {} has no listener role", role),
            }
        }

        RolesSubcommand::Clear { community } => {
            let count = reconciler.clear_mappings(CommunityId(community)).await?;
            println!("Removed {} role mappings", count);
        }
    }

    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = BotConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let created = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", created.display());
        }
        ConfigSubcommand::Validate => {
            BotConfig::load(config_path)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
