//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for presence-roles.

use clap::{Parser, Subcommand};

/// presence-roles - grant listener roles from rich-presence activity
///
/// Keeps the recognized companion applications up to date and gives members
/// a listener role while they run one of them.
#[derive(Parser, Debug)]
#[command(name = "presence-roles")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "PRESENCE_ROLES_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop until interrupted
    Run,

    /// Refresh the recognized application list once
    Refresh,

    /// Reconcile listener roles once
    Check {
        /// Only this community
        #[arg(long)]
        community: Option<u64>,

        /// Only this member (requires --community)
        #[arg(long, requires = "community")]
        member: Option<u64>,
    },

    /// Role mapping management
    Roles {
        #[command(subcommand)]
        subcommand: RolesSubcommand,
    },

    /// Remember the application a member is currently running
    Learn {
        /// Community the member belongs to
        #[arg(long)]
        community: u64,

        /// Member to learn from
        #[arg(long)]
        member: u64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

/// Role mapping subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RolesSubcommand {
    /// List the listener roles and the roles they are assigned to
    Show {
        #[arg(long)]
        community: u64,
    },

    /// Grant `listener` to listening members holding `role`
    Map {
        #[arg(long)]
        community: u64,

        /// Target role
        #[arg(long)]
        role: u64,

        /// Listener role
        #[arg(long)]
        listener: u64,
    },

    /// Remove a mapping and strip its listener role from members
    Unmap {
        #[arg(long)]
        community: u64,

        /// Target role
        #[arg(long)]
        role: u64,
    },

    /// Remove every mapping and strip all listener roles
    Clear {
        #[arg(long)]
        community: u64,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}
