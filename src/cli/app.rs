use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::environments::EnvCommands;
use crate::config::AuthMode;

#[derive(Parser)]
#[command(name = "isc-cli")]
#[command(about = "Connect to Identity Security Cloud tenants and keep sessions alive")]
#[command(version)]
pub struct Cli {
    /// Config home (defaults to $SAILPOINT_HOME or ~/.sailpoint)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Environment management
    #[command(subcommand)]
    Env(EnvCommands),
    /// Show or set the global auth mode
    Mode {
        /// delegated or service-credential
        mode: Option<AuthMode>,
    },
    /// Connect to an environment, logging in if needed
    Login {
        /// Environment name (defaults to the active one)
        environment: Option<String>,
        /// Auth mode to use instead of the global one
        #[arg(long)]
        mode: Option<AuthMode>,
    },
    /// Show session status
    Status {
        environment: Option<String>,
    },
    /// Refresh the stored tokens
    Refresh {
        environment: Option<String>,
    },
    /// Keep a session alive, refreshing before the access token expires
    Watch {
        environment: Option<String>,
        /// Seconds between checks
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}
