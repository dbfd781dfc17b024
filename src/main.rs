use anyhow::Result;
use clap::Parser;
use colored::*;
use log::{error, info};
use std::sync::Arc;

use isc_cli::auth::SystemBrowser;
use isc_cli::cli::commands::{environments, session as session_commands};
use isc_cli::cli::{Cli, Commands};
use isc_cli::config::{ConfigPaths, EnvironmentRegistry};
use isc_cli::secrets::SecretStore;
use isc_cli::secrets::cipher::AesGcmCipher;
use isc_cli::session::SessionManager;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match cli.home.clone() {
        Some(home) => ConfigPaths::from_root(home),
        None => ConfigPaths::discover()?,
    };
    paths.ensure_root()?;

    // Log to file, truncated on each run
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(paths.log_file())?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    info!("Starting isc-cli {}", env!("CARGO_PKG_VERSION"));

    // Without the keychain there is nowhere safe to keep secrets
    let cipher = match AesGcmCipher::from_keychain() {
        Ok(cipher) => cipher,
        Err(e) => {
            error!("Secure storage unavailable: {}", e);
            eprintln!("{} {}", "✗".bright_red().bold(), e);
            std::process::exit(1);
        }
    };

    let secrets = SecretStore::new(paths.secure_dir(), Arc::new(cipher));
    let registry = EnvironmentRegistry::from_paths(&paths, secrets);
    let session = SessionManager::new(registry, Arc::new(SystemBrowser))?;

    let result = match cli.command {
        Commands::Env(cmd) => environments::handle_env_command(cmd, &session).await,
        Commands::Mode { mode } => session_commands::mode_command(&session, mode),
        Commands::Login { environment, mode } => {
            session_commands::login_command(&session, environment, mode).await
        }
        Commands::Status { environment } => {
            session_commands::status_command(&session, environment).await
        }
        Commands::Refresh { environment } => {
            session_commands::refresh_command(&session, environment).await
        }
        Commands::Watch {
            environment,
            interval,
        } => session_commands::watch_command(&session, environment, interval).await,
    };

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}
