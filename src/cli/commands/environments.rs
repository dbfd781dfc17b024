//! Environment registry commands

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use is_terminal::IsTerminal;
use std::path::PathBuf;

use super::resolve_environment;
use crate::api::{ConnectivityProbe, ProbeAuth, http_client};
use crate::auth::{CredentialImport, ServiceCredentials};
use crate::auth::credentials::tenant_url_from_base;
use crate::cli::ui::{prompts, with_spinner};
use crate::config::{AuthMode, EnvironmentRegistry, UpdateEnvironmentRequest};
use crate::session::SessionManager;

#[derive(Subcommand)]
pub enum EnvCommands {
    /// Add or update an environment and make it active
    Add {
        /// Environment name
        name: Option<String>,
        /// Tenant URL, e.g. https://acme.identitynow.com
        #[arg(long)]
        tenant_url: Option<String>,
        /// API base URL, e.g. https://acme.api.identitynow.com
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        mode: Option<AuthMode>,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        client_secret: Option<String>,
        /// Read SAIL_* variables from the process environment
        #[arg(long, conflicts_with = "env_file")]
        from_env: bool,
        /// Read SAIL_* variables from a .env file
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
    /// List environments
    List,
    /// Select the active environment
    Select {
        name: Option<String>,
    },
    /// Remove an environment and all of its secrets
    Remove {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Check that the stored credentials are accepted by the tenant
    Test {
        name: Option<String>,
    },
}

pub async fn handle_env_command(cmd: EnvCommands, session: &SessionManager) -> Result<()> {
    let registry = session.registry();
    match cmd {
        EnvCommands::Add {
            name,
            tenant_url,
            base_url,
            mode,
            client_id,
            client_secret,
            from_env,
            env_file,
        } => {
            let import = if from_env {
                Some(CredentialImport::from_env()?)
            } else if let Some(path) = env_file {
                Some(CredentialImport::from_env_file(path)?)
            } else {
                None
            };

            let request = match import {
                Some(import) => {
                    let name = match name {
                        Some(name) => name,
                        None => prompts::prompt_environment_name()?,
                    };
                    import.into_request(&name)
                }
                None => build_request(
                    registry,
                    name,
                    tenant_url,
                    base_url,
                    mode,
                    client_id,
                    client_secret,
                )?,
            };
            add_environment(registry, &request)
        }
        EnvCommands::List => list_environments(registry),
        EnvCommands::Select { name } => select_environment(registry, name),
        EnvCommands::Remove { name, force } => remove_environment(registry, &name, force),
        EnvCommands::Test { name } => {
            let name = resolve_environment(registry, name)?;
            test_environment(session, &name).await
        }
    }
}

fn build_request(
    registry: &EnvironmentRegistry,
    name: Option<String>,
    tenant_url: Option<String>,
    base_url: Option<String>,
    mode: Option<AuthMode>,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<UpdateEnvironmentRequest> {
    let interactive = std::io::stdin().is_terminal();
    let missing = |what: &str| anyhow::anyhow!("--{} is required when not running interactively", what);

    let name = match name {
        Some(name) => name,
        None if interactive => prompts::prompt_environment_name()?,
        None => return Err(missing("name")),
    };
    let existing = registry.get_environment(&name)?;

    let base_url = match base_url {
        Some(url) => url,
        None if interactive => prompts::prompt_value(
            "API base URL (e.g., https://acme.api.identitynow.com)",
            existing.as_ref().map(|env| env.base_url.clone()),
        )?,
        None => return Err(missing("base-url")),
    };
    let auth_mode = match mode {
        Some(mode) => mode,
        None if interactive => prompts::prompt_auth_mode(
            existing.as_ref().map(|env| env.auth_mode).unwrap_or_default(),
        )?,
        None => existing.as_ref().map(|env| env.auth_mode).unwrap_or_default(),
    };
    let tenant_url = match tenant_url {
        Some(url) => url,
        None if interactive && auth_mode == AuthMode::Delegated => prompts::prompt_value(
            "Tenant URL",
            Some(
                existing
                    .as_ref()
                    .map(|env| env.tenant_url.clone())
                    .filter(|url| !url.is_empty())
                    .unwrap_or_else(|| tenant_url_from_base(&base_url)),
            ),
        )?,
        None => existing
            .as_ref()
            .map(|env| env.tenant_url.clone())
            .unwrap_or_else(|| tenant_url_from_base(&base_url)),
    };

    let (client_id, client_secret) = match (client_id, client_secret) {
        (None, None) if interactive && auth_mode == AuthMode::ServiceCredential => {
            let client_id = prompts::prompt_value("Client ID", None)?;
            let client_secret = prompts::prompt_secret("Client secret")?;
            (Some(client_id), Some(client_secret))
        }
        (Some(client_id), None) if interactive => {
            (Some(client_id), Some(prompts::prompt_secret("Client secret")?))
        }
        pair => pair,
    };

    Ok(UpdateEnvironmentRequest {
        environment: name,
        tenant_url,
        base_url,
        auth_mode,
        client_id,
        client_secret,
    })
}

fn add_environment(registry: &EnvironmentRegistry, request: &UpdateEnvironmentRequest) -> Result<()> {
    registry.update_environment(request)?;
    println!(
        "{} Environment '{}' saved and selected ({})",
        "✓".bright_green().bold(),
        request.environment.bright_green().bold(),
        request.auth_mode.to_string().cyan()
    );
    if request.client_id.is_some() != request.client_secret.is_some() {
        println!(
            "  {}",
            "Client ID and secret must be given together; neither was stored.".bright_yellow()
        );
    }
    Ok(())
}

pub fn list_environments(registry: &EnvironmentRegistry) -> Result<()> {
    let environments = registry.list_environments()?;
    let active = registry.active_environment()?;

    if environments.is_empty() {
        println!("  {}", "No environments configured".bright_yellow().bold());
        println!("  {}", "Add one with 'isc-cli env add'.".dimmed());
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        "Environments".bright_white().bold(),
        format!("(global auth mode: {})", registry.global_auth_mode()?).dimmed()
    );
    for env in &environments {
        let is_active = active.as_deref() == Some(env.name.as_str());
        let (marker, name) = if is_active {
            ("●", env.name.bright_green().bold())
        } else {
            ("○", env.name.white())
        };
        println!(
            "  {} {} → {} ({}){}",
            marker.bright_green(),
            name,
            env.base_url.cyan(),
            env.auth_mode.to_string().bright_yellow(),
            if is_active { " (active)".bright_green() } else { "".white() }
        );
    }
    println!();
    Ok(())
}

fn select_environment(registry: &EnvironmentRegistry, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => {
            let names: Vec<String> = registry
                .list_environments()?
                .into_iter()
                .map(|env| env.name)
                .collect();
            if names.is_empty() {
                anyhow::bail!("No environments configured");
            }
            let active = registry.active_environment()?;
            prompts::prompt_select_environment(&names, active.as_deref())?
        }
    };
    registry.set_active_environment(&name)?;
    println!("{} Active environment: {}", "✓".bright_green().bold(), name.bright_green().bold());
    Ok(())
}

fn remove_environment(registry: &EnvironmentRegistry, name: &str, force: bool) -> Result<()> {
    if !force && std::io::stdin().is_terminal() && !prompts::prompt_remove_confirmation(name)? {
        println!("{} Cancelled.", "✗".bright_red().bold());
        return Ok(());
    }
    registry.delete_environment(name)?;
    println!("{} Removed environment '{}'", "✓".bright_green().bold(), name);
    match registry.active_environment()? {
        Some(active) => println!("  Active environment: {}", active.bright_green()),
        None => println!("  {}", "No environments left.".dimmed()),
    }
    Ok(())
}

/// Probe with the stored credential pair if there is one, else with the session tokens
async fn test_environment(session: &SessionManager, name: &str) -> Result<()> {
    let registry = session.registry();
    let env = registry
        .get_environment(name)?
        .ok_or_else(|| anyhow::anyhow!("Environment '{}' not found", name))?;

    let valid = match ServiceCredentials::load(registry.secrets(), name)? {
        Some(credentials) => {
            let probe = ConnectivityProbe::new(http_client()?);
            let outcome = with_spinner(
                format!("Testing client credentials for '{}'", name),
                probe.check(&env.base_url, &ProbeAuth::ClientCredentials(credentials)),
            )
            .await;
            if !outcome.is_valid() {
                println!("{} {}", "✗".bright_red().bold(), outcome.describe());
            }
            outcome.is_valid()
        }
        None => {
            let validation = with_spinner(
                format!("Validating session for '{}'", name),
                session.validate_tokens(name),
            )
            .await;
            if let Some(error) = validation.error() {
                println!("{} {}", "✗".bright_red().bold(), error);
            }
            validation.is_valid
        }
    };

    if valid {
        println!("{} '{}' is reachable and accepts the credentials", "✓".bright_green().bold(), name);
        Ok(())
    } else {
        anyhow::bail!("Connection test for '{}' failed", name)
    }
}
