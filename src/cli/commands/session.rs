//! Login, status and refresh commands

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use colored::*;
use log::{info, warn};
use std::time::Duration;

use super::resolve_environment;
use crate::cli::ui::with_spinner;
use crate::config::AuthMode;
use crate::session::{ConnectionState, OperationResult, SessionManager, SessionStatus};

/// Refresh ahead of expiry by this much when watching
const REFRESH_MARGIN_MINUTES: i64 = 5;

fn report(result: &OperationResult, success: &str) -> Result<()> {
    if result.success {
        println!("{} {}", "✓".bright_green().bold(), success);
        Ok(())
    } else {
        let error = result.error.as_deref().unwrap_or("unknown error");
        anyhow::bail!("{}", error)
    }
}

pub fn mode_command(session: &SessionManager, mode: Option<AuthMode>) -> Result<()> {
    let registry = session.registry();
    match mode {
        Some(mode) => {
            registry.set_global_auth_mode(mode)?;
            println!("{} Global auth mode: {}", "✓".bright_green().bold(), mode.to_string().cyan());
        }
        None => println!("{}", registry.global_auth_mode()?),
    }
    Ok(())
}

pub async fn login_command(
    session: &SessionManager,
    environment: Option<String>,
    mode: Option<AuthMode>,
) -> Result<()> {
    let environment = resolve_environment(session.registry(), environment)?;
    let mode = match mode {
        Some(mode) => mode,
        None => session.registry().global_auth_mode()?,
    };
    if mode == AuthMode::Delegated {
        println!("Complete the login in your browser if one opens...");
    }
    let result = with_spinner(
        format!("Connecting to '{}' ({})", environment, mode),
        session.unified_login(&environment, Some(mode)),
    )
    .await;
    report(&result, &format!("Connected to '{}' using {} auth", environment, mode))
}

pub async fn status_command(session: &SessionManager, environment: Option<String>) -> Result<()> {
    let environment = resolve_environment(session.registry(), environment)?;
    let status = with_spinner(
        format!("Checking session for '{}'", environment),
        session.get_session_status(&environment),
    )
    .await;
    print_status(&status);
    Ok(())
}

pub async fn refresh_command(session: &SessionManager, environment: Option<String>) -> Result<()> {
    let environment = resolve_environment(session.registry(), environment)?;
    let result = with_spinner(
        format!("Refreshing tokens for '{}'", environment),
        session.manual_refresh(&environment),
    )
    .await;
    report(&result, &format!("Refreshed tokens for '{}'", environment))
}

/// Check the session periodically and refresh before it lapses; stops on Ctrl-C
pub async fn watch_command(
    session: &SessionManager,
    environment: Option<String>,
    interval_secs: u64,
) -> Result<()> {
    let environment = resolve_environment(session.registry(), environment)?;
    let connected = session.connect(&environment).await;
    report(&connected, &format!("Watching '{}'", environment))?;

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                session.disconnect().await;
                println!();
                println!("Stopped watching '{}'", environment);
                return Ok(());
            }
        }

        let result = session
            .keep_alive(&environment, ChronoDuration::minutes(REFRESH_MARGIN_MINUTES))
            .await;
        if let Some(error) = result.error {
            warn!("Keep-alive for '{}' failed: {}", environment, error);
            println!("{} {}", "✗".bright_red().bold(), error);
        }
        print_status(&session.get_session_status(&environment).await);
    }
}

fn print_status(status: &SessionStatus) {
    let validity = if status.is_valid {
        "valid".bright_green().bold()
    } else {
        "invalid".bright_red().bold()
    };
    println!();
    println!("  {} {}", "Environment:".bright_white().bold(), status.environment);
    println!("  {} {}", "Auth mode:".bright_white().bold(), status.auth_mode.to_string().cyan());
    println!("  {} {}", "Session:".bright_white().bold(), validity);

    let state = match status.state {
        ConnectionState::Connected(_) => status.state.to_string().bright_green(),
        ConnectionState::Disconnected => status.state.to_string().dimmed(),
        _ => status.state.to_string().bright_yellow(),
    };
    println!("  {} {}", "State:".bright_white().bold(), state);

    if let Some(expires_at) = status.expires_at {
        let left = status
            .time_until_expiry(Utc::now())
            .unwrap_or_else(ChronoDuration::zero);
        println!(
            "  {} {} ({}m {}s left)",
            "Expires:".bright_white().bold(),
            expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            left.num_minutes(),
            left.num_seconds() % 60
        );
    }
    if let Some(error) = &status.error {
        println!("  {} {}", "Problem:".bright_white().bold(), error.bright_yellow());
    }
    println!(
        "  {} {}",
        "Checked:".bright_white().bold(),
        status.last_checked.format("%H:%M:%S").to_string().dimmed()
    );
    println!();
}
