use anyhow::Result;
use dialoguer::{Input, Select};

use crate::config::AuthMode;

pub fn prompt_environment_name() -> Result<String> {
    Ok(Input::<String>::new()
        .with_prompt("Environment name (e.g., 'prod', 'sandbox')")
        .interact_text()?)
}

pub fn prompt_value(prompt: &str, default: Option<String>) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default);
    }
    Ok(input.interact_text()?)
}

/// Arrow-key Yes/No selection
pub fn prompt_confirmation(prompt: &str, default_yes: bool) -> Result<bool> {
    let items = ["Yes", "No"];
    let selection = Select::new()
        .with_prompt(prompt)
        .items(&items)
        .default(if default_yes { 0 } else { 1 })
        .interact()?;
    Ok(selection == 0)
}

pub fn prompt_remove_confirmation(env_name: &str) -> Result<bool> {
    prompt_confirmation(&format!("Remove environment '{}' and its secrets?", env_name), false)
}

pub fn prompt_auth_mode(default: AuthMode) -> Result<AuthMode> {
    let modes = [AuthMode::Delegated, AuthMode::ServiceCredential];
    let labels = ["Browser login (delegated)", "Client ID and secret (service-credential)"];
    let selection = Select::new()
        .with_prompt("Authentication mode")
        .items(&labels)
        .default(if default == AuthMode::Delegated { 0 } else { 1 })
        .interact()?;
    Ok(modes[selection])
}

pub fn prompt_select_environment(names: &[String], current: Option<&str>) -> Result<String> {
    let default = current
        .and_then(|current| names.iter().position(|name| name == current))
        .unwrap_or(0);
    let selection = Select::new()
        .with_prompt("Select environment")
        .items(names)
        .default(default)
        .interact()?;
    Ok(names[selection].clone())
}

/// Hidden input for the client secret
pub fn prompt_secret(prompt: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{prompt}: "))?)
}
