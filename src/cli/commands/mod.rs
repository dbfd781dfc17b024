pub mod environments;
pub mod session;

use anyhow::Result;

use crate::config::EnvironmentRegistry;

/// Explicit environment name, or the active one
pub fn resolve_environment(registry: &EnvironmentRegistry, name: Option<String>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    registry.active_environment()?.ok_or_else(|| {
        anyhow::anyhow!("No active environment. Add one with 'isc-cli env add' or pick one with 'isc-cli env select'")
    })
}
