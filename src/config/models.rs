use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which credential flow an environment (or the whole process) uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Browser login through the token-issuing intermediary
    #[default]
    Delegated,
    /// Client identifier/secret exchanged for a bearer token
    ServiceCredential,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Delegated => "delegated",
            AuthMode::ServiceCredential => "service-credential",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delegated" | "oauth" => Ok(AuthMode::Delegated),
            "service-credential" | "service" | "pat" => Ok(AuthMode::ServiceCredential),
            other => Err(format!(
                "unknown auth mode '{other}' (expected 'delegated' or 'service-credential')"
            )),
        }
    }
}

/// Per-environment entry of `config.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub tenant_url: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_mode: AuthMode,
}

/// Contents of `config.yaml`. Holds no secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Empty when no environment is selected
    #[serde(default)]
    pub active_environment: String,
    /// Global auth mode applied to whichever environment is targeted
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// Override for the delegated-login intermediary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_gateway_url: Option<String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

impl RegistryConfig {
    pub fn environment(&self, name: &str) -> Option<Environment> {
        self.environments
            .get(name)
            .map(|config| Environment::from_config(name, config))
    }
}

/// A named remote tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub tenant_url: String,
    pub base_url: String,
    pub auth_mode: AuthMode,
}

impl Environment {
    pub fn from_config(name: &str, config: &EnvironmentConfig) -> Self {
        Self {
            name: name.to_string(),
            tenant_url: config.tenant_url.clone(),
            base_url: config.base_url.clone(),
            auth_mode: config.auth_mode,
        }
    }
}

/// Upsert request for [`super::EnvironmentRegistry::update_environment`]
#[derive(Debug, Clone, Default)]
pub struct UpdateEnvironmentRequest {
    pub environment: String,
    pub tenant_url: String,
    pub base_url: String,
    pub auth_mode: AuthMode,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}
