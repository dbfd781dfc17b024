//! Environment registry backed by `config.yaml`
//!
//! The registry file describes the known tenants, which one is active and the
//! global auth mode. Secrets never go in here; they are delegated to the
//! [`SecretStore`].

pub mod models;
pub mod paths;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::secrets::{SecretStore, keys};
pub use models::{AuthMode, Environment, EnvironmentConfig, RegistryConfig, UpdateEnvironmentRequest};
pub use paths::ConfigPaths;

/// Default token-issuing intermediary for the delegated flow
pub const DEFAULT_AUTH_GATEWAY_URL: &str =
    "https://nug87yusrg.execute-api.us-east-1.amazonaws.com/Prod/sailapps";

/// Durable configuration of known environments
#[derive(Clone)]
pub struct EnvironmentRegistry {
    config_path: PathBuf,
    secrets: SecretStore,
}

impl EnvironmentRegistry {
    pub fn new(config_path: impl Into<PathBuf>, secrets: SecretStore) -> Self {
        Self {
            config_path: config_path.into(),
            secrets,
        }
    }

    pub fn from_paths(paths: &ConfigPaths, secrets: SecretStore) -> Self {
        Self::new(paths.config_file(), secrets)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    /// Read and parse the registry file; fails when it is missing or invalid
    pub fn get_config(&self) -> Result<RegistryConfig> {
        debug!("Loading config from: {:?}", self.config_path);
        let content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file: {:?}", self.config_path))?;

        let config: RegistryConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", self.config_path))?;

        debug!(
            "Loaded config with {} environments",
            config.environments.len()
        );
        Ok(config)
    }

    /// Like [`Self::get_config`] but a missing file yields an empty registry
    pub fn load_or_default(&self) -> Result<RegistryConfig> {
        if !self.config_path.exists() {
            debug!("Config file doesn't exist, using default config");
            return Ok(RegistryConfig::default());
        }
        self.get_config()
    }

    /// Serialize and write the whole registry file
    pub fn set_config(&self, config: &RegistryConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
        fs::write(&self.config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", self.config_path))?;

        debug!("Config saved to: {:?}", self.config_path);
        Ok(())
    }

    /// Upsert an environment, make it active and adopt its auth mode.
    ///
    /// A client identifier and secret are stored only when both are given.
    pub fn update_environment(&self, request: &UpdateEnvironmentRequest) -> Result<()> {
        let mut config = self.load_or_default()?;
        info!("Updating environment: {}", request.environment);

        config.environments.insert(
            request.environment.clone(),
            EnvironmentConfig {
                tenant_url: request.tenant_url.clone(),
                base_url: request.base_url.clone(),
                auth_mode: request.auth_mode,
            },
        );
        config.active_environment = request.environment.clone();
        config.auth_mode = request.auth_mode;

        if let (Some(client_id), Some(client_secret)) =
            (request.client_id.as_deref(), request.client_secret.as_deref())
        {
            self.secrets
                .set(keys::PAT_CLIENT_ID, &request.environment, client_id)?;
            self.secrets
                .set(keys::PAT_CLIENT_SECRET, &request.environment, client_secret)?;
            debug!("Stored client credentials for {}", request.environment);
        }

        self.set_config(&config)
    }

    /// Remove an environment together with all of its secrets
    pub fn delete_environment(&self, name: &str) -> Result<()> {
        let mut config = self.load_or_default()?;
        if config.environments.remove(name).is_none() {
            anyhow::bail!("Environment '{}' not found", name);
        }
        info!("Removing environment: {}", name);

        if config.active_environment == name {
            config.active_environment = config
                .environments
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
            if config.active_environment.is_empty() {
                warn!("Removed last environment, clearing active selection");
            } else {
                info!("Active environment is now: {}", config.active_environment);
            }
        }

        self.secrets.purge_environment(name)?;
        self.set_config(&config)
    }

    /// Switch the active environment pointer
    pub fn set_active_environment(&self, name: &str) -> Result<()> {
        let mut config = self.load_or_default()?;
        if !config.environments.contains_key(name) {
            anyhow::bail!("Environment '{}' not found", name);
        }
        info!("Setting active environment to: {}", name);
        config.active_environment = name.to_string();
        self.set_config(&config)
    }

    pub fn get_environment(&self, name: &str) -> Result<Option<Environment>> {
        Ok(self.load_or_default()?.environment(name))
    }

    pub fn list_environments(&self) -> Result<Vec<Environment>> {
        let config = self.load_or_default()?;
        Ok(config
            .environments
            .iter()
            .map(|(name, env)| Environment::from_config(name, env))
            .collect())
    }

    pub fn active_environment(&self) -> Result<Option<String>> {
        let config = self.load_or_default()?;
        Ok(Some(config.active_environment).filter(|name| !name.is_empty()))
    }

    pub fn global_auth_mode(&self) -> Result<AuthMode> {
        Ok(self.load_or_default()?.auth_mode)
    }

    pub fn set_global_auth_mode(&self, mode: AuthMode) -> Result<()> {
        let mut config = self.load_or_default()?;
        if config.auth_mode != mode {
            info!("Switching global auth mode to: {}", mode);
        }
        config.auth_mode = mode;
        self.set_config(&config)
    }

    /// Base URL of the delegated-login intermediary
    pub fn auth_gateway_url(&self) -> Result<String> {
        Ok(self
            .load_or_default()?
            .auth_gateway_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTH_GATEWAY_URL.to_string()))
    }
}
