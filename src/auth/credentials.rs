//! Import an environment definition from `SAIL_*` variables or a `.env` file

use anyhow::{Context, Result};
use log::info;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{AuthMode, UpdateEnvironmentRequest};

pub const BASE_URL_VAR: &str = "SAIL_BASE_URL";
pub const TENANT_URL_VAR: &str = "SAIL_TENANT_URL";
pub const CLIENT_ID_VAR: &str = "SAIL_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SAIL_CLIENT_SECRET";

/// Service-credential environment read from the process or a `.env` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialImport {
    pub base_url: String,
    pub tenant_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl CredentialImport {
    pub fn from_env() -> Result<CredentialImport> {
        info!("Importing from environment variables");
        Self::from_lookup(|name| std::env::var(name).ok(), "environment variables")
    }

    /// Read a `.env` file without touching the process environment
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<CredentialImport> {
        let path = path.as_ref();
        info!("Importing from .env file: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Environment file not found: {:?}", path);
        }

        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to load .env file {:?}", path))?
        {
            let (name, value) =
                item.with_context(|| format!("Failed to parse .env file {:?}", path))?;
            vars.insert(name, value);
        }

        let source = format!(".env file {}", path.display());
        Self::from_lookup(|name| vars.get(name).cloned(), &source)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, source: &str) -> Result<CredentialImport> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} not found in {}", name, source))
        };

        let base_url = required(BASE_URL_VAR)?;
        let client_id = required(CLIENT_ID_VAR)?;
        let client_secret = required(CLIENT_SECRET_VAR)?;
        let tenant_url = lookup(TENANT_URL_VAR)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| tenant_url_from_base(&base_url));

        Ok(CredentialImport {
            base_url,
            tenant_url,
            client_id,
            client_secret,
        })
    }

    /// Registry upsert for environment `name` in service-credential mode
    pub fn into_request(self, name: &str) -> UpdateEnvironmentRequest {
        UpdateEnvironmentRequest {
            environment: name.to_string(),
            tenant_url: self.tenant_url,
            base_url: self.base_url,
            auth_mode: AuthMode::ServiceCredential,
            client_id: Some(self.client_id),
            client_secret: Some(self.client_secret),
        }
    }
}

/// `https://acme.api.identitynow.com` -> `https://acme.identitynow.com`
pub fn tenant_url_from_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').replacen(".api.", ".", 1)
}
