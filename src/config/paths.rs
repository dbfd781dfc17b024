use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config home
pub const HOME_ENV: &str = "SAILPOINT_HOME";

const CONFIG_FILE: &str = "config.yaml";
const SECURE_DIR: &str = "secure";
const LOG_FILE: &str = "isc-cli.log";

/// Locations of everything the client persists
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    root: PathBuf,
}

impl ConfigPaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$SAILPOINT_HOME` if set, otherwise `~/.sailpoint`
    pub fn discover() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::from_root(root));
        }
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self::from_root(home.join(".sailpoint")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn secure_dir(&self) -> PathBuf {
        self.root.join(SECURE_DIR)
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)
                .with_context(|| format!("Failed to create config directory: {:?}", self.root))?;
            info!("Created config directory: {:?}", self.root);
        }
        Ok(())
    }
}
