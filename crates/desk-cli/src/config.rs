//! Configuration file handling for desk-cli

use anyhow::{Context, Result};
use desk_client::DeskConfig;
use std::path::{Path, PathBuf};

/// Values given on the command line, each overriding the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub login_retries: Option<i32>,
}

/// Load configuration from `path`, or from the default config file if it exists
pub fn load(path: Option<&Path>) -> Result<DeskConfig> {
    if let Some(path) = path {
        return load_from(path);
    }

    let default_path = config_path()?;
    if default_path.exists() {
        load_from(&default_path)
    } else {
        Ok(DeskConfig::default())
    }
}

/// Load configuration from a specific path
pub fn load_from(path: &Path) -> Result<DeskConfig> {
    DeskConfig::from_toml_file(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// Get the default config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("desk-cli");

    Ok(config_dir.join("config.toml"))
}

/// Merge CLI arguments over config file values
pub fn merge_with_args(mut config: DeskConfig, overrides: &Overrides) -> DeskConfig {
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(username) = &overrides.username {
        config.username = username.clone();
    }
    if let Some(password) = &overrides.password {
        config.password = password.clone();
    }
    if let Some(retries) = overrides.login_retries {
        config.login_retries = retries;
    }
    config
}
