//! Connector configuration with TOML support

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};

/// Connector configuration
///
/// Every field has a default, so an empty file is a valid configuration for
/// an arm at the factory address.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct DeskConfig {
    /// Address (and optional port) of the arm's controller
    #[serde(default = "default_host")]
    pub host: String,

    /// URL scheme, `https` for a real arm
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Desk user name, also sent as the control token requester
    #[serde(default = "default_username")]
    pub username: String,

    /// Pre-hashed login credential as sent by the Desk web UI
    #[serde(default)]
    pub password: String,

    /// Retries for ordinary requests (default: 5)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Retries for the login request (default: 20). Negative means the
    /// long-running mode keeps trying to connect until stopped.
    #[serde(default = "default_login_retries")]
    pub login_retries: i32,

    /// Per-attempt timeout in seconds (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,

    /// Pause between failed attempts in milliseconds (default: 0)
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Active-token poll interval during a forced request (default: 250ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Steps performed automatically after connecting
    #[serde(default)]
    pub startup: StartupOptions,
}

/// Steps performed automatically by the startup sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartupOptions {
    /// Request control authority right after connecting
    #[serde(default)]
    pub auto_acquire_control: bool,

    /// Fall back to a forced request if the standard one loses
    #[serde(default = "default_true")]
    pub force_auto_acquire: bool,

    #[serde(default)]
    pub auto_open_brakes: bool,

    #[serde(default)]
    pub auto_home_gripper: bool,

    #[serde(default)]
    pub auto_enable_fci: bool,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            auto_acquire_control: false,
            force_auto_acquire: true,
            auto_open_brakes: false,
            auto_home_gripper: false,
            auto_enable_fci: false,
        }
    }
}

fn default_host() -> String {
    "192.168.0.1".to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_username() -> String {
    "franka".to_string()
}

fn default_retries() -> u32 {
    crate::retry::DEFAULT_RETRIES
}

fn default_login_retries() -> i32 {
    crate::session::DEFAULT_LOGIN_RETRIES as i32
}

fn default_request_timeout() -> f64 {
    10.0
}

fn default_poll_interval() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            scheme: default_scheme(),
            username: default_username(),
            password: String::new(),
            retries: default_retries(),
            login_retries: default_login_retries(),
            request_timeout_secs: default_request_timeout(),
            retry_backoff_ms: 0,
            poll_interval_ms: default_poll_interval(),
            startup: StartupOptions::default(),
        }
    }
}

impl fmt::Debug for DeskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeskConfig")
            .field("host", &self.host)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("retries", &self.retries)
            .field("login_retries", &self.login_retries)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("startup", &self.startup)
            .finish()
    }
}

impl DeskConfig {
    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DeskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeskError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            DeskError::Config(msg) => DeskError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Check values serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DeskError::Config("host must not be empty".to_string()));
        }
        if !(self.request_timeout_secs.is_finite() && self.request_timeout_secs > 0.0) {
            return Err(DeskError::Config(format!(
                "request_timeout_secs must be positive, got {}",
                self.request_timeout_secs
            )));
        }
        if self.poll_interval() < crate::authority::MIN_POLL_INTERVAL {
            return Err(DeskError::Config(format!(
                "poll_interval_ms must be at least {}, got {}",
                crate::authority::MIN_POLL_INTERVAL.as_millis(),
                self.poll_interval_ms
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs)
            .unwrap_or(crate::retry::DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Login retry count for a single connect attempt; `None` when the
    /// caller should keep retrying indefinitely
    pub fn bounded_login_retries(&self) -> Option<u32> {
        u32::try_from(self.login_retries).ok()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DeskConfig::from_toml("").unwrap();
        assert_eq!(config, DeskConfig::default());
        assert_eq!(config.retries, 5);
        assert_eq!(config.login_retries, 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.startup.force_auto_acquire);
        assert!(!config.startup.auto_acquire_control);
    }

    #[test]
    fn test_full_config() {
        let config = DeskConfig::from_toml(
            r#"
            host = "172.16.0.2"
            username = "operator"
            password = "MjMsMTY0"
            retries = 2
            login_retries = -1
            poll_interval_ms = 500

            [startup]
            auto_acquire_control = true
            force_auto_acquire = false
            auto_open_brakes = true
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "172.16.0.2");
        assert_eq!(config.username, "operator");
        assert_eq!(config.retries, 2);
        assert_eq!(config.bounded_login_retries(), None);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(
            config.startup,
            StartupOptions {
                auto_acquire_control: true,
                force_auto_acquire: false,
                auto_open_brakes: true,
                auto_home_gripper: false,
                auto_enable_fci: false,
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DeskConfig::from_toml("host = \"\"").is_err());
        assert!(DeskConfig::from_toml("request_timeout_secs = 0.0").is_err());
        assert!(DeskConfig::from_toml("retries = -1").is_err());
        assert!(DeskConfig::from_toml("poll_interval_ms = 0").is_err());
        assert!(DeskConfig::from_toml("poll_interval_ms = 10").is_ok());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = DeskConfig {
            password: "very-secret-hash".to_string(),
            ..DeskConfig::default()
        };
        assert!(!format!("{:?}", config).contains("very-secret-hash"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk.toml");
        std::fs::write(&path, "host = \"10.0.0.5\"\n").unwrap();

        let config = DeskConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.host, "10.0.0.5");

        assert!(DeskConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
