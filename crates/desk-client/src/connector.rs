//! One authenticated connection to an arm's Desk service

use std::sync::Arc;

use crate::authority::ControlAuthority;
use crate::commands::ArmCommands;
use crate::config::DeskConfig;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::retry::RetryingCaller;
use crate::session::SessionManager;
use crate::transport::{HeaderState, Transport};

/// Owns the session, control authority and commands for one arm
///
/// All parts share a single [`HeaderState`], so the credential from login and
/// the control token ride along on every request made through any of them.
pub struct DeskConnector {
    config: DeskConfig,
    session: Arc<SessionManager>,
    authority: Arc<ControlAuthority>,
    commands: ArmCommands,
}

impl DeskConnector {
    /// Create a connector talking HTTPS to `config.host`
    pub fn new(config: &DeskConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::with_scheme(&config.scheme, &config.host)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a connector over any transport
    pub fn with_transport(config: &DeskConfig, transport: Arc<dyn Transport>) -> Self {
        let caller = Arc::new(
            RetryingCaller::new(transport, Arc::new(HeaderState::new()))
                .with_timeout(config.request_timeout())
                .with_backoff(config.retry_backoff())
                .with_default_retries(config.retries),
        );
        let session = Arc::new(SessionManager::new(
            caller.clone(),
            config.host.clone(),
            config.username.clone(),
            config.password.clone(),
        ));
        let authority = Arc::new(
            ControlAuthority::new(caller.clone(), session.clone())
                .with_poll_interval(config.poll_interval()),
        );
        let commands = ArmCommands::new(caller, authority.clone());

        Self {
            config: config.clone(),
            session,
            authority,
            commands,
        }
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn authority(&self) -> &ControlAuthority {
        &self.authority
    }

    pub fn commands(&self) -> &ArmCommands {
        &self.commands
    }

    /// Log in and read the system version
    pub async fn connect(&self, login_retries: u32) -> Result<()> {
        self.session.connect(login_retries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::testing::MockDesk;
    use crate::transport::Method;

    #[tokio::test]
    async fn test_config_retries_apply() {
        let desk = MockDesk::new();
        let config = DeskConfig {
            retries: 2,
            ..DeskConfig::default()
        };
        let connector = DeskConnector::with_transport(&config, Arc::new(desk.clone()));
        connector.connect(0).await.unwrap();

        desk.fail_next(api::GRIPPER_HOMING, 10);
        assert!(connector.commands().home_gripper().await.is_err());
        assert_eq!(desk.requests_to(Method::Post, api::GRIPPER_HOMING).len(), 3);
    }

    #[tokio::test]
    async fn test_connect_uses_login_retries() {
        let desk = MockDesk::new();
        desk.set_unreachable(true);
        let connector = DeskConnector::with_transport(&DeskConfig::default(), Arc::new(desk.clone()));

        assert!(connector.connect(4).await.is_err());
        assert_eq!(desk.requests_to(Method::Post, api::LOGIN).len(), 5);
        assert!(!connector.session().is_authenticated());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DeskConfig {
            host: String::new(),
            ..DeskConfig::default()
        };
        assert!(DeskConnector::new(&config).is_err());
    }
}
