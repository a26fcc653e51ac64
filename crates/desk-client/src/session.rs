//! Login, logout and system version discovery

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, instrument};

use crate::api;
use crate::error::Result;
use crate::retry::RetryingCaller;
use crate::transport::DeskRequest;
use crate::version::{parse_system_version, FirmwareVersion};

/// Default retry count for the login request
pub const DEFAULT_LOGIN_RETRIES: u32 = 20;

/// Snapshot of the authenticated context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub host: String,
    pub authenticated: bool,
    /// Whether an authorization credential is attached to outgoing requests
    pub has_credential: bool,
    /// First line of the reported system version
    pub version: Option<String>,
    pub firmware: Option<FirmwareVersion>,
    /// Whether brakes and FCI require an active control token
    pub control_token_required: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    version: Option<(String, FirmwareVersion)>,
    control_token_required: bool,
}

/// Owns the authorization credential and the discovered system version
pub struct SessionManager {
    caller: Arc<RetryingCaller>,
    host: String,
    username: String,
    password: String,
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// `password` is the pre-hashed credential Desk expects; it is sent as-is.
    pub fn new(
        caller: Arc<RetryingCaller>,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            caller,
            host: host.into(),
            username: username.into(),
            password: password.into(),
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    /// Whether brakes and FCI are gated behind an active control token.
    /// Fixed by [`SessionManager::read_system_version`] for the session.
    pub fn control_token_required(&self) -> bool {
        self.state.read().control_token_required
    }

    pub fn session(&self) -> Session {
        let state = self.state.read();
        Session {
            host: self.host.clone(),
            authenticated: state.authenticated,
            has_credential: self.caller.headers().snapshot().authorization.is_some(),
            version: state.version.as_ref().map(|(raw, _)| raw.clone()),
            firmware: state.version.as_ref().map(|(_, v)| *v),
            control_token_required: state.control_token_required,
        }
    }

    /// Log in and discover the system version
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn connect(&self, login_retries: u32) -> Result<()> {
        self.login(login_retries).await?;
        self.read_system_version().await?;
        info!(
            control_token_required = self.control_token_required(),
            "Connected to Desk"
        );
        Ok(())
    }

    /// Authenticate and attach the returned credential to all later requests
    ///
    /// A successful login starts a new session: the previously discovered
    /// version is forgotten until it is read again.
    #[instrument(skip(self), fields(user = %self.username))]
    pub async fn login(&self, retries: u32) -> Result<()> {
        let request = DeskRequest::post(api::LOGIN).with_body(json!({
            "login": self.username,
            "password": self.password,
        }));

        let response = self.caller.call(&request, retries).await?;
        self.caller.headers().set_authorization(response.body);

        *self.state.write() = SessionState {
            authenticated: true,
            ..SessionState::default()
        };

        info!("Logged in");
        Ok(())
    }

    /// Log out
    ///
    /// Only the authenticated flag is cleared. The credential stays attached
    /// to outgoing requests, which is what the Desk web UI does as well.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.caller.send(&DeskRequest::post(api::LOGOUT)).await?;
        self.state.write().authenticated = false;
        info!("Logged out");
        Ok(())
    }

    /// Query the system version and decide whether control tokens are required
    #[instrument(skip(self))]
    pub async fn read_system_version(&self) -> Result<FirmwareVersion> {
        let response = self
            .caller
            .send(&DeskRequest::get(api::SYSTEM_VERSION))
            .await?;
        let (raw, version) = parse_system_version(&response.body)?;
        let required = version.requires_control_token();

        {
            let mut state = self.state.write();
            state.version = Some((raw, version));
            state.control_token_required = required;
        }

        info!(%version, control_token_required = required, "System version read");
        Ok(version)
    }
}
