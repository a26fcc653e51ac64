//! Single point of control: control token lifecycle
//!
//! ```text
//!            request (any)              service reports us active
//!  NoToken ─────────────────▶ Held ────────────────────────────────▶ Active
//!     ▲                        │                                       │
//!     └────────── release ─────┴──────────────── release ──────────────┘
//! ```
//!
//! A token only grants control once the service reports it as the active
//! one. A standard request loses immediately to an existing holder; a forced
//! request waits (bounded by the service's `tokenForceTimeout`) for the
//! holder to give up or for an operator to confirm on the arm itself.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::{self, ActiveTokenResponse, IssuedToken, SafetySettings, TokenId};
use crate::error::{DeskError, Result};
use crate::retry::RetryingCaller;
use crate::session::SessionManager;
use crate::transport::{DeskRequest, DeskResponse};

/// Default interval between active-token queries while waiting on a forced request
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Lower bound for the poll interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A control token issued to this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlToken {
    pub token: String,
    pub id: TokenId,
}

impl From<IssuedToken> for ControlToken {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            id: issued.id,
        }
    }
}

/// Last known control state of this client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ControlState {
    #[default]
    NoToken,
    /// Token issued but not (yet) reported active
    Held(Arc<ControlToken>),
    /// Token observed active by this client
    Active(Arc<ControlToken>),
}

impl ControlState {
    pub fn token(&self) -> Option<&Arc<ControlToken>> {
        match self {
            ControlState::NoToken => None,
            ControlState::Held(token) | ControlState::Active(token) => Some(token),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlState::NoToken => "no-token",
            ControlState::Held(_) => "held",
            ControlState::Active(_) => "active",
        }
    }
}

/// Requests, verifies and releases the control token
pub struct ControlAuthority {
    caller: Arc<RetryingCaller>,
    session: Arc<SessionManager>,
    state: RwLock<ControlState>,
    poll_interval: Duration,
}

impl ControlAuthority {
    pub fn new(caller: Arc<RetryingCaller>, session: Arc<SessionManager>) -> Self {
        Self {
            caller,
            session,
            state: RwLock::new(ControlState::NoToken),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Interval between active-token queries during a forced request,
    /// never shorter than [`MIN_POLL_INTERVAL`]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn state(&self) -> ControlState {
        self.state.read().clone()
    }

    /// Value of the token currently held, active or not
    pub fn token_value(&self) -> Option<String> {
        self.state.read().token().map(|t| t.token.clone())
    }

    /// Request the control token
    ///
    /// Returns `Ok(true)` once the token is active. A standard request checks
    /// once and returns; a forced one waits up to `tokenForceTimeout`.
    pub async fn request_token(&self, force: bool) -> Result<bool> {
        self.request_token_with_cancel(force, &CancellationToken::new())
            .await
    }

    /// [`ControlAuthority::request_token`] with a way to abandon the forced wait
    ///
    /// Cancelling returns `Ok(false)` and leaves the issued token held.
    #[instrument(skip(self, cancel))]
    pub async fn request_token_with_cancel(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !force {
            let token = self.issue_token(false).await?;
            let active = self.is_token_active().await?;
            if active {
                self.mark_active(&token);
            } else {
                info!(id = %token.id, "Control token issued but another client holds control");
            }
            return Ok(active);
        }

        let timeout = self.force_timeout().await?;
        let token = self.issue_token(true).await?;

        info!(
            id = %token.id,
            timeout_secs = timeout.as_secs_f64(),
            "Waiting for forced control token to become active"
        );
        let active = self.wait_until_active(timeout, cancel).await;
        if active {
            self.mark_active(&token);
        } else {
            warn!(id = %token.id, "Forced control token did not become active");
        }
        Ok(active)
    }

    /// Whether the service reports our token as the active one
    ///
    /// Read-only on both sides, safe to poll.
    pub async fn is_token_active(&self) -> Result<bool> {
        self.query_token_active(self.caller.default_retries()).await
    }

    async fn query_token_active(&self, retries: u32) -> Result<bool> {
        let response = self
            .caller
            .call(&DeskRequest::get(api::CONTROL_TOKEN), retries)
            .await?;
        let reported: ActiveTokenResponse = decode(api::CONTROL_TOKEN, &response)?;

        let Some(active) = reported.active_token else {
            return Ok(false);
        };

        let ours = self.state.read().token().map(|t| t.id.clone());
        Ok(ours.is_some_and(|id| id == active.id))
    }

    /// Whether brakes and FCI may be commanded by this client
    pub async fn can_control(&self) -> Result<bool> {
        if !self.session.control_token_required() {
            return Ok(true);
        }
        self.is_token_active().await
    }

    /// Release the token we hold, whether or not it is the active one
    #[instrument(skip(self))]
    pub async fn release_token(&self) -> Result<()> {
        let token = self.token_value().unwrap_or_default();
        let request =
            DeskRequest::delete(api::CONTROL_TOKEN).with_body(json!({ "token": token }));
        self.caller.send(&request).await?;

        {
            let mut state = self.state.write();
            *state = ControlState::NoToken;
            self.caller.headers().set_control_token(None);
        }

        info!("Control token released");
        Ok(())
    }

    async fn force_timeout(&self) -> Result<Duration> {
        let response = self.caller.send(&DeskRequest::get(api::SAFETY)).await?;
        let safety: SafetySettings = decode(api::SAFETY, &response)?;

        Duration::try_from_secs_f64(safety.token_force_timeout)
            .map_err(|e| DeskError::invalid_response(api::SAFETY, e))
    }

    async fn issue_token(&self, force: bool) -> Result<Arc<ControlToken>> {
        let mut request = DeskRequest::post(api::CONTROL_TOKEN_REQUEST)
            .with_body(json!({ "requestedBy": self.session.username() }));
        if force {
            request = request.with_query(api::FORCE_QUERY);
        }

        let response = self.caller.send(&request).await?;
        let issued: IssuedToken = decode(api::CONTROL_TOKEN_REQUEST, &response)?;
        let token = Arc::new(ControlToken::from(issued));

        // state and header change together so no request sees one without the other
        {
            let mut state = self.state.write();
            *state = ControlState::Held(token.clone());
            self.caller
                .headers()
                .set_control_token(Some(token.token.clone()));
        }

        debug!(id = %token.id, force, "Control token issued");
        Ok(token)
    }

    /// Poll until the token is active, the deadline passes or `cancel` fires.
    ///
    /// Each query is a single attempt bounded by the deadline; failed queries
    /// count as "not yet".
    async fn wait_until_active(&self, timeout: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Forced control request cancelled");
                    return false;
                }
                result = tokio::time::timeout_at(deadline, self.query_token_active(0)) => match result {
                    Ok(Ok(true)) => return true,
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => debug!(error = %e, "Active token query failed while waiting"),
                    Err(_) => break,
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Forced control request cancelled");
                    return false;
                }
                _ = tokio::time::sleep(self.poll_interval.min(remaining)) => {}
            }
        }

        false
    }

    fn mark_active(&self, token: &Arc<ControlToken>) {
        let mut state = self.state.write();
        // a release may have raced us; only promote the token we issued
        if state.token().is_some_and(|held| Arc::ptr_eq(held, token)) {
            *state = ControlState::Active(token.clone());
            info!(id = %token.id, "Control token active");
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, response: &DeskResponse) -> Result<T> {
    serde_json::from_str(&response.body).map_err(|e| DeskError::invalid_response(path, e))
}
