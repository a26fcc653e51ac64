//! Privileged arm commands
//!
//! These do not check control authority themselves; callers decide when a
//! command may be sent (see [`crate::DeskHandler`]). Without authority the
//! service rejects the request and it surfaces as an ordinary failure.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use crate::api;
use crate::authority::ControlAuthority;
use crate::error::Result;
use crate::retry::RetryingCaller;
use crate::transport::DeskRequest;

/// Brakes, gripper homing and FCI
pub struct ArmCommands {
    caller: Arc<RetryingCaller>,
    authority: Arc<ControlAuthority>,
}

impl ArmCommands {
    pub fn new(caller: Arc<RetryingCaller>, authority: Arc<ControlAuthority>) -> Self {
        Self { caller, authority }
    }

    /// Release the joint brakes
    ///
    /// Returns once the service accepts the request; the brakes themselves
    /// take around ten seconds to open.
    #[instrument(skip(self))]
    pub async fn open_brakes(&self) -> Result<()> {
        self.caller.send(&DeskRequest::post(api::OPEN_BRAKES)).await?;
        info!("Brake release accepted");
        Ok(())
    }

    /// Engage the joint brakes. Avoid while the arm is moving except in an emergency.
    #[instrument(skip(self))]
    pub async fn close_brakes(&self) -> Result<()> {
        self.caller.send(&DeskRequest::post(api::CLOSE_BRAKES)).await?;
        info!("Brake engage accepted");
        Ok(())
    }

    /// Home the gripper; needed once after every power cycle
    #[instrument(skip(self))]
    pub async fn home_gripper(&self) -> Result<()> {
        self.caller
            .send(&DeskRequest::post(api::GRIPPER_HOMING))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn enable_fci(&self) -> Result<()> {
        self.caller.send(&self.fci_request(true)).await?;
        info!("FCI enabled");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disable_fci(&self) -> Result<()> {
        self.caller.send(&self.fci_request(false)).await?;
        info!("FCI disabled");
        Ok(())
    }

    fn fci_request(&self, enable: bool) -> DeskRequest {
        let body = json!({ "token": self.authority.token_value().unwrap_or_default() });
        let request = if enable {
            DeskRequest::post(api::CONTROL_TOKEN_FCI)
        } else {
            DeskRequest::delete(api::CONTROL_TOKEN_FCI)
        };
        request.with_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeskError;
    use crate::session::SessionManager;
    use crate::testing::MockDesk;
    use crate::transport::{HeaderState, Method};

    async fn setup(desk: &MockDesk) -> (Arc<ControlAuthority>, ArmCommands) {
        let caller = Arc::new(
            RetryingCaller::new(Arc::new(desk.clone()), Arc::new(HeaderState::new()))
                .with_default_retries(1),
        );
        let session = Arc::new(SessionManager::new(caller.clone(), "mock", "franka", "hash"));
        session.connect(0).await.unwrap();
        let authority = Arc::new(ControlAuthority::new(caller.clone(), session));
        (authority.clone(), ArmCommands::new(caller, authority))
    }

    #[tokio::test]
    async fn test_commands_without_token_requirement() {
        let desk = MockDesk::new().with_system_version("3.0.0");
        let (_, commands) = setup(&desk).await;

        commands.open_brakes().await.unwrap();
        commands.home_gripper().await.unwrap();
        commands.enable_fci().await.unwrap();

        assert!(desk.brakes_open());
        assert!(desk.gripper_homed());
        assert!(desk.fci_enabled());

        commands.close_brakes().await.unwrap();
        assert!(!desk.brakes_open());
    }

    #[tokio::test]
    async fn test_rejected_without_active_token() {
        let desk = MockDesk::new().with_competing_holder();
        let (_, commands) = setup(&desk).await;

        let result = commands.enable_fci().await;
        assert!(matches!(result, Err(DeskError::RequestFailed { attempts: 2, .. })));
        assert!(!desk.fci_enabled());

        assert!(commands.open_brakes().await.is_err());
        assert!(!desk.brakes_open());
    }

    #[tokio::test]
    async fn test_fci_carries_token() {
        let desk = MockDesk::new();
        let (authority, commands) = setup(&desk).await;
        assert!(authority.request_token(false).await.unwrap());
        let token = authority.token_value().unwrap();

        commands.enable_fci().await.unwrap();
        commands.disable_fci().await.unwrap();

        let enable = &desk.requests_to(Method::Post, api::CONTROL_TOKEN_FCI)[0];
        let disable = &desk.requests_to(Method::Delete, api::CONTROL_TOKEN_FCI)[0];
        assert_eq!(enable.body.as_ref().unwrap()["token"], token.as_str());
        assert_eq!(disable.body.as_ref().unwrap()["token"], token.as_str());
        assert!(!desk.fci_enabled());
    }

    #[tokio::test]
    async fn test_open_brakes_returns_on_acceptance() {
        let desk = MockDesk::new();
        let (authority, commands) = setup(&desk).await;
        authority.request_token(false).await.unwrap();

        commands.open_brakes().await.unwrap();
        assert_eq!(desk.requests_to(Method::Post, api::OPEN_BRAKES).len(), 1);
    }
}
