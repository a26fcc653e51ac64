//! Command surface over a [`DeskConnector`]
//!
//! Each command reports a success flag and a human-readable status, and
//! performs the authority checks the lower layers leave to their caller.
//! The startup and shutdown sequences live here as well.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::StartupOptions;
use crate::connector::DeskConnector;
use crate::error::{DeskError, Result};

/// Result of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Step of the startup sequence that stopped it
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Unable to acquire control authority")]
    ControlAuthority,

    #[error("Unable to open brakes: {0}")]
    OpenBrakes(#[source] DeskError),

    #[error("Unable to home gripper: {0}")]
    HomeGripper(#[source] DeskError),

    #[error("Unable to enable FCI: {0}")]
    EnableFci(#[source] DeskError),
}

/// Outcome of each teardown step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub brakes_closed: bool,
    pub fci_disabled: bool,
    pub control_released: bool,
    pub logged_out: bool,
}

impl TeardownReport {
    pub fn all_succeeded(&self) -> bool {
        self.brakes_closed && self.fci_disabled && self.control_released && self.logged_out
    }
}

/// Exposes the arm's administrative commands
pub struct DeskHandler {
    connector: DeskConnector,
}

impl DeskHandler {
    pub fn new(connector: DeskConnector) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &DeskConnector {
        &self.connector
    }

    pub async fn acquire_control(&self, force: bool) -> CommandOutcome {
        self.acquire_control_with_cancel(force, &CancellationToken::new())
            .await
    }

    /// Acquire control authority, optionally forcing it
    pub async fn acquire_control_with_cancel(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> CommandOutcome {
        let authority = self.connector.authority();

        if self.controllable().await {
            return CommandOutcome::ok("Already has control authority");
        }

        if force {
            warn!("Forcing control authority, press the confirmation button on the arm");
        }

        match authority.request_token_with_cancel(force, cancel).await {
            Ok(true) => {
                info!("Acquired control authority");
                CommandOutcome::ok(
                    "Control authority acquired, open brakes and enable FCI to start control",
                )
            }
            Ok(false) => CommandOutcome::failed(
                "Unable to acquire control authority, robot will not respond to commands",
            ),
            Err(e) => CommandOutcome::failed(format!("Unable to acquire control authority: {}", e)),
        }
    }

    pub async fn release_control(&self) -> CommandOutcome {
        if !self.controllable().await {
            return CommandOutcome::ok("Does not have control authority");
        }
        if !self.connector.session().control_token_required() {
            return CommandOutcome::ok("Robot does not require control authority");
        }

        match self.connector.authority().release_token().await {
            Ok(()) => {
                info!("Released control authority");
                CommandOutcome::ok("Control authority released, robot will not respond to commands")
            }
            Err(_) => CommandOutcome::failed(
                "Unable to release control authority, override may be required",
            ),
        }
    }

    pub async fn enable_fci(&self) -> CommandOutcome {
        if !self.controllable().await {
            return CommandOutcome::failed("No control authority, cannot enable FCI");
        }
        match self.connector.commands().enable_fci().await {
            Ok(()) => CommandOutcome::ok("FCI enabled, external control is possible"),
            Err(_) => CommandOutcome::failed("Unable to enable FCI"),
        }
    }

    pub async fn disable_fci(&self) -> CommandOutcome {
        if !self.controllable().await {
            return CommandOutcome::failed("No control authority, cannot disable FCI");
        }
        match self.connector.commands().disable_fci().await {
            Ok(()) => CommandOutcome::ok("FCI disabled, external control prohibited"),
            Err(_) => CommandOutcome::failed("Unable to disable FCI"),
        }
    }

    pub async fn open_brakes(&self) -> CommandOutcome {
        match self.connector.commands().open_brakes().await {
            Ok(()) => {
                warn!("Brakes opened, approach the robot with caution");
                CommandOutcome::ok("Brakes opened. WARNING: approach the robot with caution")
            }
            Err(_) => CommandOutcome::failed("Unable to open brakes"),
        }
    }

    pub async fn close_brakes(&self) -> CommandOutcome {
        match self.connector.commands().close_brakes().await {
            Ok(()) => CommandOutcome::ok("Brakes closed"),
            Err(_) => CommandOutcome::failed("Unable to close brakes"),
        }
    }

    pub async fn home_gripper(&self) -> CommandOutcome {
        match self.connector.commands().home_gripper().await {
            Ok(()) => {
                info!("Gripper homing requested");
                CommandOutcome::ok("Gripper homing requested")
            }
            Err(_) => CommandOutcome::failed("Unable to home gripper"),
        }
    }

    /// Bring the arm into the configured state after connecting
    ///
    /// Stops at the first failing step.
    pub async fn startup(
        &self,
        options: &StartupOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), StartupError> {
        let session = self.connector.session();
        let authority = self.connector.authority();
        let commands = self.connector.commands();

        if session.control_token_required() {
            info!("Arm requires single point of control");
            if options.auto_acquire_control {
                if acquired(authority.request_token_with_cancel(false, cancel).await) {
                    info!("Control authority acquired");
                } else if options.force_auto_acquire {
                    warn!("Control authority not acquired, forcing; press the confirmation button on the arm");
                    if !acquired(authority.request_token_with_cancel(true, cancel).await) {
                        return Err(StartupError::ControlAuthority);
                    }
                    info!("Control authority acquired");
                } else {
                    return Err(StartupError::ControlAuthority);
                }
            }
        } else {
            info!("Arm does not require single point of control");
        }

        if options.auto_open_brakes {
            commands.open_brakes().await.map_err(StartupError::OpenBrakes)?;
            warn!("Brakes opened, approach the robot with caution");
        }

        if options.auto_home_gripper {
            commands
                .home_gripper()
                .await
                .map_err(StartupError::HomeGripper)?;
            info!("Gripper homing requested");
        }

        if options.auto_enable_fci {
            commands.enable_fci().await.map_err(StartupError::EnableFci)?;
            info!("FCI enabled, ready for external control");
        }

        Ok(())
    }

    /// Close brakes, disable FCI, release the control token and log out
    ///
    /// Every step runs regardless of earlier failures.
    pub async fn shutdown(&self) -> TeardownReport {
        let commands = self.connector.commands();
        let authority = self.connector.authority();

        let brakes_closed = report(
            commands.close_brakes().await,
            "Brakes closed",
            "Unable to close brakes",
        );
        let fci_disabled = report(
            commands.disable_fci().await,
            "FCI disabled",
            "Unable to disable FCI",
        );
        let control_released = if authority.state().token().is_some() {
            report(
                authority.release_token().await,
                "Control authority released",
                "Unable to release control authority, forced override may be required",
            )
        } else {
            true
        };
        let logged_out = report(
            self.connector.session().logout().await,
            "Logged out",
            "Unable to log out",
        );

        TeardownReport {
            brakes_closed,
            fci_disabled,
            control_released,
            logged_out,
        }
    }

    /// `can_control`, with a failed query counting as "no"
    async fn controllable(&self) -> bool {
        match self.connector.authority().can_control().await {
            Ok(can) => can,
            Err(e) => {
                warn!(error = %e, "Could not determine control authority");
                false
            }
        }
    }
}

fn acquired(result: Result<bool>) -> bool {
    match result {
        Ok(active) => active,
        Err(e) => {
            warn!(error = %e, "Control token request failed");
            false
        }
    }
}

fn report(result: Result<()>, success: &str, failure: &str) -> bool {
    match result {
        Ok(()) => {
            info!("{}", success);
            true
        }
        Err(e) => {
            error!(error = %e, "{}", failure);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::api;
    use crate::config::DeskConfig;
    use crate::testing::MockDesk;
    use crate::transport::Method;

    async fn handler(desk: &MockDesk) -> DeskHandler {
        let config = DeskConfig {
            retries: 1,
            ..DeskConfig::default()
        };
        let connector = DeskConnector::with_transport(&config, Arc::new(desk.clone()));
        connector.connect(0).await.unwrap();
        DeskHandler::new(connector)
    }

    #[tokio::test]
    async fn test_acquire_when_already_controllable() {
        let desk = MockDesk::new().with_system_version("4.0.0");
        let handler = handler(&desk).await;

        let outcome = handler.acquire_control(false).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Already has control authority");
        assert!(!desk.control_token_touched());
    }

    #[tokio::test]
    async fn test_acquire_standard_loses() {
        let desk = MockDesk::new().with_competing_holder();
        let handler = handler(&desk).await;

        let outcome = handler.acquire_control(false).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_fci_requires_authority() {
        let desk = MockDesk::new().with_competing_holder();
        let handler = handler(&desk).await;

        let outcome = handler.enable_fci().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "No control authority, cannot enable FCI");
        assert!(desk.requests_to(Method::Post, api::CONTROL_TOKEN_FCI).is_empty());
    }

    #[tokio::test]
    async fn test_release_without_authority_is_success() {
        let desk = MockDesk::new().with_competing_holder();
        let handler = handler(&desk).await;

        let outcome = handler.release_control().await;
        assert!(outcome.success);
        assert!(desk.requests_to(Method::Delete, api::CONTROL_TOKEN).is_empty());
    }

    #[tokio::test]
    async fn test_acquire_then_release() {
        let desk = MockDesk::new();
        let handler = handler(&desk).await;

        assert!(handler.acquire_control(false).await.success);
        let outcome = handler.release_control().await;
        assert!(outcome.success);
        assert_eq!(desk.requests_to(Method::Delete, api::CONTROL_TOKEN).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_falls_back_to_forced_request() {
        let desk = MockDesk::new()
            .with_competing_holder()
            .grant_forced_after(Duration::from_secs(3));
        let handler = handler(&desk).await;
        let options = StartupOptions {
            auto_acquire_control: true,
            auto_open_brakes: true,
            auto_home_gripper: true,
            auto_enable_fci: true,
            ..StartupOptions::default()
        };

        handler
            .startup(&options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(desk.brakes_open());
        assert!(desk.gripper_homed());
        assert!(desk.fci_enabled());
        let requests = desk.requests_to(Method::Post, api::CONTROL_TOKEN_REQUEST);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query, None);
        assert_eq!(requests[1].query.as_deref(), Some("force"));
    }

    #[tokio::test]
    async fn test_startup_without_force_fallback_aborts() {
        let desk = MockDesk::new().with_competing_holder();
        let handler = handler(&desk).await;
        let options = StartupOptions {
            auto_acquire_control: true,
            force_auto_acquire: false,
            auto_open_brakes: true,
            ..StartupOptions::default()
        };

        let result = handler.startup(&options, &CancellationToken::new()).await;
        assert!(matches!(result, Err(StartupError::ControlAuthority)));
        assert!(desk.requests_to(Method::Post, api::OPEN_BRAKES).is_empty());
    }

    #[tokio::test]
    async fn test_startup_stops_at_failing_step() {
        let desk = MockDesk::new().with_system_version("3.0.0");
        desk.fail_next(api::GRIPPER_HOMING, 10);
        let handler = handler(&desk).await;
        let options = StartupOptions {
            auto_open_brakes: true,
            auto_home_gripper: true,
            auto_enable_fci: true,
            ..StartupOptions::default()
        };

        let result = handler.startup(&options, &CancellationToken::new()).await;
        assert!(matches!(result, Err(StartupError::HomeGripper(_))));
        assert!(desk.brakes_open());
        assert!(!desk.fci_enabled());
    }

    #[tokio::test]
    async fn test_shutdown_runs_every_step_despite_failures() {
        let desk = MockDesk::new();
        let handler = handler(&desk).await;
        assert!(handler.acquire_control(false).await.success);
        assert!(handler.open_brakes().await.success);
        assert!(handler.enable_fci().await.success);

        desk.fail_next(api::CLOSE_BRAKES, 10);
        desk.fail_next(api::CONTROL_TOKEN_FCI, 10);

        let report = handler.shutdown().await;
        assert_eq!(
            report,
            TeardownReport {
                brakes_closed: false,
                fci_disabled: false,
                control_released: true,
                logged_out: true,
            }
        );
        assert!(!report.all_succeeded());
        assert_eq!(desk.requests_to(Method::Delete, api::CONTROL_TOKEN).len(), 1);
        assert_eq!(desk.requests_to(Method::Post, api::LOGOUT).len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_pending_token() {
        let desk = MockDesk::new().with_competing_holder();
        let handler = handler(&desk).await;
        assert!(!handler.acquire_control(false).await.success);

        let report = handler.shutdown().await;
        assert!(report.control_released);
        assert_eq!(desk.requests_to(Method::Delete, api::CONTROL_TOKEN).len(), 1);
    }
}
