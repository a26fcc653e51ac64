//! Desk Client Library
//!
//! Client for the administrative web service ("Desk") of a robotic arm:
//! logs in, negotiates single point of control where the firmware requires
//! it, and issues the privileged commands that must precede external control
//! (brakes, gripper homing, FCI).
//!
//! # Example
//!
//! ```rust,no_run
//! use desk_client::{DeskConfig, DeskConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DeskConfig {
//!         host: "172.16.0.2".to_string(),
//!         password: "<hash from the Desk login request>".to_string(),
//!         ..DeskConfig::default()
//!     };
//!     let connector = DeskConnector::new(&config)?;
//!     connector.connect(20).await?;
//!
//!     if !connector.authority().can_control().await? {
//!         // waits for the confirmation button on the arm if someone else holds control
//!         connector.authority().request_token(true).await?;
//!     }
//!
//!     connector.commands().open_brakes().await?;
//!     connector.commands().enable_fci().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides an in-process mock of the service:
//!
//! ```rust,ignore
//! use desk_client::testing::{MockDesk, TestServer};
//!
//! let desk = MockDesk::new().with_competing_holder();
//! let connector = DeskConnector::with_transport(&DeskConfig::default(), Arc::new(desk.clone()));
//! // or over HTTP
//! let server = TestServer::start(desk.router()).await?;
//! ```

pub mod api;
mod authority;
mod commands;
mod config;
mod connector;
mod error;
mod handler;
mod http;
mod retry;
mod session;
pub mod testing;
mod transport;
mod version;

pub use authority::{
    ControlAuthority, ControlState, ControlToken, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
pub use commands::ArmCommands;
pub use config::{DeskConfig, StartupOptions};
pub use connector::DeskConnector;
pub use error::{DeskError, Result};
pub use handler::{CommandOutcome, DeskHandler, StartupError, TeardownReport};
pub use http::HttpTransport;
pub use retry::{RetryingCaller, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRIES};
pub use session::{Session, SessionManager, DEFAULT_LOGIN_RETRIES};
pub use transport::{
    DeskRequest, DeskResponse, HeaderState, Method, SessionHeaders, Transport, TransportError,
    AUTHORIZATION_COOKIE, CONTROL_TOKEN_HEADER,
};
pub use version::{parse_system_version, FirmwareVersion, CONTROL_TOKEN_MIN_VERSION};

// Re-export the cancellation handle used by forced requests
pub use tokio_util::sync::CancellationToken;
