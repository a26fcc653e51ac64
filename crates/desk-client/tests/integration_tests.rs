//! Integration tests for desk-client
//!
//! Most tests run the real reqwest transport against `MockDesk` served over
//! HTTP on a random local port. The long forced-acquisition scenario runs
//! in-process on a paused clock instead.

use std::sync::Arc;
use std::time::Duration;

use desk_client::api;
use desk_client::testing::{MockDesk, TestServer, MOCK_CREDENTIAL};
use desk_client::{
    CancellationToken, ControlState, DeskConfig, DeskConnector, DeskHandler, Method,
    StartupOptions,
};

async fn serve(desk: &MockDesk) -> (TestServer, DeskConnector) {
    let server = TestServer::start(desk.router()).await.unwrap();
    let connector = DeskConnector::new(&server.config()).unwrap();
    (server, connector)
}

// =============================================================================
// Session
// =============================================================================

#[tokio::test]
async fn test_connect_over_http() {
    let desk = MockDesk::new().with_system_version("4.2.0");
    let (_server, connector) = serve(&desk).await;

    connector.connect(0).await.unwrap();

    let session = connector.session().session();
    assert!(session.authenticated);
    assert!(session.has_credential);
    assert_eq!(session.version.as_deref(), Some("4.2.0"));
    assert!(session.control_token_required);

    // the credential travels back as the authorization cookie
    let requests = desk.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, api::LOGIN);
    assert_eq!(requests[0].authorization, None);
    assert_eq!(requests[1].path, api::SYSTEM_VERSION);
    assert_eq!(requests[1].authorization.as_deref(), Some(MOCK_CREDENTIAL));
}

#[tokio::test]
async fn test_connect_retries_through_transient_failures() {
    let desk = MockDesk::new();
    desk.fail_next(api::LOGIN, 3);
    let (_server, connector) = serve(&desk).await;

    assert!(connector.connect(2).await.is_err());
    assert_eq!(desk.requests_to(Method::Post, api::LOGIN).len(), 3);

    desk.fail_next(api::LOGIN, 3);
    connector.connect(3).await.unwrap();
    assert_eq!(desk.requests_to(Method::Post, api::LOGIN).len(), 7);
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let server = TestServer::start(MockDesk::new().router()).await.unwrap();
    let config = server.config();
    server.shutdown().await;

    let connector = DeskConnector::new(&config).unwrap();
    assert!(connector.connect(1).await.is_err());
    assert!(!connector.session().is_authenticated());
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[tokio::test]
async fn test_old_firmware_opens_brakes_without_control_token() {
    let desk = MockDesk::new().with_system_version("3.0.0");
    let (_server, connector) = serve(&desk).await;

    connector.connect(0).await.unwrap();
    assert!(!connector.session().control_token_required());
    assert!(connector.authority().can_control().await.unwrap());

    connector.commands().open_brakes().await.unwrap();

    assert!(desk.brakes_open());
    assert!(!desk.control_token_touched());
}

#[tokio::test(start_paused = true)]
async fn test_contested_control_forced_then_fci() {
    let desk = MockDesk::new()
        .with_system_version("4.3.1")
        .with_competing_holder()
        .with_force_timeout(30.0)
        .grant_forced_after(Duration::from_secs(5));
    let connector = DeskConnector::with_transport(&DeskConfig::default(), Arc::new(desk.clone()));

    connector.connect(0).await.unwrap();
    assert!(connector.session().control_token_required());

    assert!(!connector.authority().request_token(false).await.unwrap());
    assert!(matches!(connector.authority().state(), ControlState::Held(_)));

    let start = tokio::time::Instant::now();
    assert!(connector.authority().request_token(true).await.unwrap());
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() < Duration::from_secs(30));

    connector.commands().enable_fci().await.unwrap();
    assert!(desk.fci_enabled());
}

#[tokio::test]
async fn test_forced_acquisition_over_http() {
    let desk = MockDesk::new()
        .with_competing_holder()
        .with_force_timeout(2.0)
        .grant_forced_after(Duration::from_millis(300));
    let (_server, connector) = serve(&desk).await;
    connector.connect(0).await.unwrap();

    assert!(connector.authority().request_token(true).await.unwrap());
    assert!(matches!(connector.authority().state(), ControlState::Active(_)));

    let forced = &desk.requests_to(Method::Post, api::CONTROL_TOKEN_REQUEST)[0];
    assert_eq!(forced.query.as_deref(), Some("force"));

    // brakes need the token header once control is required
    connector.commands().open_brakes().await.unwrap();
    let open = &desk.requests_to(Method::Post, api::OPEN_BRAKES)[0];
    assert_eq!(open.control_token, connector.authority().token_value());
}

#[tokio::test]
async fn test_forced_acquisition_timeout_over_http() {
    let desk = MockDesk::new()
        .with_competing_holder()
        .with_force_timeout(0.5);
    let (_server, connector) = serve(&desk).await;
    connector.connect(0).await.unwrap();

    let start = std::time::Instant::now();
    assert!(!connector.authority().request_token(true).await.unwrap());
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(matches!(connector.authority().state(), ControlState::Held(_)));

    // the stale token can still be released
    connector.authority().release_token().await.unwrap();
    assert_eq!(connector.authority().state(), ControlState::NoToken);
    assert!(desk.has_competing_holder());
}

// =============================================================================
// Handler lifecycle
// =============================================================================

#[tokio::test]
async fn test_startup_and_shutdown_over_http() {
    let desk = MockDesk::new();
    let (_server, connector) = serve(&desk).await;
    connector.connect(0).await.unwrap();
    let handler = DeskHandler::new(connector);

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

    let report = handler.shutdown().await;
    assert!(report.all_succeeded());
    assert!(!desk.brakes_open());
    assert!(!desk.fci_enabled());
    assert!(!handler.connector().session().is_authenticated());
}

#[tokio::test]
async fn test_command_surface_reports_outcomes() {
    let desk = MockDesk::new().with_competing_holder();
    let (_server, connector) = serve(&desk).await;
    connector.connect(0).await.unwrap();
    let handler = DeskHandler::new(connector);

    let enable = handler.enable_fci().await;
    assert!(!enable.success);

    let acquire = handler.acquire_control(false).await;
    assert!(!acquire.success);

    desk.set_competing_holder(false);
    let acquire = handler.acquire_control(false).await;
    assert!(acquire.success, "{}", acquire.message);

    assert!(handler.enable_fci().await.success);
    assert!(handler.disable_fci().await.success);
    assert!(handler.release_control().await.success);
}
