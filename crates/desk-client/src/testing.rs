//! Test utilities for desk-client
//!
//! [`MockDesk`] emulates the administrative API of an arm well enough to run
//! the whole login / control token / command flow. Use it directly as a
//! [`Transport`] (no sockets, works with a paused tokio clock) or serve it
//! over HTTP with [`TestServer`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::COOKIE, HeaderMap, StatusCode, Uri};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::api;
use crate::config::DeskConfig;
use crate::error::Result;
use crate::transport::{
    DeskRequest, DeskResponse, Method, SessionHeaders, Transport, TransportError,
    AUTHORIZATION_COOKIE, CONTROL_TOKEN_HEADER,
};
use crate::version::parse_system_version;

/// Credential handed out by a default [`MockDesk`]
pub const MOCK_CREDENTIAL: &str = "mock-credential";
/// Token id of the simulated competing client
pub const COMPETITOR_TOKEN_ID: u64 = 999;
const COMPETITOR_TOKEN: &str = "competitor-token";

/// A request as seen by the mock service
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub control_token: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct Holder {
    id: u64,
    token: String,
    owned_by: String,
}

#[derive(Debug)]
struct PendingForce {
    holder: Holder,
    /// When the operator "presses the button"; `None` means never
    active_at: Option<Instant>,
}

#[derive(Debug)]
struct DeskState {
    credential: String,
    system_version_body: String,
    token_force_timeout: f64,
    forced_grant_delay: Option<Duration>,
    next_token_id: u64,
    active: Option<Holder>,
    pending: Option<PendingForce>,
    failures: HashMap<String, u32>,
    unreachable: bool,
    brakes_open: bool,
    fci_enabled: bool,
    gripper_homed: bool,
    requests: Vec<RecordedRequest>,
}

impl Default for DeskState {
    fn default() -> Self {
        Self {
            credential: MOCK_CREDENTIAL.to_string(),
            system_version_body: version_body("4.2.1"),
            token_force_timeout: 30.0,
            forced_grant_delay: None,
            next_token_id: 1,
            active: None,
            pending: None,
            failures: HashMap::new(),
            unreachable: false,
            brakes_open: false,
            fci_enabled: false,
            gripper_homed: false,
            requests: Vec::new(),
        }
    }
}

impl DeskState {
    /// Promote a pending forced token once the button was pressed or the
    /// previous holder went away
    fn resolve_pending(&mut self) {
        let due = match &self.pending {
            Some(pending) => {
                self.active.is_none()
                    || pending.active_at.is_some_and(|at| Instant::now() >= at)
            }
            None => false,
        };
        if due {
            if let Some(pending) = self.pending.take() {
                self.active = Some(pending.holder);
            }
        }
    }

    fn token_required(&self) -> bool {
        parse_system_version(&self.system_version_body)
            .map(|(_, v)| v.requires_control_token())
            .unwrap_or(true)
    }

    fn authorizes(&self, token: Option<&str>) -> bool {
        if !self.token_required() {
            return true;
        }
        match (&self.active, token) {
            (Some(active), Some(token)) => active.token == token,
            _ => false,
        }
    }
}

fn version_body(version: &str) -> String {
    format!("\"{}\\nmock-build\"", version)
}

fn body_token(request: &DeskRequest) -> Option<&str> {
    request
        .body
        .as_ref()
        .and_then(|b| b.get("token"))
        .and_then(Value::as_str)
}

/// In-process stand-in for the Desk web service of one arm
#[derive(Debug, Clone, Default)]
pub struct MockDesk {
    state: Arc<Mutex<DeskState>>,
}

impl MockDesk {
    /// Firmware 4.2.1, nobody holding control, forced requests never confirmed
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_version(self, version: &str) -> Self {
        self.state.lock().system_version_body = version_body(version);
        self
    }

    /// Raw body returned by the system version endpoint
    pub fn with_system_version_body(self, body: &str) -> Self {
        self.state.lock().system_version_body = body.to_string();
        self
    }

    pub fn with_credential(self, credential: &str) -> Self {
        self.state.lock().credential = credential.to_string();
        self
    }

    /// `tokenForceTimeout` reported by the safety endpoint, in seconds
    pub fn with_force_timeout(self, seconds: f64) -> Self {
        self.state.lock().token_force_timeout = seconds;
        self
    }

    /// Confirm forced requests `delay` after they are made
    pub fn grant_forced_after(self, delay: Duration) -> Self {
        self.state.lock().forced_grant_delay = Some(delay);
        self
    }

    /// Start with another client holding control
    pub fn with_competing_holder(self) -> Self {
        self.set_competing_holder(true);
        self
    }

    /// Let another client take control, or make it leave
    pub fn set_competing_holder(&self, present: bool) {
        let mut state = self.state.lock();
        if present {
            state.active = Some(Holder {
                id: COMPETITOR_TOKEN_ID,
                token: COMPETITOR_TOKEN.to_string(),
                owned_by: "competitor".to_string(),
            });
        } else if state
            .active
            .as_ref()
            .is_some_and(|h| h.id == COMPETITOR_TOKEN_ID)
        {
            state.active = None;
        }
    }

    pub fn has_competing_holder(&self) -> bool {
        let mut state = self.state.lock();
        state.resolve_pending();
        state
            .active
            .as_ref()
            .is_some_and(|h| h.id == COMPETITOR_TOKEN_ID)
    }

    /// Answer the next `count` requests to `path` with 503
    pub fn fail_next(&self, path: &str, count: u32) {
        self.state.lock().failures.insert(path.to_string(), count);
    }

    /// Simulate the arm dropping off the network
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    /// Whether any request touched the control token endpoints
    pub fn control_token_touched(&self) -> bool {
        self.state
            .lock()
            .requests
            .iter()
            .any(|r| r.path.starts_with(api::CONTROL_TOKEN))
    }

    pub fn brakes_open(&self) -> bool {
        self.state.lock().brakes_open
    }

    pub fn fci_enabled(&self) -> bool {
        self.state.lock().fci_enabled
    }

    pub fn gripper_homed(&self) -> bool {
        self.state.lock().gripper_homed
    }

    /// Axum router serving this mock over HTTP
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .fallback(serve_request)
            .with_state(self.clone())
    }

    /// Record a request; returns false when the mock is unreachable
    fn record(&self, request: &DeskRequest, headers: &SessionHeaders) -> bool {
        let mut state = self.state.lock();
        state.requests.push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            authorization: headers.authorization.clone(),
            control_token: headers.control_token.clone(),
            body: request.body.clone(),
        });
        !state.unreachable
    }

    fn respond(&self, request: &DeskRequest, headers: &SessionHeaders) -> DeskResponse {
        let mut state = self.state.lock();

        if let Some(remaining) = state.failures.get_mut(&request.path) {
            if *remaining > 0 {
                *remaining -= 1;
                return DeskResponse::new(503, "");
            }
        }

        if request.path != api::LOGIN
            && headers.authorization.as_deref() != Some(state.credential.as_str())
        {
            return DeskResponse::new(401, "");
        }

        state.resolve_pending();

        match (request.method, request.path.as_str()) {
            (Method::Post, api::LOGIN) => DeskResponse::new(200, state.credential.clone()),
            (Method::Post, api::LOGOUT) => DeskResponse::new(200, ""),
            (Method::Get, api::SYSTEM_VERSION) => {
                DeskResponse::new(200, state.system_version_body.clone())
            }
            (Method::Get, api::SAFETY) => DeskResponse::new(
                200,
                json!({ "tokenForceTimeout": state.token_force_timeout }).to_string(),
            ),
            (Method::Post, api::CONTROL_TOKEN_REQUEST) => {
                let id = state.next_token_id;
                state.next_token_id += 1;
                let holder = Holder {
                    id,
                    token: format!("token-{}", id),
                    owned_by: request
                        .body
                        .as_ref()
                        .and_then(|b| b.get("requestedBy"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                };
                let issued = json!({ "token": holder.token, "id": holder.id }).to_string();

                if state.active.is_none() {
                    state.active = Some(holder);
                } else if request.query.as_deref() == Some(api::FORCE_QUERY) {
                    let active_at = state.forced_grant_delay.map(|d| Instant::now() + d);
                    state.pending = Some(PendingForce { holder, active_at });
                }
                DeskResponse::new(200, issued)
            }
            (Method::Get, api::CONTROL_TOKEN) => {
                let active = state
                    .active
                    .as_ref()
                    .map(|h| json!({ "id": h.id, "ownedBy": h.owned_by }));
                DeskResponse::new(200, json!({ "activeToken": active }).to_string())
            }
            (Method::Delete, api::CONTROL_TOKEN) => {
                let token = body_token(request).unwrap_or_default().to_string();
                if state.active.as_ref().is_some_and(|h| h.token == token) {
                    state.active = None;
                }
                if state
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.holder.token == token)
                {
                    state.pending = None;
                }
                state.resolve_pending();
                DeskResponse::new(200, "")
            }
            (Method::Post | Method::Delete, api::CONTROL_TOKEN_FCI) => {
                if !state.authorizes(body_token(request)) {
                    return DeskResponse::new(403, "");
                }
                state.fci_enabled = request.method == Method::Post;
                DeskResponse::new(200, "")
            }
            (Method::Post, api::OPEN_BRAKES) | (Method::Post, api::CLOSE_BRAKES) => {
                if !state.authorizes(headers.control_token.as_deref()) {
                    return DeskResponse::new(403, "");
                }
                state.brakes_open = request.path == api::OPEN_BRAKES;
                DeskResponse::new(200, "")
            }
            (Method::Post, api::GRIPPER_HOMING) => {
                state.gripper_homed = true;
                DeskResponse::new(200, "")
            }
            _ => DeskResponse::new(404, ""),
        }
    }
}

#[async_trait]
impl Transport for MockDesk {
    async fn execute(
        &self,
        request: &DeskRequest,
        headers: &SessionHeaders,
        _timeout: Duration,
    ) -> std::result::Result<DeskResponse, TransportError> {
        if !self.record(request, headers) {
            return Err(TransportError::Connection("mock desk unreachable".to_string()));
        }
        Ok(self.respond(request, headers))
    }
}

async fn serve_request(
    State(desk): State<MockDesk>,
    method: axum::http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let method = match method {
        axum::http::Method::GET => Method::Get,
        axum::http::Method::POST => Method::Post,
        axum::http::Method::DELETE => Method::Delete,
        _ => return (StatusCode::METHOD_NOT_ALLOWED, String::new()),
    };

    let mut request = DeskRequest::new(method, uri.path());
    if let Some(query) = uri.query() {
        request = request.with_query(query);
    }
    if !body.is_empty() {
        match serde_json::from_slice(&body) {
            Ok(value) => request.body = Some(value),
            Err(_) => return (StatusCode::BAD_REQUEST, String::new()),
        }
    }

    let session = SessionHeaders {
        authorization: headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| {
                cookies.split(';').find_map(|c| {
                    c.trim()
                        .strip_prefix(AUTHORIZATION_COOKIE)
                        .and_then(|rest| rest.strip_prefix('='))
                        .map(String::from)
                })
            }),
        control_token: headers
            .get(CONTROL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    };

    if !desk.record(&request, &session) {
        return (StatusCode::SERVICE_UNAVAILABLE, String::new());
    }
    let response = desk.respond(&request, &session);
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response.body)
}

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on a random local port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use desk_client::testing::{MockDesk, TestServer};
    ///
    /// let desk = MockDesk::new();
    /// let server = TestServer::start(desk.router()).await?;
    /// let connector = DeskConnector::new(&server.config())?;
    /// ```
    pub async fn start(router: axum::Router) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// `host:port` of the server
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Connector configuration pointing at this server over plain HTTP
    pub fn config(&self) -> DeskConfig {
        DeskConfig {
            host: self.host(),
            scheme: "http".to_string(),
            request_timeout_secs: 2.0,
            poll_interval_ms: 50,
            ..DeskConfig::default()
        }
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
