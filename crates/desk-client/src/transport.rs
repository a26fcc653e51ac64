//! Transport seam between the Desk client and the wire
//!
//! Everything above this module speaks in [`DeskRequest`] / [`DeskResponse`];
//! the concrete transport decides how those travel. [`crate::HttpTransport`]
//! is the production implementation and [`crate::testing::MockDesk`] an
//! in-process one for tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

/// Name of the header carrying the control token
pub const CONTROL_TOKEN_HEADER: &str = "X-Control-Token";

/// Name of the cookie carrying the authorization credential
pub const AUTHORIZATION_COOKIE: &str = "authorization";

/// HTTP method of a Desk request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single logical request against the Desk service
#[derive(Debug, Clone, PartialEq)]
pub struct DeskRequest {
    pub method: Method,
    /// Absolute path, e.g. `/admin/api/login`
    pub path: String,
    /// Raw query string without the leading `?` (the forced token request
    /// uses a bare `force` flag)
    pub query: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl DeskRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a raw query string
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Status and body text of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskResponse {
    pub status: u16,
    pub body: String,
}

impl DeskResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Session-scoped values attached to every outgoing request
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionHeaders {
    /// Authorization credential sent as the `authorization` cookie
    pub authorization: Option<String>,
    /// Control token sent as the `X-Control-Token` header
    pub control_token: Option<String>,
}

// Credentials stay out of logs.
impl fmt::Debug for SessionHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHeaders")
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("control_token", &self.control_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Shared, copy-on-write holder for [`SessionHeaders`]
///
/// Writers replace the whole snapshot, so a request that already took a
/// snapshot keeps a consistent pair of credential and token even if the
/// token is swapped while it is in flight.
#[derive(Debug, Default)]
pub struct HeaderState {
    current: RwLock<Arc<SessionHeaders>>,
}

impl HeaderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current headers
    pub fn snapshot(&self) -> Arc<SessionHeaders> {
        self.current.read().clone()
    }

    pub fn set_authorization(&self, credential: impl Into<String>) {
        let credential = credential.into();
        self.update(|headers| headers.authorization = Some(credential));
    }

    pub fn set_control_token(&self, token: Option<String>) {
        self.update(|headers| headers.control_token = token);
    }

    fn update(&self, f: impl FnOnce(&mut SessionHeaders)) {
        let mut current = self.current.write();
        let mut next = SessionHeaders::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
    }
}

/// Failure of a single request attempt
///
/// The retry layer treats all variants the same way; the split only exists
/// for log output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Performs one request attempt against the Desk service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` with the given session headers and wait at most
    /// `timeout` for the response
    async fn execute(
        &self,
        request: &DeskRequest,
        headers: &SessionHeaders,
        timeout: Duration,
    ) -> Result<DeskResponse, TransportError>;
}
