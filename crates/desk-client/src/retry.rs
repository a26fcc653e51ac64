//! Bounded-retry wrapper around a [`Transport`]

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DeskError, Result};
use crate::transport::{DeskRequest, DeskResponse, HeaderState, Transport};

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 5;
/// Default per-attempt timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues a request up to `retries + 1` times until the service answers 200
///
/// Every attempt picks up the current [`HeaderState`] snapshot, so a
/// credential or token that changes between attempts is honored.
pub struct RetryingCaller {
    transport: Arc<dyn Transport>,
    headers: Arc<HeaderState>,
    timeout: Duration,
    backoff: Duration,
    default_retries: u32,
}

impl RetryingCaller {
    pub fn new(transport: Arc<dyn Transport>, headers: Arc<HeaderState>) -> Self {
        Self {
            transport,
            headers,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff: Duration::ZERO,
            default_retries: DEFAULT_RETRIES,
        }
    }

    /// Per-attempt timeout handed to the transport
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fixed pause between failed attempts
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Retry count used by [`RetryingCaller::send`]
    pub fn with_default_retries(mut self, retries: u32) -> Self {
        self.default_retries = retries;
        self
    }

    pub fn default_retries(&self) -> u32 {
        self.default_retries
    }

    pub fn headers(&self) -> &Arc<HeaderState> {
        &self.headers
    }

    /// Call with the default retry count
    pub async fn send(&self, request: &DeskRequest) -> Result<DeskResponse> {
        self.call(request, self.default_retries).await
    }

    /// Call with an explicit retry count
    ///
    /// Non-200 statuses, timeouts and connection errors all count as one
    /// failed attempt; the caller only learns that the request failed.
    pub async fn call(&self, request: &DeskRequest, retries: u32) -> Result<DeskResponse> {
        let attempts = retries.saturating_add(1);

        for attempt in 1..=attempts {
            let headers = self.headers.snapshot();
            match self.transport.execute(request, &headers, self.timeout).await {
                Ok(response) if response.is_ok() => {
                    debug!(method = %request.method, path = %request.path, attempt, "Request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    debug!(
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        status = response.status,
                        "Request rejected"
                    );
                }
                Err(e) => {
                    debug!(method = %request.method, path = %request.path, attempt, error = %e, "Request failed");
                }
            }

            if attempt < attempts && !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff).await;
            }
        }

        warn!(method = %request.method, path = %request.path, attempts, "Giving up on request");
        Err(DeskError::RequestFailed {
            path: request.path.clone(),
            attempts,
        })
    }
}
