//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::transport::{
    DeskRequest, DeskResponse, SessionHeaders, Transport, TransportError, AUTHORIZATION_COOKIE,
    CONTROL_TOKEN_HEADER,
};

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport talking to the Desk web server of one arm
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for `https://<host>`
    pub fn new(host: &str) -> Result<Self> {
        Self::with_scheme("https", host)
    }

    /// Create a transport with an explicit scheme (plain `http` is only useful
    /// against test servers)
    pub fn with_scheme(scheme: &str, host: &str) -> Result<Self> {
        // The controller presents a self-signed certificate
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        let base_url = Url::parse(&format!("{}://{}", scheme, host))?;
        debug!(%base_url, "Desk transport created");

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &DeskRequest) -> std::result::Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError::Request(format!("Invalid path {}: {}", request.path, e)))?;
        url.set_query(request.query.as_deref());
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &DeskRequest,
        headers: &SessionHeaders,
        timeout: Duration,
    ) -> std::result::Result<DeskResponse, TransportError> {
        let url = self.url_for(request)?;

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .timeout(timeout);

        if let Some(credential) = &headers.authorization {
            builder = builder.header(COOKIE, format!("{}={}", AUTHORIZATION_COOKIE, credential));
        }
        if let Some(token) = &headers.control_token {
            builder = builder.header(CONTROL_TOKEN_HEADER, token.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(DeskResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::new("192.168.0.1").unwrap();
        assert_eq!(transport.base_url().as_str(), "https://192.168.0.1/");
    }

    #[test]
    fn test_invalid_host() {
        assert!(HttpTransport::new("not a host").is_err());
    }

    #[test]
    fn test_url_with_force_flag() {
        let transport = HttpTransport::with_scheme("http", "127.0.0.1:8080").unwrap();
        let request = DeskRequest::post("/admin/api/control-token/request").with_query("force");
        let url = transport.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/admin/api/control-token/request?force"
        );
    }
}
