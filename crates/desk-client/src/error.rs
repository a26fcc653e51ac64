//! Error types for Desk client operations

use thiserror::Error;

/// Result type alias for Desk client operations
pub type Result<T> = std::result::Result<T, DeskError>;

/// Errors that can occur while talking to the Desk service
///
/// The service does not distinguish a rejected request from a timeout or a
/// dropped connection, so every failed call ends up as [`DeskError::RequestFailed`]
/// once its retries are exhausted.
#[derive(Error, Debug)]
pub enum DeskError {
    /// All attempts of a request failed
    #[error("Request to {path} failed after {attempts} attempt(s)")]
    RequestFailed { path: String, attempts: u32 },

    /// A successful response had a body we could not understand
    #[error("Invalid response from {path}: {message}")]
    InvalidResponse { path: String, message: String },

    /// The system version string could not be parsed
    #[error("Invalid system version: {0:?}")]
    InvalidVersion(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeskError {
    /// Create an invalid-response error for the given endpoint
    pub fn invalid_response(path: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidResponse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
