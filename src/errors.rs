/*!
 * Error types for the ambisent application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 *
 * Remote failures are split into transient ones (worth another attempt) and
 * everything else. Input problems such as a missing table or a template without
 * a placeholder surface as `AppError` and stop a run before any request is sent.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Server-side failure (HTTP 5xx)
    #[error("Server error: {status_code} - {message}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error returned by the API itself (non-5xx)
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The call did not finish within the configured timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The API answered successfully but without any text
    #[error("API returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Classify an unsuccessful HTTP status into the matching error variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            500..=599 => Self::ServerError { status_code, message },
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Whether the failure is expected to clear up on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. }
                | Self::ConnectionError(_)
                | Self::Timeout(_)
                | Self::RateLimitExceeded(_)
        )
    }

    /// Map a transport-level reqwest failure, given the client's timeout
    pub fn from_transport(error: reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Prompt template is unusable
    #[error("Template error: {0}")]
    Template(String),

    /// Configuration is inconsistent or incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table could not be read or written
    #[error("CSV error: {0}")]
    Csv(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(error: csv::Error) -> Self {
        if let csv::ErrorKind::Io(io_error) = error.kind() {
            return Self::File(io_error.to_string());
        }
        Self::Csv(error.to_string())
    }
}
