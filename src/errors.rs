/*!
 * Error types for the yacap application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when calling a caption provider
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
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

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// No API key configured for the selected provider
    #[error("Missing API key for {0}")]
    MissingCredential(String),

    /// The image payload has a MIME type the provider cannot accept
    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// The provider refused to answer because of its safety filters
    #[error("Content blocked by provider: {0}")]
    ContentBlocked(String),
}

impl ProviderError {
    /// HTTP status attached to the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            Self::RateLimitExceeded(_) => Some(429),
            _ => None,
        }
    }
}

/// Errors returned by the item store for rejected user actions
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// No item with this id
    #[error("Item not found: {0}")]
    NotFound(Uuid),

    /// The item is being captioned or translated
    #[error("Item {0} is busy and cannot be edited")]
    InFlight(Uuid),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the item store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

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
