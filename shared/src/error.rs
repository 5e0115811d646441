//! Error types for the occupancy assistant Lambda functions.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the occupancy assistant Lambda functions.
#[derive(Error, Debug)]
pub enum Error {
    /// Supabase RPC or table request failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Bedrock invocation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Reference document could not be fetched
    #[error("Document error: {0}")]
    Document(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// User-facing message for this error. Internal details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            Error::Validation(m) | Error::NotFound(m) => m.clone(),
            _ => "An internal error occurred.".to_string(),
        }
    }
}
