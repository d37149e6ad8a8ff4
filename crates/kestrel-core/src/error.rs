//! Error types for Kestrel.

use thiserror::Error;

/// Core error type for all Kestrel operations.
#[derive(Error, Debug)]
pub enum KestrelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-2xx HTTP status or a provider error payload.
    #[error("API error: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// A success response with an unexpected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A completion request is already in flight")]
    RequestInFlight,
}

pub type Result<T> = std::result::Result<T, KestrelError>;
