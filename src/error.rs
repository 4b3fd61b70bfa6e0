//! # Error Types
//!
//! Custom error types for VLM Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for VLM Bridge
#[derive(Debug, Error)]
pub enum VlmBridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors (connection, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Race service answered with a non-success status
    #[error("Race service returned HTTP {status} {reason}")]
    Transport { status: u16, reason: String },

    /// Response body did not have the expected shape
    #[error("Malformed race service response: {0}")]
    MalformedResponse(String),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A round trip task panicked or was cancelled
    #[error("Round trip task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Race service refused a waypoint
    #[error("Waypoint rejected: {0}")]
    WaypointRejected(String),
}

impl VlmBridgeError {
    /// Whether the next scheduled ingest may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::WaypointRejected(_))
    }
}

/// Result type alias for VLM Bridge
pub type Result<T> = std::result::Result<T, VlmBridgeError>;
