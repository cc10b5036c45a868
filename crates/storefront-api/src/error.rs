//! API client errors.

use storefront_core::TransportError;
use thiserror::Error;

/// Error returned by the typed API helpers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid client configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Response decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status for `Status` errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
