//! Session error types.

use storefront_core::{StorageError, TransportError};
use thiserror::Error;

/// Error returned by `login` and `register`.
///
/// Every variant leaves the session exactly as it was before the call.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server rejected the credentials (non-2xx).
    #[error("{message}")]
    Authentication { status: u16, message: String },
    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// A 2xx response without a usable token and user.
    #[error("Malformed auth response: {0}")]
    MalformedResponse(String),
    /// Persisting the new session failed; nothing was kept.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Another login or register call is still waiting for the server.
    #[error("An authentication request is already in flight")]
    InFlight,
}

impl SessionError {
    /// Whether this is a rejection by the server, as opposed to a local or
    /// network failure.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::MalformedResponse(_))
    }
}
