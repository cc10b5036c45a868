//! Session status and collaborator traits for persistence and HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{Credential, User};

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No store has been created yet.
    Uninitialized,
    /// Startup restore is in progress.
    Resolving,
    /// A user and credential are installed.
    Authenticated,
    /// No user is signed in.
    Anonymous,
}

impl SessionStatus {
    /// Whether startup restore has finished.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Authenticated | Self::Anonymous)
    }
}

/// What views are allowed to see of the session.
///
/// `user` is `Some` exactly when `status` is `Authenticated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub user: Option<User>,
}

impl SessionState {
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            user: None,
        }
    }

    #[must_use]
    pub const fn resolving() -> Self {
        Self {
            status: SessionStatus::Resolving,
            user: None,
        }
    }

    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            user: None,
        }
    }

    #[must_use]
    pub const fn authenticated(user: User) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::uninitialized()
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Key-value persistence used for the credential and user record.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Absent keys yield `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Transport error.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid header value for {0}")]
    InvalidHeader(String),
    #[error("Response decode failed: {0}")]
    Decode(String),
}

/// Name of the header carrying the bearer credential.
pub const AUTHORIZATION: &str = "Authorization";

/// Outbound POST request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Path relative to the API base URL, e.g. `/auth/login`.
    pub path: String,
    /// JSON body.
    pub body: Value,
    /// Credential for this request only, overriding the default header.
    pub bearer: Option<Credential>,
}

impl ApiRequest {
    /// Create a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
            bearer: None,
        }
    }

    /// Authorize only this request with the given credential.
    #[must_use]
    pub fn with_bearer(mut self, credential: Credential) -> Self {
        self.bearer = Some(credential);
        self
    }
}

/// Raw response: HTTP status and decoded JSON body (`Null` when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Server-provided `message` field, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
    }
}

/// Outbound-request collaborator.
///
/// Default headers are shared by every later request made through the same
/// transport. The session store is their only writer.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Send a POST request. Non-2xx statuses are returned, not raised.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Install a default header applied to all future requests.
    ///
    /// # Errors
    /// Returns error if the name or value is not a valid header.
    fn set_default_header(&self, name: &str, value: &str) -> Result<(), TransportError>;

    /// Remove a default header.
    fn remove_default_header(&self, name: &str);

    /// Current value of a default header.
    fn default_header(&self, name: &str) -> Option<String>;
}
