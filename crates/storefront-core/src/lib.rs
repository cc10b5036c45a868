//! Core abstractions for the storefront session.
//!
//! This crate provides the fundamental building blocks:
//! - `User` / `Credential` - Identity and bearer token
//! - `SessionState` - The view-facing projection of the session
//! - `SessionFeed` - Snapshot + broadcast for live subscribers
//! - Persistence and transport traits

pub mod feed;
pub mod traits;
pub mod user;

pub use feed::{SessionFeed, SessionSubscription};
pub use traits::{
    AUTHORIZATION, ApiRequest, ApiResponse, ApiTransport, KeyValueStore, SessionState,
    SessionStatus, StorageError, TransportError,
};
pub use user::{Credential, User, UserId};
