//! Session store and persistence for the storefront client.
//!
//! Provides:
//! - `SessionStore` - Establish, restore and end the user session
//! - Storage implementations (memory, JSON file)

pub mod config;
pub mod error;
pub mod storage;
pub mod store;

pub use config::SessionConfig;
pub use error::SessionError;
pub use store::{RestoreOutcome, SessionStore};
