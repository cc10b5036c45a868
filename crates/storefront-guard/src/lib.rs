//! Route access guard for protected views.
//!
//! Provides:
//! - `RouteGuard` - Wait / redirect / render decision per navigation
//! - `GuardedRoute` - Live subscriber that mounts and unmounts a view

pub mod guard;
pub mod route;

pub use guard::{DEFAULT_LOGIN_PATH, GuardDecision, RouteGuard};
pub use route::{GuardedRoute, ProtectedView};
