//! Per-navigation access decisions.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use storefront_core::{SessionFeed, SessionState, SessionStatus};

/// Where anonymous visitors are sent by default.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// What to do with a navigation into a protected view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session is still resolving; show a neutral waiting indication.
    Wait,
    /// No session; navigate away without mounting the view.
    Redirect { to: String },
    /// Session is authenticated; render the view unchanged.
    Render,
}

/// Gate for protected views.
///
/// A pure projection of session status: it holds no session state of its
/// own, only the redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PATH)
    }
}

impl RouteGuard {
    #[must_use]
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Decide for the given session snapshot.
    #[must_use]
    pub fn decide(&self, state: &SessionState) -> GuardDecision {
        match (state.status, &state.user) {
            (SessionStatus::Uninitialized | SessionStatus::Resolving, _) => GuardDecision::Wait,
            (SessionStatus::Authenticated, Some(_)) => GuardDecision::Render,
            (SessionStatus::Authenticated | SessionStatus::Anonymous, _) => {
                GuardDecision::Redirect {
                    to: self.login_path.clone(),
                }
            }
        }
    }

    /// Stream of decisions: one for the current state, then one per change.
    #[must_use]
    pub fn decisions(
        &self,
        feed: &SessionFeed,
    ) -> futures::stream::BoxStream<'static, GuardDecision> {
        let guard = self.clone();
        feed.stream().map(move |state| guard.decide(&state)).boxed()
    }
}
