//! Live guarded route: keeps a protected view mounted only while allowed.

use storefront_core::{SessionFeed, SessionState, SessionSubscription, User, UserId};

use crate::guard::{GuardDecision, RouteGuard};

/// A view that may only exist while the session is authenticated.
pub trait ProtectedView {
    /// Build the view's content for `user`.
    fn mount(&mut self, user: &User);

    /// Tear the content down.
    fn unmount(&mut self);
}

/// A protected view bound to the session feed.
///
/// Every state change is re-evaluated through the guard; the view is
/// unmounted as soon as the decision is anything but `Render`.
pub struct GuardedRoute<V: ProtectedView> {
    guard: RouteGuard,
    view: V,
    subscription: SessionSubscription,
    decision: GuardDecision,
    mounted_for: Option<UserId>,
}

impl<V: ProtectedView> GuardedRoute<V> {
    /// Bind `view` to a subscription and apply the current state.
    #[must_use]
    pub fn new(guard: RouteGuard, view: V, subscription: SessionSubscription) -> Self {
        let mut route = Self {
            guard,
            view,
            subscription,
            decision: GuardDecision::Wait,
            mounted_for: None,
        };
        let state = route.subscription.latest().clone();
        route.apply(&state);
        route
    }

    /// Bind `view` to a feed.
    #[must_use]
    pub fn from_feed(guard: RouteGuard, view: V, feed: &SessionFeed) -> Self {
        Self::new(guard, view, feed.subscribe())
    }

    /// Decision for the last state seen.
    #[must_use]
    pub const fn decision(&self) -> &GuardDecision {
        &self.decision
    }

    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted_for.is_some()
    }

    #[must_use]
    pub const fn view(&self) -> &V {
        &self.view
    }

    /// Wait for the next session change and apply it.
    ///
    /// Returns `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<&GuardDecision> {
        let state = self.subscription.changed().await?.clone();
        self.apply(&state);
        Some(&self.decision)
    }

    /// Apply every change already published, without waiting.
    ///
    /// Returns `true` if the route saw a new state.
    pub fn refresh(&mut self) -> bool {
        if !self.subscription.catch_up() {
            return false;
        }
        let state = self.subscription.latest().clone();
        self.apply(&state);
        true
    }

    fn apply(&mut self, state: &SessionState) {
        let decision = self.guard.decide(state);
        match (&decision, &state.user) {
            (GuardDecision::Render, Some(user)) => {
                if self.mounted_for.as_ref() != Some(&user.id) {
                    self.unmount();
                    self.view.mount(user);
                    self.mounted_for = Some(user.id.clone());
                }
            }
            _ => self.unmount(),
        }
        if decision != self.decision {
            tracing::debug!(?decision, "Route decision changed");
        }
        self.decision = decision;
    }

    fn unmount(&mut self) {
        if self.mounted_for.take().is_some() {
            self.view.unmount();
        }
    }
}
