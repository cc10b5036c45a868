//! Latest-value broadcast of session state.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::BroadcastStream;

use crate::SessionState;

/// Buffered updates per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Session state feed with snapshot and broadcast support.
///
/// New subscribers receive the current snapshot, then every later change.
/// A snapshot and its broadcast are published under one lock, so no
/// subscriber can observe them out of order.
pub struct SessionFeed {
    current: RwLock<SessionState>,
    sender: broadcast::Sender<SessionState>,
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

impl SessionFeed {
    /// Create a feed holding `initial`.
    #[must_use]
    pub fn new(initial: SessionState) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(initial),
            sender,
        }
    }

    /// Replace the snapshot and notify subscribers.
    pub fn publish(&self, state: SessionState) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = state.clone();
        // No receivers is fine: the snapshot is still updated.
        let _ = self.sender.send(state);
    }

    /// Current snapshot.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to changes, starting from the current snapshot.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        SessionSubscription {
            latest: current.clone(),
            rx: self.sender.subscribe(),
        }
    }

    /// Stream that yields the current snapshot first, then live updates.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, SessionState> {
        let SessionSubscription { latest, rx } = self.subscribe();

        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        futures::stream::iter(std::iter::once(latest))
            .chain(live)
            .boxed()
    }
}

/// A live view of the session feed.
pub struct SessionSubscription {
    latest: SessionState,
    rx: broadcast::Receiver<SessionState>,
}

impl SessionSubscription {
    /// Last state seen by this subscriber.
    #[must_use]
    pub const fn latest(&self) -> &SessionState {
        &self.latest
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the feed has been dropped.
    pub async fn changed(&mut self) -> Option<&SessionState> {
        loop {
            match self.rx.recv().await {
                Ok(state) => {
                    self.latest = state;
                    return Some(&self.latest);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Session subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Apply every change already published, without waiting.
    ///
    /// Returns `true` if the latest state moved.
    pub fn catch_up(&mut self) -> bool {
        let mut moved = false;
        loop {
            match self.rx.try_recv() {
                Ok(state) => {
                    self.latest = state;
                    moved = true;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Session subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return moved,
            }
        }
    }
}
