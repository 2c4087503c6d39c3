use tokio::sync::watch;

use crate::error::SyncError;
use crate::models::ApiState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loadable<T> {
    /// Nothing loaded yet.
    Idle,
    /// First fetch in flight.
    Loading,
    Ready(T),
    /// Fetch failed and there is no earlier data to fall back on.
    Error(SyncError),
}

impl<T> Loadable<T> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ready(data) => Some(data),
            _ => None,
        }
    }
}

/// Single observable holder of the current domain state.
///
/// Only the engine publishes; everyone else subscribes or peeks.
#[derive(Debug)]
pub struct StatePublisher {
    tx: watch::Sender<Loadable<ApiState>>,
}

impl StatePublisher {
    #[must_use]
    pub fn new(initial: Loadable<ApiState>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Loadable<ApiState>> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Loadable<ApiState> {
        self.tx.borrow().clone()
    }

    pub(crate) fn publish(&self, value: Loadable<ApiState>) {
        // send_replace stores the value even when nobody is subscribed
        self.tx.send_replace(value);
    }
}
