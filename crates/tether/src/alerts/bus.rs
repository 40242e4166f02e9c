//! Broadcast fan-out of typed alerts.

use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

use super::Alert;

/// Alerts buffered per subscriber before the oldest are dropped.
pub const DEFAULT_ALERT_CAPACITY: usize = 256;

/// Raw stream handed to subscribers; lag surfaces as an error item.
pub type AlertStream = BroadcastStream<Alert>;

/// Shared alert bus built on `tokio::broadcast`.
///
/// Publishing never blocks, so it is safe on engine callback threads.
#[derive(Clone, Debug)]
pub struct AlertBus {
    sender: Sender<Alert>,
}

impl AlertBus {
    /// Bus buffering `capacity` alerts per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Bus with [`DEFAULT_ALERT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ALERT_CAPACITY)
    }

    /// Stream of alerts published from now on.
    #[must_use]
    pub fn subscribe(&self) -> AlertStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Publish to current subscribers; returns how many received it.
    pub fn publish(&self, alert: Alert) -> usize {
        self.sender.send(alert).unwrap_or(0)
    }

    /// Number of live subscriber streams.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}
